pub mod cache;
pub mod config;
pub mod diagnosis;
pub mod errors;
pub mod market;
pub mod spoilage;

pub use cache::{BoundedCache, Lookup};
pub use diagnosis::{Diagnosis, DiagnosisDraft};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use market::{MarketSnapshot, MarketSnapshotCache, PriceEstimator};
pub use spoilage::{
    CropBiologyProfile, ProfileResolver, ProfileSource, RiskAssessment, SpoilageEstimator,
    SpoilageReading,
};
