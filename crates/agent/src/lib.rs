//! Generative-model integration for the Krishi dashboard.
//!
//! The model is only ever a data source: it proposes crop biology, price series and
//! disease write-ups as JSON. Every answer is parsed, validated and completed by
//! `krishi-core` types before it reaches a caller, and every model failure has a
//! deterministic fallback or a typed error.
//!
//! - `llm`: the `GenerativeModel` seam and `DisabledModel`
//! - `gemini`: HTTP client for the Gemini `generateContent` API
//! - `extract`: JSON recovery from free-form model text
//! - `adapters`: `ProfileSource` and `PriceEstimator` backed by a model
//! - `diagnosis`: image and symptom diagnosis with fallbacks

pub mod adapters;
pub mod diagnosis;
pub mod extract;
pub mod gemini;
pub mod llm;
pub mod prompts;

pub use adapters::{ModelPriceEstimator, ModelProfileSource};
pub use diagnosis::{Diagnosed, DiagnosisRequest, DiagnosisSource, Diagnostician};
pub use gemini::GeminiClient;
pub use llm::{DisabledModel, GenerationRequest, GenerativeModel, InlineImage, ModelError};
