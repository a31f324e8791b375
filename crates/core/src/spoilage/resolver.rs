use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::profiles::{normalize_crop_name, ProfileIndex};
use super::{CropBiologyProfile, DEFAULT_PROFILE};
use crate::cache::{BoundedCache, Lookup};
use crate::errors::ApplicationError;

/// External lookup for crops missing from the built-in table.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, crop_name: &str)
        -> Result<CropBiologyProfile, ApplicationError>;
}

/// Source used when no generative model is wired in; every lookup misses.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticOnly;

#[async_trait]
impl ProfileSource for StaticOnly {
    async fn fetch_profile(
        &self,
        crop_name: &str,
    ) -> Result<CropBiologyProfile, ApplicationError> {
        Err(ApplicationError::Configuration(format!(
            "no external profile source configured for `{crop_name}`"
        )))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileOrigin {
    Static,
    Memoized,
    Model,
    Default,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ResolvedProfile {
    pub profile: CropBiologyProfile,
    pub origin: ProfileOrigin,
}

pub struct ProfileResolver<S> {
    index: ProfileIndex,
    memo: BoundedCache<CropBiologyProfile>,
    dedupe_in_flight: bool,
    source: S,
}

impl<S> ProfileResolver<S>
where
    S: ProfileSource,
{
    pub fn new(source: S, memo: BoundedCache<CropBiologyProfile>, dedupe_in_flight: bool) -> Self {
        Self { index: ProfileIndex::builtin(), memo, dedupe_in_flight, source }
    }

    pub async fn memoized(&self) -> usize {
        self.memo.len().await
    }

    pub fn memo_capacity(&self) -> usize {
        self.memo.capacity()
    }

    /// Never fails: any miss or source error resolves to the default profile.
    pub async fn resolve(&self, crop_name: &str) -> ResolvedProfile {
        let key = normalize_crop_name(crop_name);
        if key.is_empty() {
            return ResolvedProfile { profile: DEFAULT_PROFILE, origin: ProfileOrigin::Default };
        }

        if let Some((_, profile)) = self.index.lookup(&key) {
            return ResolvedProfile { profile, origin: ProfileOrigin::Static };
        }

        let fetch = async {
            self.source.fetch_profile(crop_name.trim()).await.and_then(|fetched| {
                fetched.sanitized().ok_or_else(|| {
                    ApplicationError::MalformedResponse(
                        "crop profile contained non-finite values".to_string(),
                    )
                })
            })
        };

        match self.memo.get_or_try_insert(&key, self.dedupe_in_flight, fetch).await {
            Ok(Lookup { value: profile, fresh: true }) => {
                debug!(
                    event_name = "spoilage.profile.fetched",
                    crop = %key,
                    "memoized crop biology profile from external source"
                );
                ResolvedProfile { profile, origin: ProfileOrigin::Model }
            }
            Ok(Lookup { value: profile, fresh: false }) => {
                ResolvedProfile { profile, origin: ProfileOrigin::Memoized }
            }
            Err(error) => {
                warn!(
                    event_name = "spoilage.profile.fallback",
                    crop = %key,
                    error = %error,
                    "crop biology lookup failed; using default profile"
                );
                ResolvedProfile { profile: DEFAULT_PROFILE, origin: ProfileOrigin::Default }
            }
        }
    }
}
