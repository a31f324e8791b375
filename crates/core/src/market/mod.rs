//! Daily market snapshots per (crop, region).
//!
//! Static baselines get a deterministic daily offset; anything else is estimated by an
//! external `PriceEstimator`. Every result is cached under `date|crop|region`, so all
//! callers see identical numbers for the rest of the day. Baseline pairs are keyed by
//! their declared names and estimated pairs by normalized names, so spelling variants
//! of one pair share a key.

pub mod jitter;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, info};

use crate::cache::BoundedCache;
use crate::errors::{ApplicationError, DomainError};
use crate::spoilage::normalize_crop_name;

pub const TREND_POINTS: usize = 7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(serialize_with = "serialize_price")]
    pub current: f64,
    #[serde(serialize_with = "serialize_price")]
    pub peak: f64,
    #[serde(serialize_with = "serialize_prices")]
    pub trend: [f64; TREND_POINTS],
}

/// Whole prices are written as JSON integers (`2143`, not `2143.0`).
struct Price(f64);

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;
        if self.0.fract() == 0.0 && self.0.abs() <= MAX_EXACT_INTEGER {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

fn serialize_price<S: Serializer>(price: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    Price(*price).serialize(serializer)
}

fn serialize_prices<S: Serializer>(
    prices: &[f64; TREND_POINTS],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(prices.iter().map(|price| Price(*price)))
}

impl MarketSnapshot {
    /// Builds a snapshot from loosely shaped upstream data.
    ///
    /// Longer trends keep their most recent seven points; shorter trends, negative or
    /// non-finite prices are rejected.
    pub fn try_from_parts(current: f64, peak: f64, trend: &[f64]) -> Result<Self, DomainError> {
        if trend.len() < TREND_POINTS {
            return Err(DomainError::InvariantViolation(format!(
                "trend must contain {TREND_POINTS} points, got {}",
                trend.len()
            )));
        }

        let recent = &trend[trend.len() - TREND_POINTS..];
        let all_prices = [current, peak].into_iter().chain(recent.iter().copied());
        if all_prices.into_iter().any(|price| !price.is_finite() || price < 0.0) {
            return Err(DomainError::InvariantViolation(
                "prices must be finite, non-negative numbers".to_string(),
            ));
        }

        let mut points = [0.0; TREND_POINTS];
        points.copy_from_slice(recent);
        Ok(Self { current, peak, trend: points })
    }

    /// Applies one additive offset to every price, preserving the series shape.
    pub fn shifted(&self, offset: i64) -> Self {
        let offset = offset as f64;
        Self {
            current: self.current + offset,
            peak: self.peak + offset,
            trend: self.trend.map(|price| price + offset),
        }
    }
}

/// External price source for (crop, region) pairs without a static baseline.
#[async_trait]
pub trait PriceEstimator: Send + Sync {
    async fn estimate_prices(
        &self,
        crop_name: &str,
        region_name: &str,
    ) -> Result<MarketSnapshot, ApplicationError>;
}

/// Estimator used when no generative model is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct BaselinesOnly;

#[async_trait]
impl PriceEstimator for BaselinesOnly {
    async fn estimate_prices(
        &self,
        crop_name: &str,
        region_name: &str,
    ) -> Result<MarketSnapshot, ApplicationError> {
        Err(ApplicationError::NotFound(format!(
            "no market baseline for `{crop_name}` in `{region_name}`"
        )))
    }
}

const fn baseline(current: f64, peak: f64, trend: [f64; TREND_POINTS]) -> MarketSnapshot {
    MarketSnapshot { current, peak, trend }
}

// INR per quintal
const BUILTIN_BASELINES: &[(&str, &str, MarketSnapshot)] = &[
    (
        "Wheat",
        "Azadpur (Delhi)",
        baseline(2150.0, 2340.0, [2100.0, 2150.0, 2180.0, 2240.0, 2300.0, 2280.0, 2340.0]),
    ),
    (
        "Wheat",
        "Vashi (Mumbai)",
        baseline(2280.0, 2450.0, [2220.0, 2280.0, 2310.0, 2370.0, 2420.0, 2400.0, 2450.0]),
    ),
    (
        "Rice",
        "Azadpur (Delhi)",
        baseline(3500.0, 3800.0, [3400.0, 3450.0, 3500.0, 3600.0, 3650.0, 3750.0, 3800.0]),
    ),
];

#[derive(Clone, Debug)]
struct BaselineEntry {
    crop: String,
    region: String,
    crop_key: String,
    region_key: String,
    snapshot: MarketSnapshot,
}

/// A matched baseline with the names it was declared under.
#[derive(Clone, Copy, Debug)]
pub struct Baseline<'a> {
    pub crop: &'a str,
    pub region: &'a str,
    pub snapshot: &'a MarketSnapshot,
}

#[derive(Clone, Debug)]
pub struct BaselineTable {
    entries: Vec<BaselineEntry>,
}

impl Default for BaselineTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl BaselineTable {
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_BASELINES
                .iter()
                .map(|(crop, region, snapshot)| (*crop, *region, snapshot.clone())),
        )
    }

    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str, MarketSnapshot)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(crop, region, snapshot)| BaselineEntry {
                    crop: crop.trim().to_string(),
                    region: region.trim().to_string(),
                    crop_key: normalize_crop_name(crop),
                    region_key: normalize_crop_name(region),
                    snapshot,
                })
                .collect(),
        }
    }

    /// Case- and whitespace-insensitive match on both names.
    pub fn lookup(&self, crop_name: &str, region_name: &str) -> Option<Baseline<'_>> {
        let crop = normalize_crop_name(crop_name);
        let region = normalize_crop_name(region_name);
        self.entries
            .iter()
            .find(|entry| entry.crop_key == crop && entry.region_key == region)
            .map(|entry| Baseline {
                crop: &entry.crop,
                region: &entry.region,
                snapshot: &entry.snapshot,
            })
    }
}

pub fn cache_key(date: NaiveDate, crop_name: &str, region_name: &str) -> String {
    format!("{}|{}|{}", date.format("%Y-%m-%d"), crop_name.trim(), region_name.trim())
}

pub struct MarketSnapshotCache<E> {
    baselines: BaselineTable,
    cache: BoundedCache<MarketSnapshot>,
    dedupe_in_flight: bool,
    estimator: E,
    jitter_bound: u32,
}

impl<E> MarketSnapshotCache<E>
where
    E: PriceEstimator,
{
    pub fn new(
        estimator: E,
        cache: BoundedCache<MarketSnapshot>,
        jitter_bound: u32,
        dedupe_in_flight: bool,
    ) -> Self {
        Self {
            baselines: BaselineTable::builtin(),
            cache,
            dedupe_in_flight,
            estimator,
            jitter_bound,
        }
    }

    pub fn with_baselines(mut self, baselines: BaselineTable) -> Self {
        self.baselines = baselines;
        self
    }

    pub async fn cached(&self) -> usize {
        self.cache.len().await
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub async fn get_snapshot(
        &self,
        crop_name: &str,
        region_name: &str,
        date: NaiveDate,
    ) -> Result<MarketSnapshot, ApplicationError> {
        if crop_name.trim().is_empty() {
            return Err(ApplicationError::invalid_input("crop must not be empty"));
        }
        if region_name.trim().is_empty() {
            return Err(ApplicationError::invalid_input("region must not be empty"));
        }

        let baseline = self.baselines.lookup(crop_name, region_name);
        let key = match &baseline {
            Some(baseline) => cache_key(date, baseline.crop, baseline.region),
            None => cache_key(
                date,
                &normalize_crop_name(crop_name),
                &normalize_crop_name(region_name),
            ),
        };

        let compute = async {
            match baseline {
                Some(baseline) => {
                    let offset = jitter::price_offset(&key, self.jitter_bound);
                    debug!(
                        event_name = "market.snapshot.baseline",
                        cache_key = %key,
                        offset,
                        "applying daily offset to static baseline"
                    );
                    Ok(baseline.snapshot.shifted(offset))
                }
                None => {
                    info!(
                        event_name = "market.snapshot.estimate",
                        cache_key = %key,
                        "no static baseline; requesting external estimate"
                    );
                    self.estimator.estimate_prices(crop_name.trim(), region_name.trim()).await
                }
            }
        };

        let lookup = self.cache.get_or_try_insert(&key, self.dedupe_in_flight, compute).await?;
        if !lookup.fresh {
            debug!(event_name = "market.snapshot.cache_hit", cache_key = %key, "serving cached snapshot");
        }
        Ok(lookup.value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use super::{
        cache_key, jitter, BaselineTable, BaselinesOnly, MarketSnapshot, MarketSnapshotCache,
        PriceEstimator,
    };
    use crate::cache::BoundedCache;
    use crate::errors::{ApplicationError, DomainError};

    struct CountingEstimator {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl PriceEstimator for CountingEstimator {
        async fn estimate_prices(
            &self,
            _crop_name: &str,
            _region_name: &str,
        ) -> Result<MarketSnapshot, ApplicationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(ApplicationError::Integration("model offline".to_string()));
            }
            Ok(MarketSnapshot {
                current: 5400.0,
                peak: 5600.0,
                trend: [5300.0, 5320.0, 5350.0, 5400.0, 5450.0, 5500.0, 5600.0],
            })
        }
    }

    fn estimator(calls: &Arc<AtomicUsize>) -> CountingEstimator {
        CountingEstimator { calls: calls.clone(), delay: Duration::ZERO, fail: false }
    }

    fn cache<E: PriceEstimator>(estimator: E, dedupe: bool) -> MarketSnapshotCache<E> {
        MarketSnapshotCache::new(estimator, BoundedCache::new(64, None), 20, dedupe)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, day).expect("valid date")
    }

    #[test]
    fn cache_key_joins_date_crop_and_region() {
        assert_eq!(
            cache_key(date(19), " Wheat ", "Azadpur (Delhi)"),
            "2026-10-19|Wheat|Azadpur (Delhi)"
        );
    }

    #[tokio::test]
    async fn baseline_snapshot_is_shifted_by_the_seeded_offset() {
        let markets = cache(BaselinesOnly, true);

        let snapshot =
            markets.get_snapshot("Wheat", "Azadpur (Delhi)", date(19)).await.expect("baseline");

        let offset = jitter::price_offset("2026-10-19|Wheat|Azadpur (Delhi)", 20) as f64;
        assert_eq!(snapshot.current, 2150.0 + offset);
        assert_eq!(snapshot.peak, 2340.0 + offset);
        assert_eq!(snapshot.trend[0], 2100.0 + offset);
        assert_eq!(snapshot.trend[6], 2340.0 + offset);
    }

    #[tokio::test]
    async fn repeated_calls_on_one_day_are_byte_identical() {
        let markets = cache(BaselinesOnly, false);

        let first = markets.get_snapshot("Rice", "Azadpur (Delhi)", date(19)).await.expect("ok");
        let second = markets.get_snapshot("Rice", "Azadpur (Delhi)", date(19)).await.expect("ok");

        let first_json = serde_json::to_vec(&first).expect("serialize");
        let second_json = serde_json::to_vec(&second).expect("serialize");
        assert_eq!(first_json, second_json);
        assert_eq!(markets.cached().await, 1);
    }

    #[tokio::test]
    async fn offsets_vary_by_date_and_stay_bounded() {
        let markets = cache(BaselinesOnly, false);
        let mut offsets = BTreeSet::new();

        for day in 1..=28 {
            let snapshot = markets
                .get_snapshot("Wheat", "Vashi (Mumbai)", date(day))
                .await
                .expect("baseline");
            let offset = snapshot.current - 2280.0;
            assert!((-20.0..=20.0).contains(&offset), "offset {offset} out of range");
            assert_eq!(snapshot.peak - 2450.0, offset);
            let baseline_trend = [2220.0, 2280.0, 2310.0, 2370.0, 2420.0, 2400.0, 2450.0];
            for (price, base) in snapshot.trend.iter().zip(baseline_trend) {
                assert_eq!(price - base, offset);
            }
            offsets.insert(offset as i64);
        }

        assert!(offsets.len() > 1, "daily offsets should not all coincide");
    }

    #[tokio::test]
    async fn spelling_variants_of_a_baseline_pair_get_identical_prices() {
        let markets = cache(BaselinesOnly, false);

        for day in 1..=28 {
            let canonical = markets
                .get_snapshot("Wheat", "Azadpur (Delhi)", date(day))
                .await
                .expect("baseline");
            let variant = markets
                .get_snapshot(" wheat ", "AZADPUR  (delhi)", date(day))
                .await
                .expect("baseline");
            assert_eq!(canonical, variant, "prices differ on day {day}");
        }
        assert_eq!(markets.cached().await, 28);
    }

    #[tokio::test]
    async fn baseline_offsets_are_seeded_by_the_declared_names() {
        let markets = cache(BaselinesOnly, false);

        let snapshot =
            markets.get_snapshot("wheat", "azadpur (delhi)", date(19)).await.expect("baseline");

        let offset = jitter::price_offset("2026-10-19|Wheat|Azadpur (Delhi)", 20) as f64;
        assert_eq!(snapshot.current, 2150.0 + offset);
    }

    #[tokio::test]
    async fn estimated_pairs_share_one_estimate_across_spellings() {
        let calls = Arc::new(AtomicUsize::new(0));
        let markets = cache(estimator(&calls), false);

        let first = markets.get_snapshot("Turmeric", "Erode", date(19)).await.expect("estimate");
        let second = markets.get_snapshot("turmeric ", "ERODE", date(19)).await.expect("cached");

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn whole_prices_serialize_as_integers() {
        let snapshot = MarketSnapshot {
            current: 2143.0,
            peak: 2333.5,
            trend: [2093.0, 2143.0, 2173.0, 2233.0, 2293.0, 2273.0, 2333.0],
        };

        let json = serde_json::to_string(&snapshot).expect("serialize");

        assert_eq!(
            json,
            r#"{"current":2143,"peak":2333.5,"trend":[2093,2143,2173,2233,2293,2273,2333]}"#
        );
        let parsed: MarketSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, snapshot);
    }

    #[tokio::test]
    async fn unknown_pairs_are_estimated_once_then_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let markets = cache(estimator(&calls), false);

        let first = markets.get_snapshot("Turmeric", "Erode", date(19)).await.expect("estimate");
        let second = markets.get_snapshot("Turmeric", "Erode", date(19)).await.expect("cached");

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn estimator_failures_surface_and_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let markets = cache(
            CountingEstimator { calls: calls.clone(), delay: Duration::ZERO, fail: true },
            false,
        );

        let result = markets.get_snapshot("Turmeric", "Erode", date(19)).await;

        assert!(matches!(result, Err(ApplicationError::Integration(_))));
        assert_eq!(markets.cached().await, 0);
    }

    #[tokio::test]
    async fn empty_crop_or_region_is_rejected_without_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let markets = cache(estimator(&calls), false);

        let missing_crop = markets.get_snapshot(" ", "Erode", date(19)).await;
        let missing_region = markets.get_snapshot("Turmeric", "", date(19)).await;

        assert!(matches!(
            missing_crop,
            Err(ApplicationError::Domain(DomainError::InvalidInput(_)))
        ));
        assert!(matches!(
            missing_region,
            Err(ApplicationError::Domain(DomainError::InvalidInput(_)))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_estimate_when_deduplicating() {
        let calls = Arc::new(AtomicUsize::new(0));
        let markets = cache(
            CountingEstimator { calls: calls.clone(), delay: Duration::from_millis(20), fail: false },
            true,
        );

        let (first, second) = tokio::join!(
            markets.get_snapshot("Turmeric", "Erode", date(19)),
            markets.get_snapshot("Turmeric", "Erode", date(19))
        );

        assert_eq!(first.expect("first"), second.expect("second"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_duplicate_work_without_deduplication() {
        let calls = Arc::new(AtomicUsize::new(0));
        let markets = cache(
            CountingEstimator { calls: calls.clone(), delay: Duration::from_millis(20), fail: false },
            false,
        );

        let (first, second) = tokio::join!(
            markets.get_snapshot("Turmeric", "Erode", date(19)),
            markets.get_snapshot("Turmeric", "Erode", date(19))
        );

        assert_eq!(first.expect("first"), second.expect("second"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_baselines_replace_the_builtin_table() {
        let markets = cache(BaselinesOnly, false).with_baselines(BaselineTable::new([(
            "Onion",
            "Lasalgaon",
            MarketSnapshot { current: 1800.0, peak: 1900.0, trend: [1800.0; 7] },
        )]));

        assert!(markets.get_snapshot("Onion", "Lasalgaon", date(19)).await.is_ok());
        assert!(matches!(
            markets.get_snapshot("Wheat", "Azadpur (Delhi)", date(19)).await,
            Err(ApplicationError::NotFound(_))
        ));
    }

    #[test]
    fn parts_are_trimmed_to_the_latest_seven_points() {
        let trend = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let snapshot = MarketSnapshot::try_from_parts(9.0, 9.0, &trend).expect("valid");

        assert_eq!(snapshot.trend, [3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn short_or_invalid_parts_are_rejected() {
        assert!(MarketSnapshot::try_from_parts(1.0, 2.0, &[1.0, 2.0, 3.0]).is_err());
        assert!(MarketSnapshot::try_from_parts(f64::NAN, 2.0, &[1.0; 7]).is_err());
        assert!(MarketSnapshot::try_from_parts(1.0, -2.0, &[1.0; 7]).is_err());
    }
}
