//! Spoilage risk estimation.
//!
//! Risk is a product of three stress terms (thermal, hydraulic, elapsed shelf life)
//! scaled into a percentage and clamped to the configured presentable range.

pub mod profiles;
pub mod resolver;

use serde::{Deserialize, Serialize};

use crate::config::SpoilageConfig;
use crate::errors::DomainError;

pub use profiles::{normalize_crop_name, ProfileIndex};
pub use resolver::{ProfileOrigin, ProfileResolver, ProfileSource, ResolvedProfile, StaticOnly};

pub const MIN_STORAGE_TEMPERATURE_C: f64 = -50.0;
pub const MAX_STORAGE_TEMPERATURE_C: f64 = 70.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropBiologyProfile {
    #[serde(alias = "tIdeal")]
    pub ideal_temperature_c: f64,
    #[serde(alias = "hIdeal")]
    pub ideal_humidity_pct: f64,
    #[serde(alias = "tSens")]
    pub temperature_sensitivity: f64,
    #[serde(alias = "hSens")]
    pub humidity_sensitivity: f64,
    #[serde(alias = "shelfLife")]
    pub shelf_life_days: f64,
}

/// Used whenever no profile can be resolved for a crop.
pub const DEFAULT_PROFILE: CropBiologyProfile = CropBiologyProfile {
    ideal_temperature_c: 15.0,
    ideal_humidity_pct: 60.0,
    temperature_sensitivity: 0.10,
    humidity_sensitivity: 0.05,
    shelf_life_days: 60.0,
};

impl CropBiologyProfile {
    pub const TEMPERATURE_SENSITIVITY_RANGE: (f64, f64) = (0.01, 0.30);
    pub const HUMIDITY_SENSITIVITY_RANGE: (f64, f64) = (0.01, 0.20);

    /// Forces externally sourced values into the documented parameter ranges.
    ///
    /// Returns `None` when any value is not a finite number.
    pub fn sanitized(self) -> Option<Self> {
        let values = [
            self.ideal_temperature_c,
            self.ideal_humidity_pct,
            self.temperature_sensitivity,
            self.humidity_sensitivity,
            self.shelf_life_days,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            return None;
        }

        let (t_min, t_max) = Self::TEMPERATURE_SENSITIVITY_RANGE;
        let (h_min, h_max) = Self::HUMIDITY_SENSITIVITY_RANGE;
        Some(Self {
            ideal_temperature_c: self.ideal_temperature_c,
            ideal_humidity_pct: self.ideal_humidity_pct.clamp(0.0, 100.0),
            temperature_sensitivity: self.temperature_sensitivity.clamp(t_min, t_max),
            humidity_sensitivity: self.humidity_sensitivity.clamp(h_min, h_max),
            shelf_life_days: self.shelf_life_days.max(1.0),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpoilageReading {
    pub crop_name: String,
    pub temperature_c: f64,
    pub relative_humidity_pct: f64,
    pub storage_duration_days: u32,
}

impl SpoilageReading {
    /// Validates raw dashboard input. Fractional days are truncated.
    pub fn from_raw(
        crop_name: &str,
        temperature_c: f64,
        relative_humidity_pct: f64,
        storage_duration_days: f64,
    ) -> Result<Self, DomainError> {
        let crop_name = crop_name.trim();
        if crop_name.is_empty() {
            return Err(DomainError::InvalidInput("cropType must not be empty".to_string()));
        }

        if !temperature_c.is_finite()
            || !(MIN_STORAGE_TEMPERATURE_C..=MAX_STORAGE_TEMPERATURE_C).contains(&temperature_c)
        {
            return Err(DomainError::InvalidInput(format!(
                "temp must be between {MIN_STORAGE_TEMPERATURE_C} and {MAX_STORAGE_TEMPERATURE_C} °C"
            )));
        }

        if !relative_humidity_pct.is_finite() || !(0.0..=100.0).contains(&relative_humidity_pct) {
            return Err(DomainError::InvalidInput(
                "humidity must be a percentage between 0 and 100".to_string(),
            ));
        }

        if !storage_duration_days.is_finite() || storage_duration_days < 0.0 {
            return Err(DomainError::InvalidInput(
                "days must be zero or a positive number".to_string(),
            ));
        }

        Ok(Self {
            crop_name: crop_name.to_string(),
            temperature_c,
            relative_humidity_pct,
            storage_duration_days: storage_duration_days.trunc().min(f64::from(u32::MAX)) as u32,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub risk: f64,
    pub is_high_risk: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SpoilageEstimator {
    config: SpoilageConfig,
}

impl SpoilageEstimator {
    pub fn new(config: SpoilageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpoilageConfig {
        &self.config
    }

    pub fn estimate(
        &self,
        reading: &SpoilageReading,
        profile: &CropBiologyProfile,
    ) -> RiskAssessment {
        let temperature_excess = (reading.temperature_c - profile.ideal_temperature_c).max(0.0);
        let thermal_stress = (temperature_excess * profile.temperature_sensitivity).exp();

        let humidity_deviation =
            (reading.relative_humidity_pct - profile.ideal_humidity_pct).abs();
        let hydraulic_stress =
            1.0 + humidity_deviation.powi(2) * profile.humidity_sensitivity * 0.01;

        let time_factor = f64::from(reading.storage_duration_days) / profile.shelf_life_days;

        let raw_risk = thermal_stress * hydraulic_stress * time_factor * self.config.risk_scale;
        // inf * 0 days
        let raw_risk = if raw_risk.is_nan() { 0.0 } else { raw_risk };
        let risk = raw_risk.clamp(self.config.min_risk, self.config.max_risk);

        RiskAssessment { risk, is_high_risk: risk > self.config.high_risk_threshold }
    }

    pub fn recommendation(
        &self,
        reading: &SpoilageReading,
        profile: &CropBiologyProfile,
        assessment: &RiskAssessment,
    ) -> String {
        if assessment.is_high_risk {
            return format!(
                "Critical storage conditions. Reduce storage temp to {:.1}°C and hold humidity near {:.0}% immediately.",
                profile.ideal_temperature_c, profile.ideal_humidity_pct
            );
        }

        let remaining_days =
            (profile.shelf_life_days - f64::from(reading.storage_duration_days)).round().max(0.0)
                as u64;
        format!("Conditions optimal. Safe to store for {remaining_days} more days.")
    }
}
