//! Plant-disease diagnosis records.
//!
//! `Diagnosis` is the complete shape the dashboard renders. Upstream answers arrive as a
//! `DiagnosisDraft` with any subset of fields and are completed with fixed defaults.
//! When image diagnosis is unavailable, `fallback_for_image` picks a deterministic entry
//! from a small catalogue using the same polynomial hash as the market jitter.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::market::jitter::polynomial_hash;
use crate::spoilage::normalize_crop_name;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub name: String,
    pub confidence: String,
    pub cause: String,
    pub severity: String,
    pub impact: String,
    pub chemical: String,
    pub dosage: String,
    pub interval: String,
    pub precaution: String,
    pub organic: String,
    pub steps: Vec<String>,
}

/// Partially populated diagnosis as returned by an upstream model.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiagnosisDraft {
    pub name: Option<String>,
    pub confidence: Option<Value>,
    pub cause: Option<String>,
    pub severity: Option<String>,
    pub impact: Option<String>,
    pub chemical: Option<String>,
    pub dosage: Option<String>,
    pub interval: Option<String>,
    pub precaution: Option<String>,
    pub organic: Option<String>,
    pub steps: Option<Vec<String>>,
}

fn default_steps() -> Vec<String> {
    [
        "Remove and destroy infected plant parts.",
        "Apply recommended treatment.",
        "Ensure good air circulation.",
        "Monitor and repeat treatment if needed.",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn filled(value: Option<String>, default: &str) -> String {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty()).unwrap_or_else(|| default.to_string())
}

/// Renders numbers as percentages (`0.87` and `87` both become `87%`).
fn confidence_text(value: Option<Value>) -> String {
    match value {
        Some(Value::Number(number)) => match number.as_f64() {
            Some(raw) if raw.is_finite() => {
                let percent = if raw <= 1.0 { raw * 100.0 } else { raw };
                format!("{:.0}%", percent.clamp(0.0, 100.0))
            }
            _ => "N/A".to_string(),
        },
        Some(Value::String(text)) if !text.trim().is_empty() => text.trim().to_string(),
        _ => "N/A".to_string(),
    }
}

impl DiagnosisDraft {
    pub fn complete(self) -> Diagnosis {
        let steps = self
            .steps
            .map(|steps| {
                steps
                    .into_iter()
                    .map(|step| step.trim().to_string())
                    .filter(|step| !step.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|steps| !steps.is_empty())
            .unwrap_or_else(default_steps);

        Diagnosis {
            name: filled(self.name, "Unknown Disease"),
            confidence: confidence_text(self.confidence),
            cause: filled(self.cause, "Unknown"),
            severity: filled(self.severity, "Moderate"),
            impact: filled(self.impact, "Analysis complete."),
            chemical: filled(self.chemical, "Consult local agronomist"),
            dosage: filled(self.dosage, "As directed"),
            interval: filled(self.interval, "As needed"),
            precaution: filled(self.precaution, "Wear protective gear when spraying."),
            organic: filled(self.organic, "Neem oil spray (5ml/L)"),
            steps,
        }
    }
}

struct ReferenceEntry {
    crop: &'static str,
    symptom: &'static str,
    name: &'static str,
    cause: &'static str,
    chemical: &'static str,
    organic: &'static str,
}

const REFERENCE_TABLE: &[ReferenceEntry] = &[
    ReferenceEntry {
        crop: "wheat",
        symptom: "yellowing",
        name: "Yellow Rust",
        cause: "Fungal Infection",
        chemical: "Propiconazole 25% EC",
        organic: "Neem Oil (3%) spray",
    },
    ReferenceEntry {
        crop: "rice",
        symptom: "spots",
        name: "Brown Spot",
        cause: "Fungal (Bipolaris oryzae)",
        chemical: "Mancozeb 75 WP",
        organic: "Pseudomonas fluorescens",
    },
];

/// Short record served by the reference lookup endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferenceDisease {
    pub name: String,
    pub cause: String,
    pub chemical: String,
    pub organic: String,
}

impl ReferenceDisease {
    pub fn into_diagnosis(self) -> Diagnosis {
        DiagnosisDraft {
            name: Some(self.name),
            cause: Some(self.cause),
            chemical: Some(self.chemical),
            organic: Some(self.organic),
            ..DiagnosisDraft::default()
        }
        .complete()
    }
}

pub fn reference_lookup(crop: &str, symptom: &str) -> Option<ReferenceDisease> {
    let crop = normalize_crop_name(crop);
    let symptom = normalize_crop_name(symptom);
    REFERENCE_TABLE.iter().find(|entry| entry.crop == crop && entry.symptom == symptom).map(
        |entry| ReferenceDisease {
            name: entry.name.to_string(),
            cause: entry.cause.to_string(),
            chemical: entry.chemical.to_string(),
            organic: entry.organic.to_string(),
        },
    )
}

struct FallbackEntry {
    name: &'static str,
    cause: &'static str,
    severity: &'static str,
    impact: &'static str,
    chemical: &'static str,
    dosage: &'static str,
    interval: &'static str,
    organic: &'static str,
    steps: [&'static str; 4],
}

const FALLBACK_CATALOGUE: &[FallbackEntry] = &[
    FallbackEntry {
        name: "Leaf Blight",
        cause: "Fungal (Alternaria spp.)",
        severity: "Moderate",
        impact: "Spreading lesions reduce photosynthetic leaf area and yield.",
        chemical: "Mancozeb 75 WP",
        dosage: "2.5 g per litre of water",
        interval: "Every 10-12 days",
        organic: "Trichoderma viride (5 g/L) spray",
        steps: [
            "Remove and burn heavily spotted leaves.",
            "Spray fungicide covering both leaf surfaces.",
            "Avoid overhead irrigation late in the day.",
            "Re-inspect the field after one week.",
        ],
    },
    FallbackEntry {
        name: "Powdery Mildew",
        cause: "Fungal (Erysiphales)",
        severity: "Low",
        impact: "White coating weakens leaves and can stunt growth.",
        chemical: "Wettable Sulphur 80 WP",
        dosage: "2 g per litre of water",
        interval: "Every 15 days",
        organic: "Milk spray (1:9 with water)",
        steps: [
            "Prune crowded foliage to improve airflow.",
            "Apply sulphur spray in the cool part of the day.",
            "Avoid excess nitrogen fertiliser.",
            "Repeat if the white coating returns.",
        ],
    },
    FallbackEntry {
        name: "Bacterial Leaf Spot",
        cause: "Bacterial (Xanthomonas spp.)",
        severity: "Moderate",
        impact: "Water-soaked spots merge and cause early leaf drop.",
        chemical: "Copper Oxychloride 50 WP",
        dosage: "3 g per litre of water",
        interval: "Every 7-10 days",
        organic: "Pseudomonas fluorescens (10 g/L) spray",
        steps: [
            "Remove infected leaves and disinfect tools.",
            "Spray copper fungicide after rain events.",
            "Keep foliage dry where possible.",
            "Rotate with a non-host crop next season.",
        ],
    },
    FallbackEntry {
        name: "Nitrogen Deficiency",
        cause: "Nutrient deficiency",
        severity: "Low",
        impact: "Uniform yellowing of older leaves slows growth.",
        chemical: "Urea foliar spray (2%)",
        dosage: "20 g per litre of water",
        interval: "Once, repeat after 15 days if needed",
        organic: "Well-rotted farmyard manure or vermicompost",
        steps: [
            "Confirm with a soil test where possible.",
            "Apply a split dose of nitrogen fertiliser.",
            "Irrigate lightly after application.",
            "Watch new growth for recovery.",
        ],
    },
    FallbackEntry {
        name: "Early Blight",
        cause: "Fungal (Alternaria solani)",
        severity: "High",
        impact: "Concentric-ring lesions defoliate plants and cut yield.",
        chemical: "Chlorothalonil 75 WP",
        dosage: "2 g per litre of water",
        interval: "Every 7 days during humid weather",
        organic: "Neem oil spray (5ml/L)",
        steps: [
            "Remove lower infected leaves immediately.",
            "Mulch to stop soil splash onto leaves.",
            "Spray fungicide at the first sign of spread.",
            "Destroy crop debris after harvest.",
        ],
    },
];

/// Deterministic diagnosis derived from the image payload.
///
/// The same image always yields the same entry and confidence.
pub fn fallback_for_image(image_base64: &str, crop: Option<&str>) -> Diagnosis {
    let hash = polynomial_hash(image_base64).unsigned_abs() as usize;
    let entry = &FALLBACK_CATALOGUE[hash % FALLBACK_CATALOGUE.len()];
    let confidence = 72 + (hash / FALLBACK_CATALOGUE.len()) % 23;

    let name = match crop.map(str::trim).filter(|crop| !crop.is_empty()) {
        Some(crop) => format!("{} ({crop})", entry.name),
        None => entry.name.to_string(),
    };

    Diagnosis {
        name,
        confidence: format!("{confidence}%"),
        cause: entry.cause.to_string(),
        severity: entry.severity.to_string(),
        impact: entry.impact.to_string(),
        chemical: entry.chemical.to_string(),
        dosage: entry.dosage.to_string(),
        interval: entry.interval.to_string(),
        precaution: "Wear protective gear when spraying.".to_string(),
        organic: entry.organic.to_string(),
        steps: entry.steps.iter().map(|step| step.to_string()).collect(),
    }
}
