//! Prompt templates and the JSON shapes they ask for.

pub fn market_prices(crop: &str, region: &str, currency_unit: &str) -> String {
    format!(
        "Get current market price for {crop} in {region} India. Return JSON: \
         {{ \"current\": number, \"peak\": number, \"trend\": [7 numbers representing last 7 days] }}. \
         Prices are in {currency_unit}. Use real data if available. Return only the JSON object."
    )
}

pub fn crop_biology(crop: &str) -> String {
    format!(
        "Provide post-harvest storage biology for the crop \"{crop}\". Return JSON: \
         {{ \"tIdeal\": ideal storage temperature in Celsius, \"hIdeal\": ideal relative humidity percent, \
         \"tSens\": temperature sensitivity between 0 and 1, \"hSens\": humidity sensitivity between 0 and 1, \
         \"shelfLife\": shelf life in days under ideal storage }}. Return only the JSON object."
    )
}

const DIAGNOSIS_SHAPE: &str = "{ \"name\": string, \"confidence\": string percentage, \
    \"cause\": string, \"severity\": \"Low\" | \"Moderate\" | \"High\", \"impact\": string, \
    \"chemical\": string, \"dosage\": string, \"interval\": string, \"precaution\": string, \
    \"organic\": string, \"steps\": [string] }";

pub fn diagnose_image(crop: Option<&str>) -> String {
    let subject = match crop {
        Some(crop) => format!("this {crop} plant"),
        None => "this plant".to_string(),
    };
    format!(
        "You are an agronomist for Indian farms. Identify the disease or deficiency affecting \
         {subject} from the attached photo. Return JSON: {DIAGNOSIS_SHAPE}. \
         Return only the JSON object."
    )
}

pub fn diagnose_symptoms(crop: &str, symptom: &str) -> String {
    let crop = if crop.is_empty() { "an unspecified crop" } else { crop };
    let symptom = if symptom.is_empty() { "unspecified symptoms" } else { symptom };
    format!(
        "You are an agronomist for Indian farms. A farmer reports {symptom} on {crop}. \
         Diagnose the most likely disease or deficiency. Return JSON: {DIAGNOSIS_SHAPE}. \
         Return only the JSON object."
    )
}
