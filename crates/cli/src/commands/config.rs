use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use krishi_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let static_dir = config
        .server
        .static_dir
        .as_ref()
        .map(|dir| dir.display().to_string())
        .unwrap_or_else(|| "<unset>".to_string());
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_key(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field {
            key_path: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["KRISHI_SERVER_BIND_ADDRESS"],
        },
        Field {
            key_path: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["KRISHI_SERVER_PORT", "PORT"],
        },
        Field {
            key_path: "server.static_dir",
            value: static_dir,
            env_keys: &["KRISHI_SERVER_STATIC_DIR"],
        },
        Field {
            key_path: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["KRISHI_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key_path: "llm.provider",
            value: format!("{:?}", config.llm.provider),
            env_keys: &["KRISHI_LLM_PROVIDER"],
        },
        Field {
            key_path: "llm.api_key",
            value: api_key,
            env_keys: &["KRISHI_LLM_API_KEY", "GOOGLE_API_KEY"],
        },
        Field {
            key_path: "llm.base_url",
            value: config.llm.base_url.clone(),
            env_keys: &["KRISHI_LLM_BASE_URL"],
        },
        Field {
            key_path: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["KRISHI_LLM_MODEL"],
        },
        Field {
            key_path: "llm.vision_model",
            value: config.llm.vision_model.clone(),
            env_keys: &["KRISHI_LLM_VISION_MODEL"],
        },
        Field {
            key_path: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["KRISHI_LLM_TIMEOUT_SECS"],
        },
        Field {
            key_path: "weather.base_url",
            value: config.weather.base_url.clone(),
            env_keys: &["KRISHI_WEATHER_BASE_URL"],
        },
        Field {
            key_path: "cache.market_max_entries",
            value: config.cache.market_max_entries.to_string(),
            env_keys: &["KRISHI_CACHE_MARKET_MAX_ENTRIES"],
        },
        Field {
            key_path: "cache.market_ttl_secs",
            value: config.cache.market_ttl_secs.to_string(),
            env_keys: &["KRISHI_CACHE_MARKET_TTL_SECS"],
        },
        Field {
            key_path: "cache.dedupe_in_flight",
            value: config.cache.dedupe_in_flight.to_string(),
            env_keys: &["KRISHI_CACHE_DEDUPE_IN_FLIGHT"],
        },
        Field {
            key_path: "spoilage.risk_scale",
            value: config.spoilage.risk_scale.to_string(),
            env_keys: &["KRISHI_SPOILAGE_RISK_SCALE"],
        },
        Field {
            key_path: "spoilage.high_risk_threshold",
            value: config.spoilage.high_risk_threshold.to_string(),
            env_keys: &["KRISHI_SPOILAGE_HIGH_RISK_THRESHOLD"],
        },
        Field {
            key_path: "market.jitter_bound",
            value: config.market.jitter_bound.to_string(),
            env_keys: &["KRISHI_MARKET_JITTER_BOUND"],
        },
        Field {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["KRISHI_LOGGING_LEVEL", "KRISHI_LOG_LEVEL"],
        },
        Field {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["KRISHI_LOGGING_FORMAT", "KRISHI_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("krishi.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/krishi.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the last four characters of long keys so operators can tell keys apart.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() < 12 {
        return "<redacted>".to_string();
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_key};

    #[test]
    fn short_keys_are_fully_redacted() {
        assert_eq!(redact_key("abc"), "<redacted>");
        assert_eq!(redact_key("   "), "<empty>");
    }

    #[test]
    fn long_keys_keep_only_a_suffix() {
        let redacted = redact_key("AIzaSyD-example-key-9XyZ");

        assert_eq!(redacted, "***9XyZ");
        assert!(!redacted.contains("AIza"));
    }

    #[test]
    fn nested_paths_are_detected_in_config_documents() {
        let doc: Value = "[llm]\nmodel = \"gemini-1.5-pro\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.api_key"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
