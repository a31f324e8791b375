use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub weather: WeatherConfig,
    pub cache: CacheConfig,
    pub spoilage: SpoilageConfig,
    pub market: MarketConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub vision_model: String,
    pub timeout_secs: u64,
}

impl LlmConfig {
    pub fn has_api_key(&self) -> bool {
        self.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct WeatherConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub profile_max_entries: usize,
    pub market_max_entries: usize,
    /// Zero keeps snapshots until they are evicted by size.
    pub market_ttl_secs: u64,
    pub dedupe_in_flight: bool,
}

impl CacheConfig {
    pub fn market_ttl(&self) -> Option<Duration> {
        (self.market_ttl_secs > 0).then(|| Duration::from_secs(self.market_ttl_secs))
    }
}

/// Tuning for the spoilage risk curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpoilageConfig {
    pub risk_scale: f64,
    pub min_risk: f64,
    pub max_risk: f64,
    pub high_risk_threshold: f64,
}

impl Default for SpoilageConfig {
    fn default() -> Self {
        Self { risk_scale: 50.0, min_risk: 2.0, max_risk: 99.0, high_risk_threshold: 50.0 }
    }
}

#[derive(Clone, Debug)]
pub struct MarketConfig {
    pub jitter_bound: u32,
    pub currency_unit: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self { jitter_bound: 20, currency_unit: "INR per quintal".to_string() }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Gemini,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
    pub dedupe_in_flight: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                static_dir: None,
                graceful_shutdown_secs: 15,
            },
            llm: LlmConfig {
                provider: LlmProvider::Gemini,
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                model: "gemini-1.5-flash".to_string(),
                vision_model: "gemini-1.5-flash".to_string(),
                timeout_secs: 30,
            },
            weather: WeatherConfig {
                base_url: "https://api.open-meteo.com".to_string(),
                timeout_secs: 10,
            },
            cache: CacheConfig {
                profile_max_entries: 256,
                market_max_entries: 1024,
                market_ttl_secs: 86_400,
                dedupe_in_flight: true,
            },
            spoilage: SpoilageConfig::default(),
            market: MarketConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected gemini)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("krishi.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = Some(static_dir);
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(vision_model) = llm.vision_model {
                self.llm.vision_model = vision_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(weather) = patch.weather {
            if let Some(base_url) = weather.base_url {
                self.weather.base_url = base_url;
            }
            if let Some(timeout_secs) = weather.timeout_secs {
                self.weather.timeout_secs = timeout_secs;
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(profile_max_entries) = cache.profile_max_entries {
                self.cache.profile_max_entries = profile_max_entries;
            }
            if let Some(market_max_entries) = cache.market_max_entries {
                self.cache.market_max_entries = market_max_entries;
            }
            if let Some(market_ttl_secs) = cache.market_ttl_secs {
                self.cache.market_ttl_secs = market_ttl_secs;
            }
            if let Some(dedupe_in_flight) = cache.dedupe_in_flight {
                self.cache.dedupe_in_flight = dedupe_in_flight;
            }
        }

        if let Some(spoilage) = patch.spoilage {
            if let Some(risk_scale) = spoilage.risk_scale {
                self.spoilage.risk_scale = risk_scale;
            }
            if let Some(min_risk) = spoilage.min_risk {
                self.spoilage.min_risk = min_risk;
            }
            if let Some(max_risk) = spoilage.max_risk {
                self.spoilage.max_risk = max_risk;
            }
            if let Some(high_risk_threshold) = spoilage.high_risk_threshold {
                self.spoilage.high_risk_threshold = high_risk_threshold;
            }
        }

        if let Some(market) = patch.market {
            if let Some(jitter_bound) = market.jitter_bound {
                self.market.jitter_bound = jitter_bound;
            }
            if let Some(currency_unit) = market.currency_unit {
                self.market.currency_unit = currency_unit;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("KRISHI_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some((key, value)) = read_env_alias(&["KRISHI_SERVER_PORT", "PORT"]) {
            self.server.port = parse_u16(key, &value)?;
        }
        if let Some(value) = read_env("KRISHI_SERVER_STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("KRISHI_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("KRISHI_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("KRISHI_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some((_, value)) = read_env_alias(&["KRISHI_LLM_API_KEY", "GOOGLE_API_KEY"]) {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("KRISHI_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("KRISHI_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("KRISHI_LLM_VISION_MODEL") {
            self.llm.vision_model = value;
        }
        if let Some(value) = read_env("KRISHI_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("KRISHI_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KRISHI_WEATHER_BASE_URL") {
            self.weather.base_url = value;
        }
        if let Some(value) = read_env("KRISHI_WEATHER_TIMEOUT_SECS") {
            self.weather.timeout_secs = parse_u64("KRISHI_WEATHER_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("KRISHI_CACHE_PROFILE_MAX_ENTRIES") {
            self.cache.profile_max_entries =
                parse_usize("KRISHI_CACHE_PROFILE_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = read_env("KRISHI_CACHE_MARKET_MAX_ENTRIES") {
            self.cache.market_max_entries = parse_usize("KRISHI_CACHE_MARKET_MAX_ENTRIES", &value)?;
        }
        if let Some(value) = read_env("KRISHI_CACHE_MARKET_TTL_SECS") {
            self.cache.market_ttl_secs = parse_u64("KRISHI_CACHE_MARKET_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("KRISHI_CACHE_DEDUPE_IN_FLIGHT") {
            self.cache.dedupe_in_flight = parse_bool("KRISHI_CACHE_DEDUPE_IN_FLIGHT", &value)?;
        }

        if let Some(value) = read_env("KRISHI_SPOILAGE_RISK_SCALE") {
            self.spoilage.risk_scale = parse_f64("KRISHI_SPOILAGE_RISK_SCALE", &value)?;
        }
        if let Some(value) = read_env("KRISHI_SPOILAGE_HIGH_RISK_THRESHOLD") {
            self.spoilage.high_risk_threshold =
                parse_f64("KRISHI_SPOILAGE_HIGH_RISK_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("KRISHI_MARKET_JITTER_BOUND") {
            self.market.jitter_bound = parse_u32("KRISHI_MARKET_JITTER_BOUND", &value)?;
        }

        let log_level = read_env("KRISHI_LOGGING_LEVEL").or_else(|| read_env("KRISHI_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("KRISHI_LOGGING_FORMAT").or_else(|| read_env("KRISHI_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(static_dir) = overrides.static_dir {
            self.server.static_dir = Some(static_dir);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(dedupe_in_flight) = overrides.dedupe_in_flight {
            self.cache.dedupe_in_flight = dedupe_in_flight;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_llm(&self.llm)?;
        validate_weather(&self.weather)?;
        validate_cache(&self.cache)?;
        validate_spoilage(&self.spoilage)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("krishi.toml"), PathBuf::from("config/krishi.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_http_url(field: &str, url: &str) -> Result<(), ConfigError> {
    let url = url.trim();
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    validate_http_url("llm.base_url", &llm.base_url)?;

    if llm.model.trim().is_empty() || llm.vision_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "llm.model and llm.vision_model must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_weather(weather: &WeatherConfig) -> Result<(), ConfigError> {
    if weather.timeout_secs == 0 || weather.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "weather.timeout_secs must be in range 1..=120".to_string(),
        ));
    }
    validate_http_url("weather.base_url", &weather.base_url)
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.profile_max_entries == 0 || cache.market_max_entries == 0 {
        return Err(ConfigError::Validation(
            "cache.profile_max_entries and cache.market_max_entries must be greater than zero"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_spoilage(spoilage: &SpoilageConfig) -> Result<(), ConfigError> {
    let values = [
        spoilage.risk_scale,
        spoilage.min_risk,
        spoilage.max_risk,
        spoilage.high_risk_threshold,
    ];
    if values.iter().any(|value| !value.is_finite()) {
        return Err(ConfigError::Validation("spoilage values must be finite numbers".to_string()));
    }

    if spoilage.risk_scale <= 0.0 {
        return Err(ConfigError::Validation(
            "spoilage.risk_scale must be greater than zero".to_string(),
        ));
    }

    if !(0.0 <= spoilage.min_risk
        && spoilage.min_risk < spoilage.max_risk
        && spoilage.max_risk <= 100.0)
    {
        return Err(ConfigError::Validation(
            "spoilage risk bounds must satisfy 0 <= min_risk < max_risk <= 100".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// First non-empty variable among `keys`, in order.
fn read_env_alias<'a>(keys: &[&'a str]) -> Option<(&'a str, String)> {
    keys.iter().find_map(|key| read_env(key).map(|value| (*key, value)))
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.trim().parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    llm: Option<LlmPatch>,
    weather: Option<WeatherPatch>,
    cache: Option<CachePatch>,
    spoilage: Option<SpoilagePatch>,
    market: Option<MarketPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    vision_model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WeatherPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    profile_max_entries: Option<usize>,
    market_max_entries: Option<usize>,
    market_ttl_secs: Option<u64>,
    dedupe_in_flight: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SpoilagePatch {
    risk_scale: Option<f64>,
    min_risk: Option<f64>,
    max_risk: Option<f64>,
    high_risk_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct MarketPatch {
    jitter_bound: Option<u32>,
    currency_unit: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
