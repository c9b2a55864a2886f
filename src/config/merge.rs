use std::env;

use super::AppConfig;
use super::yaml::YamlConfig;
use crate::core::stt::speechmatics::config::{
    AudioEncoding, DEFAULT_CHUNK_SIZE, DEFAULT_ENDPOINT, DEFAULT_LANGUAGE, DEFAULT_MAX_DELAY,
    OperatingPoint,
};

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// # Arguments
/// * `yaml_config` - Optional YAML configuration to use as overrides
///
/// # Returns
/// * `Result<AppConfig, Box<dyn std::error::Error>>` - The merged configuration or an error
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();
    let sm = yaml.speechmatics.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            $yaml_value.or_else(|| env::var($env_var).ok())
        };
    }

    let api_key = get_optional!("SPEECHMATICS_API_KEY", sm.api_key.clone())
        .filter(|key| !key.trim().is_empty());

    let language = get_value!("SPEECHMATICS_LANGUAGE", sm.language.clone(), DEFAULT_LANGUAGE);

    let endpoint = get_value!("SPEECHMATICS_URL", sm.endpoint.clone(), DEFAULT_ENDPOINT);

    let operating_point = match get_optional!(
        "SPEECHMATICS_OPERATING_POINT",
        sm.operating_point.clone()
    ) {
        Some(value) => value.parse::<OperatingPoint>()?,
        None => OperatingPoint::default(),
    };

    let encoding = match get_optional!("SPEECHMATICS_ENCODING", sm.encoding.clone()) {
        Some(value) => value.parse::<AudioEncoding>()?,
        None => AudioEncoding::default(),
    };

    let max_delay = if let Some(yaml_delay) = sm.max_delay {
        yaml_delay
    } else if let Ok(delay_str) = env::var("SPEECHMATICS_MAX_DELAY") {
        delay_str
            .trim()
            .parse::<f32>()
            .map_err(|e| format!("Invalid SPEECHMATICS_MAX_DELAY environment variable: {e}"))?
    } else {
        DEFAULT_MAX_DELAY
    };

    let chunk_size = if let Some(yaml_chunk) = sm.chunk_size {
        yaml_chunk
    } else if let Ok(chunk_str) = env::var("SPEECHMATICS_CHUNK_SIZE") {
        chunk_str
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("Invalid SPEECHMATICS_CHUNK_SIZE environment variable: {e}"))?
    } else {
        DEFAULT_CHUNK_SIZE
    };

    Ok(AppConfig {
        api_key,
        endpoint,
        language,
        operating_point,
        max_delay,
        chunk_size,
        encoding,
    })
}
