use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// speechmatics:
///   api_key: "your-speechmatics-key"
///   language: "en"
///   operating_point: "enhanced"
///   max_delay: 0.8
///   endpoint: "wss://eu2.rt.speechmatics.com/v2"
///   chunk_size: 4096
///   encoding: "pcm_s16le"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub speechmatics: Option<SpeechmaticsYaml>,
}

/// Speechmatics settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeechmaticsYaml {
    pub api_key: Option<String>,
    pub language: Option<String>,
    /// "standard" or "enhanced"
    pub operating_point: Option<String>,
    /// Max latency budget in seconds
    pub max_delay: Option<f32>,
    pub endpoint: Option<String>,
    /// Audio frame size in bytes
    pub chunk_size: Option<usize>,
    /// "pcm_s16le", "pcm_f32le" or "mulaw"
    pub encoding: Option<String>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}
