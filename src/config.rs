use crate::segments::SegmentOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Largest queue between two segments accepted by [`Config::validate`].
pub const MAX_QUEUE_CAPACITY: usize = 65_536;

/// A pipeline definition, usually read from a TOML file:
///
/// ```toml
/// [pipeline]
/// queue_capacity = 64
///
/// [[segment]]
/// name = "remoteaddress"
/// [segment.config]
/// flowsrc = "border"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default, rename = "segment")]
    pub segments: Vec<SegmentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records buffered between two neighbouring segments.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Discard records leaving the last segment instead of handing them to the caller.
    #[serde(default = "default_auto_drain")]
    pub auto_drain: bool,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_auto_drain() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            auto_drain: default_auto_drain(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    pub name: String,
    /// Segment options. Non-string TOML values are accepted and passed on in
    /// their textual form, so `dropunmatched = true` works as well as `"true"`.
    #[serde(default)]
    pub config: HashMap<String, toml::Value>,
}

impl SegmentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .insert(key.into(), toml::Value::String(value.into()));
        self
    }

    pub fn options(&self) -> SegmentOptions {
        self.config
            .iter()
            .map(|(key, value)| {
                let value = match value {
                    toml::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (key.clone(), value)
            })
            .collect()
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.pipeline.queue_capacity == 0 || self.pipeline.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(crate::error::FlowPipeError::InvalidConfig(format!(
                "pipeline.queue_capacity must be between 1 and {}",
                MAX_QUEUE_CAPACITY
            )));
        }

        if self.segments.is_empty() {
            return Err(crate::error::FlowPipeError::InvalidConfig(
                "at least one [[segment]] is required".to_string(),
            ));
        }

        if let Some(position) = self.segments.iter().position(|s| s.name.trim().is_empty()) {
            return Err(crate::error::FlowPipeError::InvalidConfig(format!(
                "segment #{} has an empty name",
                position
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pipeline_definition() {
        let config = Config::parse(
            r#"
            [pipeline]
            queue_capacity = 8

            [[segment]]
            name = "stdin"

            [[segment]]
            name = "addcid"
            [segment.config]
            filename = "prefixes.csv"
            dropunmatched = true

            [[segment]]
            name = "flowfilter"
            config = { filter = "proto tcp" }
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.queue_capacity, 8);
        assert!(config.pipeline.auto_drain);
        assert_eq!(config.segments.len(), 3);
        assert!(config.segments[0].config.is_empty());

        let options = config.segments[1].options();
        assert_eq!(options.get("filename"), Some("prefixes.csv"));
        assert_eq!(options.get("dropunmatched"), Some("true"));
        assert_eq!(config.segments[2].options().get("filter"), Some("proto tcp"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("[[segment]]\nname = \"pass\"\n").unwrap();
        assert_eq!(config.pipeline.queue_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.segments.push(SegmentConfig::new("pass"));
        assert!(config.validate().is_ok());

        config.pipeline.queue_capacity = 0;
        assert!(config.validate().is_err());
        config.pipeline.queue_capacity = MAX_QUEUE_CAPACITY + 1;
        assert!(config.validate().is_err());

        config.pipeline.queue_capacity = 1;
        config.segments.push(SegmentConfig::new(" "));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_a_config_error() {
        assert!(matches!(
            Config::parse("[[segment]\nname = 1"),
            Err(crate::error::FlowPipeError::Toml(_))
        ));
        assert!(matches!(
            Config::parse("[[segment]]\nname = 1\n"),
            Err(crate::error::FlowPipeError::Toml(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            pipeline: PipelineConfig::default(),
            segments: vec![SegmentConfig::new("remoteaddress").with("flowsrc", "border")],
        };
        let text = toml::to_string(&config).unwrap();
        let parsed = Config::parse(&text).unwrap();
        assert_eq!(parsed.segments[0].options().get("flowsrc"), Some("border"));
    }
}
