//! Configuration for the entity writer and its value coercion.

use serde::Deserialize;
use std::path::Path;

use crate::error::{Error, Result};
use crate::value::Record;

/// Number of staged writes that triggers a flush when nothing else is configured
pub const DEFAULT_FLUSH_THRESHOLD: usize = 20;

/// How present-but-empty record values are applied to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValuePolicy {
    /// Write the empty value, nulling the field or association
    #[default]
    Apply,
    /// Leave the entity's current value untouched
    Skip,
}

/// Configuration for date format handling
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DateFormatConfig {
    /// List of date format strings to try when parsing dates
    pub date_formats: Vec<String>,
    /// List of timestamp format strings tried before falling back to dates
    pub timestamp_formats: Vec<String>,
    /// Enable heuristic format detection
    pub enable_format_detection: bool,
}

impl Default for DateFormatConfig {
    fn default() -> Self {
        Self {
            date_formats: vec![
                "%Y-%m-%d".to_string(), // ISO format: 2023-01-15
                "%d-%m-%Y".to_string(), // European: 15-01-2023
                "%d/%m/%Y".to_string(), // UK: 15/01/2023
                "%d.%m.%Y".to_string(), // German/Danish: 15.01.2023
                "%Y%m%d".to_string(),   // Compact: 20230115
                "%d %b %Y".to_string(), // 15 Jan 2023
            ],
            timestamp_formats: vec![
                "%Y-%m-%d %H:%M:%S%.f".to_string(),
                "%Y-%m-%dT%H:%M:%S%.f".to_string(),
                "%Y-%m-%d %H:%M".to_string(),
            ],
            enable_format_detection: true,
        }
    }
}

/// Configuration for the `EntityWriter`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Clear the target table in `prepare` and always insert
    pub truncate: bool,
    /// Staged writes allowed before an automatic flush
    pub flush_threshold: usize,
    /// Values merged into every record when absent or empty
    pub default_fields: Record,
    /// Handling of present-but-empty record values
    pub empty_values: EmptyValuePolicy,
    /// Formats used when coercing text into dates and timestamps
    pub date_formats: DateFormatConfig,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            truncate: true,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            default_fields: Record::new(),
            empty_values: EmptyValuePolicy::default(),
            date_formats: DateFormatConfig::default(),
        }
    }
}

impl WriterConfig {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(Error::InvalidConfig(
                "flush_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    #[must_use]
    pub const fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    #[must_use]
    pub fn with_default_fields(mut self, default_fields: Record) -> Self {
        self.default_fields = default_fields;
        self
    }

    #[must_use]
    pub const fn with_empty_values(mut self, empty_values: EmptyValuePolicy) -> Self {
        self.empty_values = empty_values;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_defaults_match_batch_writer_defaults() {
        let config = WriterConfig::default();
        assert!(config.truncate);
        assert_eq!(config.flush_threshold, 20);
        assert_eq!(config.empty_values, EmptyValuePolicy::Apply);
    }

    #[test]
    fn test_from_json_str() {
        let config = WriterConfig::from_json_str(
            r#"{"truncate": false, "flush_threshold": 2,
                "default_fields": {"status": "pending"}, "empty_values": "skip"}"#,
        )
        .unwrap();
        assert!(!config.truncate);
        assert_eq!(config.flush_threshold, 2);
        assert_eq!(config.default_fields.get("status"), Some(&Value::from("pending")));
        assert_eq!(config.empty_values, EmptyValuePolicy::Skip);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = WriterConfig::from_json_str(r#"{"flush_threshold": 0}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
