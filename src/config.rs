//! Codec configuration
//!
//! Plain serde-deserializable knobs; embedders that keep settings in a
//! `bindcodec.toml` section can deserialize this directly.
//!
//! ```toml
//! [codec]
//! identity_cache_capacity = 256
//! lenient_missing_cases = true
//! ```

use serde::{Deserialize, Serialize};

/// Tuning knobs for snapshot construction and codec behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Capacity of the bounded identity descriptor cache
    #[serde(default = "default_identity_cache_capacity")]
    pub identity_cache_capacity: usize,

    /// When true, a case type that fails to load is skipped with a warning
    /// instead of failing codec-tree construction
    #[serde(default = "default_true")]
    pub lenient_missing_cases: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            identity_cache_capacity: default_identity_cache_capacity(),
            lenient_missing_cases: true,
        }
    }
}

fn default_identity_cache_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.identity_cache_capacity, 256);
        assert!(config.lenient_missing_cases);
    }

    #[test]
    fn test_toml_round_trip() {
        let config: CodecConfig = toml::from_str(
            r#"
            identity_cache_capacity = 8
            lenient_missing_cases = false
            "#,
        )
        .unwrap();
        assert_eq!(config.identity_cache_capacity, 8);
        assert!(!config.lenient_missing_cases);

        // Omitted fields fall back to defaults
        let partial: CodecConfig = toml::from_str("identity_cache_capacity = 4").unwrap();
        assert_eq!(partial.identity_cache_capacity, 4);
        assert!(partial.lenient_missing_cases);
    }
}
