//! Launch configuration.
//!
//! The shell collects string key/value pairs from wherever the platform keeps
//! launch arguments (intent extras on Android, the environment elsewhere) and
//! hands a lookup function to [`Config::from_lookup`].

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Number of imported hardware buffers the renderer may hold at once.
pub const DEFAULT_IMPORT_CACHE_CAPACITY: usize = 64;

const KEY_MEDIA_SOURCE: &str = "mediaSrc";
const KEY_EXTERNAL_FORMAT: &str = "useVkExternalFormat";
const KEY_VALIDATION: &str = "useVkValidation";
const KEY_CACHE_CAPACITY: &str = "importCacheCapacity";

/// When to import hardware buffers through a driver-defined external format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExternalFormatPolicy {
    /// Prefer a device-native format, fall back to the external format.
    #[default]
    Auto,
    /// Always use the external format.
    Always,
    /// Never use the external format; buffers without a native format fail.
    Never,
}

impl FromStr for ExternalFormatPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Self::Auto),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(Error::Config(format!(
                "{KEY_EXTERNAL_FORMAT} must be auto, always or never, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ExternalFormatPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        })
    }
}

/// Settings for one playback session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Path of the video file to play.
    pub media_source: String,
    pub external_format: ExternalFormatPolicy,
    /// Enable the Khronos validation layer and the debug messenger.
    pub validation: bool,
    pub import_cache_capacity: usize,
}

impl Config {
    /// Config for `media_source` with every other field at its default.
    pub fn new(media_source: impl Into<String>) -> Self {
        Self {
            media_source: media_source.into(),
            external_format: ExternalFormatPolicy::default(),
            validation: false,
            import_cache_capacity: DEFAULT_IMPORT_CACHE_CAPACITY,
        }
    }

    /// Build a config from a key/value source.
    ///
    /// `mediaSrc` is required. Unknown or malformed values are rejected rather
    /// than replaced by defaults.
    ///
    /// # Example
    /// ```
    /// use vkplay_core::{Config, ExternalFormatPolicy};
    ///
    /// let config = Config::from_lookup(|key| match key {
    ///     "mediaSrc" => Some("/sdcard/clip.mp4".to_string()),
    ///     "useVkExternalFormat" => Some("always".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.external_format, ExternalFormatPolicy::Always);
    /// assert!(!config.validation);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let media_source = lookup(KEY_MEDIA_SOURCE)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config(format!("missing required argument {KEY_MEDIA_SOURCE}")))?;

        let mut config = Self::new(media_source);

        if let Some(value) = lookup(KEY_EXTERNAL_FORMAT) {
            config.external_format = value.parse()?;
        }

        if let Some(value) = lookup(KEY_VALIDATION) {
            config.validation = match value.as_str() {
                "true" => true,
                "false" => false,
                other => {
                    return Err(Error::Config(format!(
                        "{KEY_VALIDATION} must be true or false, got '{other}'"
                    )));
                }
            };
        }

        if let Some(value) = lookup(KEY_CACHE_CAPACITY) {
            config.import_cache_capacity = match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(Error::Config(format!(
                        "{KEY_CACHE_CAPACITY} must be a positive integer, got '{value}'"
                    )));
                }
            };
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[("mediaSrc", "/data/a.mp4")])).unwrap();
        assert_eq!(config, Config::new("/data/a.mp4"));
        assert_eq!(config.external_format, ExternalFormatPolicy::Auto);
        assert!(!config.validation);
        assert_eq!(config.import_cache_capacity, DEFAULT_IMPORT_CACHE_CAPACITY);
    }

    #[test]
    fn test_all_keys() {
        let config = Config::from_lookup(lookup_from(&[
            ("mediaSrc", "/data/a.mp4"),
            ("useVkExternalFormat", "never"),
            ("useVkValidation", "true"),
            ("importCacheCapacity", "16"),
        ]))
        .unwrap();
        assert_eq!(config.external_format, ExternalFormatPolicy::Never);
        assert!(config.validation);
        assert_eq!(config.import_cache_capacity, 16);
    }

    #[test]
    fn test_missing_media_source() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Config::from_lookup(lookup_from(&[("mediaSrc", "")])).is_err());
    }

    #[test]
    fn test_bad_values_are_rejected() {
        for (key, value) in [
            ("useVkExternalFormat", "sometimes"),
            ("useVkValidation", "yes"),
            ("importCacheCapacity", "0"),
            ("importCacheCapacity", "lots"),
        ] {
            let result = Config::from_lookup(lookup_from(&[("mediaSrc", "/a"), (key, value)]));
            assert!(matches!(result, Err(Error::Config(_))), "{key}={value}");
        }
    }

    #[test]
    fn test_policy_round_trips_through_display() {
        for policy in [
            ExternalFormatPolicy::Auto,
            ExternalFormatPolicy::Always,
            ExternalFormatPolicy::Never,
        ] {
            assert_eq!(policy.to_string().parse::<ExternalFormatPolicy>().unwrap(), policy);
        }
    }
}
