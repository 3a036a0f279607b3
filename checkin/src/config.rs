//! Configuration management for the check-in scanner.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::dimensions::DEFAULT_RESTART_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Scanner configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Delay before scanning resumes after a confirmed check-in, in milliseconds
    pub auto_resume_ms: u64,
    /// Quiet period after a layout change before the camera restarts, in milliseconds
    pub restart_debounce_ms: u64,
    /// Delay before re-sampling the surface after an orientation change, in milliseconds
    pub orientation_settle_ms: u64,
    /// Relative size change that counts as a layout shift
    pub restart_threshold: f64,
    /// Decode attempts per second
    pub fps: u32,
    /// Attendance API configuration
    pub api: ApiConfig,
}

/// Attendance API configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the attendance API
    pub base_url: String,
    /// Bearer token sent with confirmation calls
    pub token: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            auto_resume_ms: 2000,
            restart_debounce_ms: 800,
            orientation_settle_ms: 200,
            restart_threshold: DEFAULT_RESTART_THRESHOLD,
            fps: 10,
            api: ApiConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".to_string(),
            token: None,
        }
    }
}

impl ScannerConfig {
    /// Load configuration from environment variables.
    ///
    /// Missing or unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            auto_resume_ms: parsed(&lookup, "SCANNER_AUTO_RESUME_MS")
                .unwrap_or(defaults.auto_resume_ms),
            restart_debounce_ms: parsed(&lookup, "SCANNER_RESTART_DEBOUNCE_MS")
                .unwrap_or(defaults.restart_debounce_ms),
            orientation_settle_ms: parsed(&lookup, "SCANNER_ORIENTATION_SETTLE_MS")
                .unwrap_or(defaults.orientation_settle_ms),
            restart_threshold: parsed::<f64>(&lookup, "SCANNER_RESTART_THRESHOLD")
                .filter(|threshold| threshold.is_finite() && *threshold >= 0.0)
                .unwrap_or(defaults.restart_threshold),
            fps: parsed::<u32>(&lookup, "SCANNER_FPS")
                .filter(|fps| *fps > 0)
                .unwrap_or(defaults.fps),
            api: ApiConfig {
                base_url: lookup("CHECKIN_API_BASE_URL").unwrap_or(defaults.api.base_url),
                token: lookup("CHECKIN_API_TOKEN").filter(|token| !token.is_empty()),
            },
        }
    }

    /// Auto-resume delay
    #[must_use]
    pub const fn auto_resume(&self) -> Duration {
        Duration::from_millis(self.auto_resume_ms)
    }

    /// Restart debounce window
    #[must_use]
    pub const fn restart_debounce(&self) -> Duration {
        Duration::from_millis(self.restart_debounce_ms)
    }

    /// Orientation settle delay
    #[must_use]
    pub const fn orientation_settle(&self) -> Duration {
        Duration::from_millis(self.orientation_settle_ms)
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = ScannerConfig::from_lookup(lookup(&[]));
        assert_eq!(config, ScannerConfig::default());
        assert_eq!(config.auto_resume(), Duration::from_millis(2000));
        assert_eq!(config.restart_debounce(), Duration::from_millis(800));
        assert_eq!(config.orientation_settle(), Duration::from_millis(200));
        assert_eq!(config.fps, 10);
    }

    #[test]
    fn overrides_from_environment() {
        let config = ScannerConfig::from_lookup(lookup(&[
            ("SCANNER_AUTO_RESUME_MS", "3500"),
            ("SCANNER_RESTART_THRESHOLD", "0.25"),
            ("SCANNER_FPS", " 15 "),
            ("CHECKIN_API_BASE_URL", "https://checkin.example.com"),
            ("CHECKIN_API_TOKEN", "secret"),
        ]));

        assert_eq!(config.auto_resume_ms, 3500);
        assert!((config.restart_threshold - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.fps, 15);
        assert_eq!(config.api.base_url, "https://checkin.example.com");
        assert_eq!(config.api.token.as_deref(), Some("secret"));
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = ScannerConfig::from_lookup(lookup(&[
            ("SCANNER_RESTART_DEBOUNCE_MS", "soon"),
            ("SCANNER_RESTART_THRESHOLD", "-1"),
            ("SCANNER_FPS", "0"),
            ("CHECKIN_API_TOKEN", ""),
        ]));

        assert_eq!(config.restart_debounce_ms, 800);
        assert!((config.restart_threshold - DEFAULT_RESTART_THRESHOLD).abs() < f64::EPSILON);
        assert_eq!(config.fps, 10);
        assert_eq!(config.api.token, None);
    }
}
