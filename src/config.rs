//! Configuration file handling.
//!
//! Analysis settings are read from `.agata.toml` files. Every key is optional;
//! command-line arguments take precedence over values found in the file.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::AgataError;
use crate::events::HYPO_THRESHOLD;
use crate::types::GlycemicTarget;

/// Name of the configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".agata.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub analysis: AnalysisSection,

    #[serde(default)]
    pub processing: ProcessingSection,

    #[serde(default)]
    pub events: EventsSection,

    #[serde(default)]
    pub comparison: ComparisonSection,
}

/// Metric settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    /// Threshold set used by time-in-range metrics.
    #[serde(default)]
    pub glycemic_target: GlycemicTarget,
}

/// Preprocessing applied to each profile before analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingSection {
    /// Retime traces onto a grid with this step (minutes).
    #[serde(default)]
    pub retime_step: Option<u32>,

    /// Linearly impute gaps up to this length (minutes).
    #[serde(default)]
    pub impute_max_gap: Option<u32>,
}

/// Event detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsSection {
    /// Threshold (mg/dl) for extended hypoglycemic events.
    #[serde(default = "default_extended_hypo_threshold")]
    pub extended_hypo_threshold: f64,
}

impl Default for EventsSection {
    fn default() -> Self {
        Self {
            extended_hypo_threshold: default_extended_hypo_threshold(),
        }
    }
}

fn default_extended_hypo_threshold() -> f64 {
    HYPO_THRESHOLD
}

/// Two-arm comparison settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSection {
    /// Significance level.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Whether arm profiles are paired (same subjects in both arms).
    #[serde(default)]
    pub is_paired: bool,
}

impl Default for ComparisonSection {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            is_paired: false,
        }
    }
}

fn default_alpha() -> f64 {
    0.05
}

impl AnalysisConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, AgataError> {
        let config: AnalysisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, AgataError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>, AgataError> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.agata.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>, AgataError> {
        let path = dir.join(DEFAULT_CONFIG_FILE);
        if path.exists() {
            Ok(Some(Self::load(&path)?))
        } else {
            Ok(None)
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&AnalysisConfig::default()).unwrap_or_default()
    }

    fn validate(&self) -> Result<(), AgataError> {
        if !(self.comparison.alpha > 0.0 && self.comparison.alpha < 1.0) {
            return Err(AgataError::Validation(format!(
                "comparison.alpha must be in (0, 1), got {}",
                self.comparison.alpha
            )));
        }
        if self.processing.retime_step == Some(0) {
            return Err(AgataError::Validation(
                "processing.retime_step must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert_eq!(config.analysis.glycemic_target, GlycemicTarget::Diabetes);
        assert_eq!(config.processing.retime_step, None);
        assert_eq!(config.events.extended_hypo_threshold, 70.0);
        assert_eq!(config.comparison.alpha, 0.05);
        assert!(!config.comparison.is_paired);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[analysis]
glycemic_target = "pregnancy"

[processing]
retime_step = 5
impute_max_gap = 45

[comparison]
alpha = 0.01
is_paired = true
"#;

        let config = AnalysisConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.analysis.glycemic_target, GlycemicTarget::Pregnancy);
        assert_eq!(config.processing.retime_step, Some(5));
        assert_eq!(config.processing.impute_max_gap, Some(45));
        assert_eq!(config.events, EventsSection::default());
        assert_eq!(config.comparison.alpha, 0.01);
        assert!(config.comparison.is_paired);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            AnalysisConfig::from_toml("[analysis]\nglycemic_target = \"type1\"\n"),
            Err(AgataError::Config(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml("[comparison]\nalpha = 1.5\n"),
            Err(AgataError::Validation(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml("[processing]\nretime_step = 0\n"),
            Err(AgataError::Validation(_))
        ));
    }

    #[test]
    fn test_default_toml_round_trip() {
        let toml_str = AnalysisConfig::default_toml();
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[comparison]"));
        let parsed = AnalysisConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed, AnalysisConfig::default());
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(AnalysisConfig::load_from_dir(dir.path()).unwrap(), None);

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[events]\nextended_hypo_threshold = 60.0\n",
        )
        .unwrap();
        let config = AnalysisConfig::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.events.extended_hypo_threshold, 60.0);
    }
}
