//! Observation store configuration.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ObsError, Result};
use crate::partition::DistributionPolicy;

/// A file reference, `{ "filepath": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSpec {
    /// Base path; the codec appends the extension.
    pub filepath: String,
}

impl FileSpec {
    pub fn new<S: Into<String>>(filepath: S) -> Self {
        FileSpec {
            filepath: filepath.into(),
        }
    }
}

/// Input and output files of a store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObsDataConfig {
    #[serde(default)]
    pub obsdatain: Option<FileSpec>,
    #[serde(default)]
    pub obsdataout: Option<FileSpec>,
    #[serde(default)]
    pub obsdatain_screened: Option<FileSpec>,
    #[serde(default)]
    pub obsdataout_screened: Option<FileSpec>,
}

/// Settings for synthetic generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Number of observations to draw.
    pub density: usize,
    /// Variable whose vertical extent bounds the drawn heights.
    pub variable: String,
    /// Constant error per declared variable.
    pub error: Vec<f64>,
    /// Name of the generated error group.
    #[serde(default = "default_obserror")]
    pub obserror: String,
}

fn default_obserror() -> String {
    "ObsError".to_string()
}

fn default_name() -> String {
    "obspace".to_string()
}

/// Configuration of an [`ObsSpace`](crate::obs::ObsSpace).
///
/// ```
/// use obspace::obs::ObsSpaceConfig;
///
/// let config = ObsSpaceConfig::from_json(r#"{
///     "variables": ["temperature"],
///     "obs_data": { "obsdataout": { "filepath": "out/sonde" } }
/// }"#).unwrap();
/// assert_eq!(config.output_path(false), Some("out/sonde"));
/// assert_eq!(config.input_path(false), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObsSpaceConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub variables: Vec<String>,
    #[serde(default)]
    pub obs_data: Option<ObsDataConfig>,
    #[serde(default)]
    pub distribution: DistributionPolicy,
    #[serde(default)]
    pub generate: Option<GenerateConfig>,
}

impl ObsSpaceConfig {
    /// A configuration with no files.
    pub fn new(variables: Vec<String>) -> Self {
        ObsSpaceConfig {
            name: default_name(),
            variables,
            obs_data: None,
            distribution: DistributionPolicy::default(),
            generate: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: ObsSpaceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .map_err(|e| ObsError::file(path.display().to_string(), e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn with_input<S: Into<String>>(mut self, base: S) -> Self {
        self.obs_data.get_or_insert_with(Default::default).obsdatain = Some(FileSpec::new(base));
        self
    }

    pub fn with_output<S: Into<String>>(mut self, base: S) -> Self {
        self.obs_data.get_or_insert_with(Default::default).obsdataout = Some(FileSpec::new(base));
        self
    }

    /// Declared variables must be present, non-empty and unique.
    pub fn validate(&self) -> Result<()> {
        if self.variables.is_empty() {
            return Err(ObsError::configuration("no variables declared"));
        }
        let mut seen = HashSet::new();
        for variable in &self.variables {
            if variable.trim().is_empty() {
                return Err(ObsError::configuration("empty variable name"));
            }
            if !seen.insert(variable.as_str()) {
                return Err(ObsError::configuration(format!(
                    "variable {variable} declared twice"
                )));
            }
        }
        if let Some(generate) = &self.generate {
            generate.validate(&self.variables)?;
        }
        Ok(())
    }

    /// Base path to read, per store flavour.
    pub fn input_path(&self, screened: bool) -> Option<&str> {
        let data = self.obs_data.as_ref()?;
        let spec = if screened {
            data.obsdatain_screened.as_ref()
        } else {
            data.obsdatain.as_ref()
        };
        spec.map(|s| s.filepath.as_str())
    }

    /// Base path to write, per store flavour.
    pub fn output_path(&self, screened: bool) -> Option<&str> {
        let data = self.obs_data.as_ref()?;
        let spec = if screened {
            data.obsdataout_screened.as_ref()
        } else {
            data.obsdataout.as_ref()
        };
        spec.map(|s| s.filepath.as_str())
    }
}

impl GenerateConfig {
    pub fn validate(&self, variables: &[String]) -> Result<()> {
        if self.error.len() != variables.len() {
            return Err(ObsError::configuration(format!(
                "{} error values for {} variables",
                self.error.len(),
                variables.len()
            )));
        }
        if self.obserror.is_empty() {
            return Err(ObsError::configuration("empty error group name"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let config = ObsSpaceConfig::from_json(
            r#"{
                "name": "sonde",
                "variables": ["temperature", "humidity"],
                "distribution": "nearest_neighbor",
                "obs_data": {
                    "obsdatain": { "filepath": "in/sonde" },
                    "obsdataout_screened": { "filepath": "out/sonde" }
                },
                "generate": { "density": 100, "variable": "temperature", "error": [0.5, 0.1] }
            }"#,
        )
        .unwrap();
        assert_eq!(config.name, "sonde");
        assert_eq!(config.input_path(false), Some("in/sonde"));
        assert_eq!(config.input_path(true), None);
        assert_eq!(config.output_path(true), Some("out/sonde"));
        assert_eq!(config.generate.unwrap().obserror, "ObsError");
    }

    #[test]
    fn test_variable_validation() {
        assert!(ObsSpaceConfig::from_json(r#"{"variables": []}"#).is_err());
        assert!(ObsSpaceConfig::from_json(r#"{"variables": ["t", "t"]}"#).is_err());
        assert!(ObsSpaceConfig::from_json(r#"{"variables": ["t", " "]}"#).is_err());
        assert!(matches!(
            ObsSpaceConfig::from_json(r#"{"variables": "t"}"#),
            Err(ObsError::Json(_))
        ));
    }

    #[test]
    fn test_unknown_distribution_rejected() {
        let result = ObsSpaceConfig::from_json(r#"{"variables": ["t"], "distribution": "round_robin"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_generate_error_count() {
        let result = ObsSpaceConfig::from_json(
            r#"{"variables": ["t", "q"], "generate": {"density": 5, "variable": "t", "error": [1.0]}}"#,
        );
        assert!(matches!(result, Err(ObsError::Configuration(_))));
    }

    #[test]
    fn test_builders() {
        let config = ObsSpaceConfig::new(vec!["t".to_string()])
            .with_input("a")
            .with_output("b");
        assert_eq!(config.input_path(false), Some("a"));
        assert_eq!(config.output_path(false), Some("b"));
        assert!(config.validate().is_ok());
    }
}
