/// Configuration file support for slbridge
///
/// A bridge is described by the robot namespace, the descriptor file the
/// controller wrote, and the locking/layout policies. Supports TOML and YAML
/// with auto-detection and standard search paths.
use crate::error::{BridgeError, BridgeResult};
use crate::sync::WaitPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What to do when an encoded message does not match the channel size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthPolicy {
    /// Count an error and write nothing
    #[default]
    Reject,
    /// Log a warning and write the clamped message
    Warn,
}

fn default_lock_timeout() -> f64 {
    1.0
}

fn default_command_columns() -> usize {
    crate::codec::COMMAND_COLUMNS
}

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Robot name prefixed to every channel (`<namespace>.<channel>`)
    pub namespace: String,

    /// Descriptor file written by the controller
    pub descriptor_file: PathBuf,

    /// Seconds to poll for a lock; zero or negative means a single attempt
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: f64,

    #[serde(default)]
    pub length_policy: LengthPolicy,

    /// Columns of the inbound command matrix
    #[serde(default = "default_command_columns")]
    pub command_columns: usize,
}

impl BridgeConfig {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(namespace: S, descriptor_file: P) -> Self {
        Self {
            namespace: namespace.into(),
            descriptor_file: descriptor_file.into(),
            lock_timeout_secs: default_lock_timeout(),
            length_policy: LengthPolicy::default(),
            command_columns: default_command_columns(),
        }
    }

    /// Wait policy used by the message operations
    pub fn wait_policy(&self) -> WaitPolicy {
        if self.lock_timeout_secs > 0.0 {
            WaitPolicy::Timed(self.lock_timeout_secs)
        } else {
            WaitPolicy::NoWait
        }
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.namespace.is_empty() || self.namespace.contains(char::is_whitespace) {
            return Err(BridgeError::config(format!(
                "Invalid namespace '{}'",
                self.namespace
            )));
        }
        if !self.lock_timeout_secs.is_finite() {
            return Err(BridgeError::config("lock_timeout_secs must be finite"));
        }
        if self.command_columns == 0 {
            return Err(BridgeError::config("command_columns must be positive"));
        }
        Ok(())
    }

    /// Load config from a file (auto-detect format)
    pub fn from_file<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("Failed to read config file: {}", e)))?;

        let extension = path.extension().and_then(|s| s.to_str());
        match extension {
            Some("toml") => Self::from_toml(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            _ => Self::from_toml(&contents).or_else(|_| Self::from_yaml(&contents)),
        }
    }

    /// Parse config from TOML string
    pub fn from_toml(contents: &str) -> BridgeResult<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| BridgeError::config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse config from YAML string
    pub fn from_yaml(contents: &str) -> BridgeResult<Self> {
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| BridgeError::config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Find and load config file from standard search paths
    ///
    /// Search order:
    /// 1. ./slbridge.toml or ./slbridge.yaml
    /// 2. ~/.slbridge/config.toml or ~/.slbridge/config.yaml
    /// 3. /etc/slbridge/config.toml or /etc/slbridge/config.yaml
    pub fn find_and_load() -> BridgeResult<Self> {
        for path in Self::get_search_paths() {
            if path.exists() {
                log::debug!("Loading bridge config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        Err(BridgeError::config("No config file found in standard locations"))
    }

    /// Get standard config file search paths
    pub fn get_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("slbridge.toml"),
            PathBuf::from("slbridge.yaml"),
            PathBuf::from("slbridge.yml"),
        ];

        if let Some(home) = dirs::home_dir() {
            let dir = home.join(".slbridge");
            paths.push(dir.join("config.toml"));
            paths.push(dir.join("config.yaml"));
            paths.push(dir.join("config.yml"));
        }

        paths.push(PathBuf::from("/etc/slbridge/config.toml"));
        paths.push(PathBuf::from("/etc/slbridge/config.yaml"));

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            namespace = "robot"
            descriptor_file = "/tmp/sl_shm_objects"
            lock_timeout_secs = 0.5
            length_policy = "warn"
        "#;

        let config = BridgeConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.namespace, "robot");
        assert_eq!(config.length_policy, LengthPolicy::Warn);
        assert_eq!(config.wait_policy(), WaitPolicy::Timed(0.5));
        assert_eq!(config.command_columns, 5);
    }

    #[test]
    fn test_parse_yaml_defaults() {
        let yaml_str = r#"
            namespace: robot
            descriptor_file: /tmp/sl_shm_objects
        "#;

        let config = BridgeConfig::from_yaml(yaml_str).unwrap();
        assert_eq!(config.length_policy, LengthPolicy::Reject);
        assert_eq!(config.wait_policy(), WaitPolicy::Timed(1.0));
    }

    #[test]
    fn test_zero_timeout_is_no_wait() {
        let mut config = BridgeConfig::new("robot", "/tmp/x");
        config.lock_timeout_secs = 0.0;
        assert_eq!(config.wait_policy(), WaitPolicy::NoWait);
    }

    #[test]
    fn test_invalid_namespace() {
        let toml_str = r#"
            namespace = "my robot"
            descriptor_file = "/tmp/x"
        "#;
        assert!(BridgeConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_from_file_autodetect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.conf");
        std::fs::write(&path, "namespace: robot\ndescriptor_file: /tmp/x\n").unwrap();

        let config = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(config.namespace, "robot");
    }

    #[test]
    fn test_search_paths() {
        let paths = BridgeConfig::get_search_paths();
        assert_eq!(paths[0], PathBuf::from("slbridge.toml"));
        assert!(paths.iter().any(|p| p.starts_with("/etc/slbridge")));
    }
}
