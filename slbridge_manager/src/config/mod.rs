//! Bridge configuration for the command line
//!
//! Flags override whatever the config file says.

use anyhow::{bail, Context, Result};
use slbridge_core::{BridgeConfig, DescriptorTable, ShmBridge};
use std::path::PathBuf;

/// Connection flags shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub config: Option<PathBuf>,
    pub descriptors: Option<PathBuf>,
    pub namespace: Option<String>,
    pub timeout: Option<f64>,
}

impl ConnectOptions {
    /// Build the bridge configuration from flags and config files
    pub fn resolve(&self) -> Result<BridgeConfig> {
        let mut config = match (&self.config, &self.descriptors, &self.namespace) {
            (Some(path), _, _) => BridgeConfig::from_file(path)
                .with_context(|| format!("Failed to load config {:?}", path))?,
            (None, Some(descriptors), Some(namespace)) => {
                BridgeConfig::new(namespace.clone(), descriptors.clone())
            }
            _ => BridgeConfig::find_and_load().context(
                "No config file found; pass --config or both --descriptors and --namespace",
            )?,
        };

        if let Some(descriptors) = &self.descriptors {
            config.descriptor_file = descriptors.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if let Some(timeout) = self.timeout {
            config.lock_timeout_secs = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the descriptor table, without attaching anything
    pub fn load_table(&self) -> Result<(BridgeConfig, DescriptorTable)> {
        let config = self.resolve()?;
        let table = DescriptorTable::from_file(&config.descriptor_file)?;
        Ok((config, table))
    }

    /// Attach to the controller's System-V objects
    pub fn connect(&self) -> Result<ShmBridge> {
        let config = self.resolve()?;
        let bridge = ShmBridge::connect(&config).with_context(|| {
            format!(
                "Failed to attach to controller '{}' using {:?}",
                config.namespace, config.descriptor_file
            )
        })?;
        Ok(bridge)
    }
}

/// Accept either a channel name or its semaphore name
pub fn semaphore_name(channel: &str) -> String {
    if channel.ends_with(slbridge_core::bridge::SEM_SUFFIX) {
        channel.to_string()
    } else {
        slbridge_core::bridge::semaphore_for(channel)
    }
}

/// Strip a leading `<namespace>.` if the user typed a qualified name
pub fn logical_name<'a>(namespace: &str, channel: &'a str) -> Result<&'a str> {
    let name = match channel.strip_prefix(namespace) {
        Some(rest) if rest.starts_with('.') => &rest[1..],
        _ => channel,
    };
    if name.is_empty() {
        bail!("Empty channel name");
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_without_config_file() {
        let options = ConnectOptions {
            descriptors: Some(PathBuf::from("/tmp/objects")),
            namespace: Some("robot".into()),
            timeout: Some(0.0),
            ..Default::default()
        };
        let config = options.resolve().unwrap();
        assert_eq!(config.namespace, "robot");
        assert_eq!(config.descriptor_file, PathBuf::from("/tmp/objects"));
        assert_eq!(config.wait_policy(), slbridge_core::WaitPolicy::NoWait);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slbridge.toml");
        std::fs::write(&path, "namespace = \"robot\"\ndescriptor_file = \"/tmp/a\"\n").unwrap();

        let options = ConnectOptions {
            config: Some(path),
            namespace: Some("other".into()),
            ..Default::default()
        };
        let config = options.resolve().unwrap();
        assert_eq!(config.namespace, "other");
        assert_eq!(config.descriptor_file, PathBuf::from("/tmp/a"));
    }

    #[test]
    fn test_names() {
        assert_eq!(semaphore_name("smDCommands"), "smDCommands_sem");
        assert_eq!(semaphore_name("smDCommands_sem"), "smDCommands_sem");
        assert_eq!(logical_name("robot", "robot.smBaseState").unwrap(), "smBaseState");
        assert_eq!(logical_name("robot", "smBaseState").unwrap(), "smBaseState");
        assert!(logical_name("robot", "robot.").is_err());
    }
}
