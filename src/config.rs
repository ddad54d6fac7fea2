// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

mod audio;
mod error;

pub use self::audio::Audio;
pub use self::error::ConfigError;

/// Prefix for environment overrides, e.g. MIXGRAPH_AUDIO__ENABLED=false.
const ENV_PREFIX: &str = "MIXGRAPH";

/// The top level configuration of the sound system.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct System {
    /// Output and engine settings.
    audio: Option<Audio>,

    /// Buses to create at startup in addition to the default bus.
    buses: Option<Vec<String>>,
}

impl System {
    /// Creates a configuration with the given audio settings and no extra buses.
    pub fn new(audio: Audio) -> System {
        System {
            audio: Some(audio),
            buses: None,
        }
    }

    /// Reads the configuration from a YAML file, applying environment overrides on top.
    pub fn deserialize(path: &Path) -> Result<System, ConfigError> {
        let system = Config::builder()
            .add_source(File::from(path))
            .add_source(environment())
            .build()?
            .try_deserialize::<System>()?;
        system.audio().validate()?;
        Ok(system)
    }

    /// Parses the configuration from a YAML string. Environment overrides still apply.
    pub fn from_yaml(yaml: &str) -> Result<System, ConfigError> {
        let system = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .add_source(environment())
            .build()?
            .try_deserialize::<System>()?;
        system.audio().validate()?;
        Ok(system)
    }

    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    pub fn buses(&self) -> &[String] {
        self.buses.as_deref().unwrap_or(&[])
    }
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod test {
    use std::{fs, time::Duration};

    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_from_yaml() -> Result<(), ConfigError> {
        let system = System::from_yaml(
            r#"
            audio:
              enabled: false
              device: mock-device
              sample_rate: 44100
              channels: 4
              tick_interval: 5ms
            buses: [Music, Sfx]
            "#,
        )?;

        let audio = system.audio();
        assert!(!audio.enabled());
        assert_eq!(audio.device(), "mock-device");
        assert_eq!(audio.sample_rate(), 44100);
        assert_eq!(audio.channels(), 4);
        assert_eq!(audio.tick_interval()?, Duration::from_millis(5));
        assert_eq!(system.buses(), ["Music".to_string(), "Sfx".to_string()]);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_empty_sections_use_defaults() -> Result<(), ConfigError> {
        let system = System::from_yaml("buses: []")?;
        assert!(system.audio().enabled());
        assert_eq!(system.audio().device(), "default");
        assert!(system.buses().is_empty());
        Ok(())
    }

    #[test]
    #[serial]
    fn test_deserialize_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("mixgraph.yaml");
        fs::write(&path, "audio:\n  device: mock\nbuses:\n  - Ambience\n")?;

        let system = System::deserialize(&path)?;
        assert_eq!(system.audio().device(), "mock");
        assert_eq!(system.buses(), ["Ambience".to_string()]);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_missing_file() {
        let result = System::deserialize(Path::new("/nonexistent/mixgraph.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    #[serial]
    fn test_invalid_values_rejected() {
        let result = System::from_yaml("audio:\n  tick_interval: whenever\n");
        assert!(matches!(result, Err(ConfigError::InvalidDuration(_, _))));

        let result = System::from_yaml("audio:\n  sample_rate: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidAudio("sample_rate", _))
        ));
    }

    #[test]
    #[serial]
    fn test_environment_override() -> Result<(), ConfigError> {
        std::env::set_var("MIXGRAPH_AUDIO__ENABLED", "false");
        let result = System::from_yaml("audio:\n  enabled: true\n  device: mock\n");
        std::env::remove_var("MIXGRAPH_AUDIO__ENABLED");

        let system = result?;
        assert!(!system.audio().enabled());
        assert_eq!(system.audio().device(), "mock");
        Ok(())
    }
}
