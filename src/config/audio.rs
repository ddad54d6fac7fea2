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
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::engine::ContextOptions;

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// Whether to open an output device at all.
    enabled: Option<bool>,

    /// The output device: a device name, "default", or a name starting with "mock".
    device: Option<String>,

    /// Sample rate of the engine and the output stream (default: 48000).
    sample_rate: Option<u32>,

    /// Output channels (default: 2).
    channels: Option<u16>,

    /// How often the system ticks, as a duration string (default: 16ms).
    tick_interval: Option<String>,
}

impl Audio {
    /// New will create a new Audio configuration for the given device.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Audio::default()
        }
    }

    /// Output is on unless explicitly disabled.
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    pub fn tick_interval(&self) -> Result<Duration, ConfigError> {
        match &self.tick_interval {
            Some(interval) => Ok(DurationString::from_string(interval.clone())
                .map_err(|e| ConfigError::InvalidDuration(interval.clone(), e.to_string()))?
                .into()),
            None => Ok(DEFAULT_TICK_INTERVAL),
        }
    }

    /// Checks values that would otherwise fail later at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate() == 0 {
            return Err(ConfigError::InvalidAudio(
                "sample_rate",
                "must be positive".to_string(),
            ));
        }
        if self.channels() == 0 {
            return Err(ConfigError::InvalidAudio(
                "channels",
                "must be positive".to_string(),
            ));
        }
        if self.tick_interval()?.is_zero() {
            return Err(ConfigError::InvalidAudio(
                "tick_interval",
                "must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Engine options matching this configuration.
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            sample_rate: self.sample_rate() as f32,
            channels: self.channels(),
            with_destination: true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::default();
        assert!(audio.enabled());
        assert_eq!(audio.device(), "default");
        assert_eq!(audio.sample_rate(), 48000);
        assert_eq!(audio.channels(), 2);
        assert_eq!(
            audio.tick_interval().expect("interval"),
            Duration::from_millis(16)
        );
        assert!(audio.validate().is_ok());
    }

    #[test]
    fn test_bad_values() {
        let audio = Audio {
            tick_interval: Some("soon".to_string()),
            ..Audio::default()
        };
        assert!(matches!(
            audio.tick_interval(),
            Err(ConfigError::InvalidDuration(_, _))
        ));

        let audio = Audio {
            channels: Some(0),
            ..Audio::default()
        };
        assert!(matches!(
            audio.validate(),
            Err(ConfigError::InvalidAudio("channels", _))
        ));
    }

    #[test]
    fn test_context_options() {
        let audio = Audio {
            sample_rate: Some(44100),
            channels: Some(6),
            ..Audio::new("mock")
        };
        let options = audio.context_options();
        assert_eq!(options.sample_rate, 44100.0);
        assert_eq!(options.channels, 6);
        assert!(options.with_destination);
    }
}
