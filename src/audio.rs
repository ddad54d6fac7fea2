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
use std::{fmt, sync::Arc};

use crate::config;
use crate::engine::Context;

pub mod cpal;
pub mod mock;
pub mod thread_priority;

/// Errors raised while enumerating devices or running an output stream.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("No output device found with name {0}")]
    NoDevice(String),

    #[error("No default output device available")]
    NoDefaultDevice,

    #[error("Unsupported sample format {0}")]
    UnsupportedFormat(String),

    #[error("Output thread exited before reporting startup")]
    ThreadExited,

    #[error("Unable to read device name: {0}")]
    DeviceName(#[from] ::cpal::DeviceNameError),

    #[error("Unable to list devices: {0}")]
    Devices(#[from] ::cpal::DevicesError),

    #[error("Unable to open host: {0}")]
    Host(#[from] ::cpal::HostUnavailable),

    #[error("Unable to query device configuration: {0}")]
    Configs(#[from] ::cpal::SupportedStreamConfigsError),

    #[error("Unable to query default configuration: {0}")]
    DefaultConfig(#[from] ::cpal::DefaultStreamConfigError),

    #[error("Unable to build output stream: {0}")]
    BuildStream(#[from] ::cpal::BuildStreamError),

    #[error("Unable to start output stream: {0}")]
    PlayStream(#[from] ::cpal::PlayStreamError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An output device as reported by device enumeration.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// A running output that pulls audio from a context until stopped.
pub trait Output: fmt::Display + Send {
    /// Stops the output and waits for its thread to exit. Calling it twice is harmless.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<DeviceInfo>, OutputError> {
    cpal::list_devices()
}

/// Starts an output for the configured device, rendering from `context`. Device names
/// starting with "mock" get a mock output that renders without hardware.
pub fn start_output(
    config: &config::Audio,
    context: Arc<Context>,
) -> Result<Box<dyn Output>, OutputError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Output::start(device, context)));
    }

    Ok(Box::new(cpal::Output::start(config, context)?))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::ContextOptions;
    use crate::testutil::eventually;

    #[test]
    fn test_device_info_display() {
        let info = DeviceInfo {
            name: "Interface".to_string(),
            host: "ALSA".to_string(),
            max_channels: 8,
        };
        assert_eq!(info.to_string(), "Interface (Channels=8) (ALSA)");
    }

    #[test]
    fn test_start_mock_output() -> Result<(), Box<dyn std::error::Error>> {
        let context = Context::new(ContextOptions::default())?;
        let mut output = start_output(&config::Audio::new("mock-output"), context.clone())?;
        assert!(output.is_running());
        assert_eq!(output.to_string(), "mock-output (Mock)");

        eventually(
            || context.current_frame() > 0,
            "Mock output never rendered",
        );

        output.stop();
        assert!(!output.is_running());
        output.stop();
        Ok(())
    }
}
