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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, warn, Level};

use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use super::{DeviceInfo, OutputError};
use crate::config;
use crate::engine::Context;
use crate::playsync::CancelHandle;

const DEFAULT_DEVICE: &str = "default";

/// Extracts the device name via `description()`.
fn device_name(device: &cpal::Device) -> Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// Lists every output-capable device across all hosts, sorted by name.
pub fn list_devices() -> Result<Vec<DeviceInfo>, OutputError> {
    Ok(list_cpal_devices()?
        .into_iter()
        .map(|(info, _)| info)
        .collect())
}

fn list_cpal_devices() -> Result<Vec<(DeviceInfo, cpal::Device)>, OutputError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|output_config| output_config.channels())
                .max()
                .unwrap_or(0);

            if max_channels > 0 {
                devices.push((
                    DeviceInfo {
                        name: device_name(&device)?,
                        host: host_id.name().to_string(),
                        max_channels,
                    },
                    device,
                ));
            }
        }
    }

    devices.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    Ok(devices)
}

/// Resolves "default" to the default host's output device, anything else by name.
fn find_device(name: &str) -> Result<(String, cpal::Device), OutputError> {
    if name == DEFAULT_DEVICE {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(OutputError::NoDefaultDevice)?;
        return Ok((device_name(&device)?, device));
    }

    list_cpal_devices()?
        .into_iter()
        .find(|(info, _)| info.name.trim() == name)
        .map(|(info, device)| (info.name, device))
        .ok_or_else(|| OutputError::NoDevice(name.to_string()))
}

/// Builds a stream whose callback renders the context into the device's sample type.
fn build_stream<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    context: Arc<Context>,
) -> Result<cpal::Stream, OutputError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = usize::from(stream_config.channels);
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;
    let mut scratch = Vec::<f32>::new();

    Ok(device.build_output_stream(
        stream_config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
            scratch.resize(data.len(), 0.0);
            context.render_interleaved(&mut scratch, channels);
            for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                *dst = T::from_sample(src);
            }
        },
        |err| error!(err = %err, "Output stream error"),
        None,
    )?)
}

fn start_stream(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    context: Arc<Context>,
) -> Result<cpal::Stream, OutputError> {
    let stream = match device.default_output_config()?.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, stream_config, context)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(device, stream_config, context)?,
        cpal::SampleFormat::I32 => build_stream::<i32>(device, stream_config, context)?,
        format => return Err(OutputError::UnsupportedFormat(format!("{:?}", format))),
    };
    stream.play()?;
    Ok(stream)
}

/// An output backed by a cpal stream. The stream lives on a dedicated thread, since
/// streams are not `Send` on every platform.
pub struct Output {
    name: String,
    cancel_handle: CancelHandle,
    running: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    /// Opens the configured device and starts rendering from `context`.
    pub fn start(config: &config::Audio, context: Arc<Context>) -> Result<Output, OutputError> {
        let span = span!(Level::INFO, "output (cpal)");
        let _enter = span.enter();

        let (name, device) = find_device(config.device())?;
        let stream_config = cpal::StreamConfig {
            channels: config.channels(),
            sample_rate: config.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        let cancel_handle = CancelHandle::new();
        let running = Arc::new(AtomicBool::new(false));
        let (startup_tx, startup_rx) = mpsc::sync_channel::<Result<(), OutputError>>(1);

        let output_thread = {
            let cancel_handle = cancel_handle.clone();
            let running = running.clone();
            thread::spawn(move || {
                let stream = match start_stream(&device, &stream_config, context) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = startup_tx.send(Err(e));
                        return;
                    }
                };
                running.store(true, Ordering::Release);
                let _ = startup_tx.send(Ok(()));

                // Keep the stream alive until cancelled.
                cancel_handle.wait(Arc::new(AtomicBool::new(false)));
                drop(stream);
                running.store(false, Ordering::Release);
            })
        };

        let startup = startup_rx.recv().map_err(|_| OutputError::ThreadExited)?;
        if let Err(e) = startup {
            let _ = output_thread.join();
            return Err(e);
        }

        info!(
            device = name,
            sample_rate = config.sample_rate(),
            channels = config.channels(),
            "Output stream started."
        );
        Ok(Output {
            name,
            cancel_handle,
            running,
            output_thread: Some(output_thread),
        })
    }
}

impl super::Output for Output {
    fn stop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.output_thread.take() {
            if thread.join().is_err() {
                warn!(device = self.name, "Output thread panicked");
            }
            info!(device = self.name, "Output stream stopped.");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        super::Output::stop(self);
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (cpal)", self.name)
    }
}
