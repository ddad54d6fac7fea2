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

use std::{error::Error, f32::consts::PI, fs::File, path::PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::{asset::SoundAsset, engine::sampled::AudioBuffer, ids::AssetId};

/// Writes planar float channels as an interleaved 32-bit float WAV file.
pub fn write_wav(
    path: PathBuf,
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let file = File::create(path)?;
    assert!(channels.len() <= u16::MAX.into(), "Too many channels!");
    let mut writer = WavWriter::new(
        file,
        WavSpec {
            channels: channels.len() as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    for frame in 0..frames {
        for channel in &channels {
            writer.write_sample(channel.get(frame).copied().unwrap_or(0.0))?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// A sine wave.
pub fn sine(frequency: f32, amplitude: f32, sample_rate: f32, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate).sin())
        .collect()
}

/// A mono asset of constant value, handy for checking gains.
pub fn constant_asset(id: u64, value: f32, sample_rate: f32, seconds: f32) -> SoundAsset {
    let frames = (sample_rate * seconds) as usize;
    SoundAsset::new(
        AssetId::new(id),
        AudioBuffer::new(sample_rate, vec![vec![value; frames]]),
    )
}

/// A mono sine asset.
pub fn sine_asset(id: u64, frequency: f32, sample_rate: f32, seconds: f32) -> SoundAsset {
    let frames = (sample_rate * seconds) as usize;
    SoundAsset::new(
        AssetId::new(id),
        AudioBuffer::new(sample_rate, vec![sine(frequency, 0.5, sample_rate, frames)]),
    )
}
