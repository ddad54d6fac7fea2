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

/// A planar block of audio. Every channel has the same number of frames.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl Block {
    /// A silent block.
    pub fn silent(channels: usize, frames: usize) -> Block {
        Block {
            channels: vec![vec![0.0; frames]; channels.max(1)],
            frames,
        }
    }

    /// Builds a block from planar channel data. Short channels are zero padded.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Block {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        let mut channels = if channels.is_empty() {
            vec![Vec::new()]
        } else {
            channels
        };
        for channel in channels.iter_mut() {
            channel.resize(frames, 0.0);
        }
        Block { channels, frames }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Vec<f32>> {
        self.channels.iter_mut()
    }

    /// True if every sample is exactly zero.
    pub fn is_silent(&self) -> bool {
        self.channels.iter().flatten().all(|sample| *sample == 0.0)
    }

    /// Largest absolute sample value.
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flatten()
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()))
    }

    /// Averages every channel into one.
    pub fn mono(&self) -> Vec<f32> {
        let scale = 1.0 / self.channels.len() as f32;
        (0..self.frames)
            .map(|frame| self.channels.iter().map(|c| c[frame]).sum::<f32>() * scale)
            .collect()
    }

    /// Widens the block to the given channel count. Mono is duplicated, anything else is
    /// padded with silent channels.
    pub fn up_mix(&mut self, channels: usize) {
        if channels <= self.channels.len() {
            return;
        }
        if self.channels.len() == 1 {
            let mono = self.channels[0].clone();
            self.channels.resize(channels, mono);
        } else {
            self.channels.resize(channels, vec![0.0; self.frames]);
        }
    }

    /// Sums `other` into this block starting at `offset` frames, widening this block when
    /// `other` has more channels.
    pub fn mix_from(&mut self, other: &Block, offset: usize) {
        self.up_mix(other.channel_count());
        let frames = other.frames.min(self.frames.saturating_sub(offset));
        if other.channel_count() == 1 {
            let source = &other.channels[0][..frames];
            for channel in self.channels.iter_mut() {
                for (dst, src) in channel[offset..offset + frames].iter_mut().zip(source) {
                    *dst += *src;
                }
            }
            return;
        }
        for (channel, source) in self.channels.iter_mut().zip(other.channels.iter()) {
            for (dst, src) in channel[offset..offset + frames].iter_mut().zip(&source[..frames]) {
                *dst += *src;
            }
        }
    }

    /// Multiplies every sample by `gain`.
    pub fn scale(&mut self, gain: f32) {
        for sample in self.channels.iter_mut().flatten() {
            *sample *= gain;
        }
    }

    /// Writes the block into an interleaved buffer with `channels` channels. A mono block
    /// feeds every output channel; output channels past the block's are silent.
    pub fn write_interleaved(&self, out: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        for (frame, chunk) in out.chunks_mut(channels).enumerate().take(self.frames) {
            for (index, sample) in chunk.iter_mut().enumerate() {
                *sample = if self.channels.len() == 1 {
                    self.channels[0][frame]
                } else if index < self.channels.len() {
                    self.channels[index][frame]
                } else {
                    0.0
                };
            }
        }
    }
}
