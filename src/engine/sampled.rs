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
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AudioNode, Block, Context, ProcessContext, Processor, RenderLock};

/// Decoded planar audio shared read-only between assets and playback nodes.
#[derive(Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: f32,
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    /// Builds a buffer from planar channels. Short channels are zero padded.
    pub fn new(sample_rate: f32, mut channels: Vec<Vec<f32>>) -> AudioBuffer {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.resize(frames, 0.0);
        }
        AudioBuffer {
            sample_rate,
            channels,
            frames,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
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

    pub fn length_seconds(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.frames as f64 / f64::from(self.sample_rate)
    }
}

/// Where a playback node is in its schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing has been scheduled, or playback was cleared.
    Unscheduled,
    /// At least one voice is waiting for its start time.
    Scheduled,
    /// At least one voice is producing sound.
    Playing,
    /// Every scheduled voice ran to its end.
    Finished,
}

struct Voice {
    start_frame: u64,
    /// Read position in buffer frames.
    position: f64,
    /// Remaining repeats. Negative loops forever.
    loops_remaining: i32,
    started: bool,
    done: bool,
}

#[derive(Default)]
struct SamplerState {
    buffer: Option<Arc<AudioBuffer>>,
    voices: Vec<Voice>,
    cursor: i64,
    finished: bool,
}

struct SampledProcessor {
    state: Arc<Mutex<SamplerState>>,
}

impl Processor for SampledProcessor {
    fn process(&mut self, _: &Block, ctx: &ProcessContext) -> Block {
        let mut state = self.state.lock();
        let Some(buffer) = state.buffer.clone() else {
            return Block::silent(1, ctx.frames);
        };
        let mut out = Block::silent(buffer.channel_count(), ctx.frames);
        if state.voices.is_empty() {
            return out;
        }

        let step = f64::from(buffer.sample_rate()) / f64::from(ctx.sample_rate);
        let length = buffer.frames() as f64;
        for voice in state.voices.iter_mut() {
            for frame in 0..ctx.frames {
                if voice.done {
                    break;
                }
                if ctx.frame + (frame as u64) < voice.start_frame {
                    continue;
                }
                if length == 0.0 {
                    voice.done = true;
                    break;
                }
                voice.started = true;
                let index = voice.position as usize;
                for channel in 0..buffer.channel_count() {
                    out.channel_mut(channel)[frame] += buffer.channel(channel)[index];
                }
                voice.position += step;
                if voice.position >= length {
                    if voice.loops_remaining == 0 {
                        voice.done = true;
                    } else {
                        if voice.loops_remaining > 0 {
                            voice.loops_remaining -= 1;
                        }
                        voice.position = 0.0;
                    }
                }
            }
        }

        let had_voices = !state.voices.is_empty();
        state.voices.retain(|voice| !voice.done);
        if state.voices.is_empty() {
            state.finished = had_voices;
            state.cursor = -1;
        } else {
            let cursor = state
                .voices
                .iter()
                .rev()
                .find(|voice| voice.started)
                .map(|voice| voice.position as i64)
                .unwrap_or(0);
            state.cursor = cursor;
        }
        out
    }
}

/// Plays a bound buffer according to a schedule. Several voices may overlap.
#[derive(Clone)]
pub struct SampledNode {
    node: AudioNode,
    state: Arc<Mutex<SamplerState>>,
}

impl SampledNode {
    pub fn new(name: impl Into<String>) -> SampledNode {
        let state = Arc::new(Mutex::new(SamplerState {
            cursor: -1,
            ..SamplerState::default()
        }));
        let node = AudioNode::new(
            name,
            Box::new(SampledProcessor {
                state: state.clone(),
            }),
        );
        SampledNode { node, state }
    }

    pub fn node(&self) -> &AudioNode {
        &self.node
    }

    /// Binds a buffer. Existing voices are dropped.
    pub fn set_buffer(&self, buffer: Option<Arc<AudioBuffer>>) {
        let mut state = self.state.lock();
        state.buffer = buffer;
        state.voices.clear();
        state.cursor = -1;
        state.finished = false;
    }

    pub fn buffer(&self) -> Option<Arc<AudioBuffer>> {
        self.state.lock().buffer.clone()
    }

    /// Starts a voice `when` seconds from now.
    pub fn schedule(&self, context: &Context, when: f64) {
        self.schedule_with(context, when, 0.0, 0);
    }

    /// Starts a voice `when` seconds from now, `offset` seconds into the buffer, repeating
    /// `loop_count` extra times. A negative count loops until cleared.
    pub fn schedule_with(&self, context: &Context, when: f64, offset: f64, loop_count: i32) {
        let delay = (when.max(0.0) * f64::from(context.sample_rate())).round() as u64;
        let start_frame = context.current_frame() + delay;

        let mut state = self.state.lock();
        let (sample_rate, length) = match &state.buffer {
            Some(buffer) => (f64::from(buffer.sample_rate()), buffer.frames() as f64),
            None => (f64::from(context.sample_rate()), 0.0),
        };

        let mut position = offset.max(0.0) * sample_rate;
        let mut loops_remaining = loop_count;
        let mut done = false;
        if length > 0.0 && position >= length {
            let wraps = (position / length).floor();
            if loop_count < 0 {
                position %= length;
            } else if wraps <= f64::from(loop_count) {
                loops_remaining -= wraps as i32;
                position %= length;
            } else {
                done = true;
            }
        }
        if done {
            return;
        }

        state.finished = false;
        state.voices.push(Voice {
            start_frame,
            position,
            loops_remaining,
            started: false,
            done: false,
        });
    }

    /// Drops every scheduled and active voice.
    pub fn clear_playback(&self) {
        let mut state = self.state.lock();
        state.voices.clear();
        state.cursor = -1;
        state.finished = false;
    }

    pub fn playback_state(&self) -> PlaybackState {
        let state = self.state.lock();
        if state.voices.is_empty() {
            if state.finished {
                PlaybackState::Finished
            } else {
                PlaybackState::Unscheduled
            }
        } else if state.voices.iter().any(|voice| voice.started) {
            PlaybackState::Playing
        } else {
            PlaybackState::Scheduled
        }
    }

    /// Read position of the newest active voice in buffer frames, or -1 without one.
    pub fn cursor(&self, _render: &RenderLock) -> i64 {
        self.state.lock().cursor
    }

    /// Number of voices not yet finished.
    pub fn voice_count(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Start offsets and loop counts of pending voices, in buffer seconds.
    pub fn scheduled_voices(&self) -> Vec<ScheduledVoice> {
        let state = self.state.lock();
        let sample_rate = state
            .buffer
            .as_ref()
            .map(|buffer| f64::from(buffer.sample_rate()))
            .unwrap_or(1.0);
        state
            .voices
            .iter()
            .map(|voice| ScheduledVoice {
                start_frame: voice.start_frame,
                offset: voice.position / sample_rate,
                loops_remaining: voice.loops_remaining,
            })
            .collect()
    }
}

/// A snapshot of one voice, for inspection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledVoice {
    pub start_frame: u64,
    pub offset: f64,
    pub loops_remaining: i32,
}
