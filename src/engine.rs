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

//! A small pull-based audio node engine.
//!
//! Nodes are reference counted and connected through a single graph owned by the
//! [`Context`]. Structural changes require the exclusive [`GraphLock`]; rendering and
//! playback cursor reads go through the [`RenderLock`]. Parameter changes are atomic and
//! need neither.

pub mod analyser;
pub mod biquad;
mod block;
mod context;
pub mod debug;
pub mod gain;
mod graph;
pub mod listener;
mod node;
pub mod panner;
pub mod param;
pub mod sampled;
pub mod waveshaper;


pub use block::Block;
pub use context::{Context, ContextOptions, RenderLock, QUANTUM_FRAMES};
pub use graph::GraphLock;
pub use node::{AudioNode, ProcessContext, Processor};

/// Errors raised by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid sample rate {0}")]
    InvalidSampleRate(f32),

    #[error("Invalid channel count {0}")]
    InvalidChannelCount(u16),

    #[error("Invalid FFT size {0}")]
    InvalidFftSize(usize),

    #[error("Wave shaper curve needs at least two points, got {0}")]
    InvalidCurve(usize),
}
