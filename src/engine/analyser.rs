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
use std::{collections::VecDeque, f32::consts::PI, sync::Arc};

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{AudioNode, Block, EngineError, ProcessContext, Processor};

const DEFAULT_FFT_SIZE: usize = 2048;
const DB_FLOOR: f32 = -400.0;

struct AnalyserState {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    smoothing: f32,
    min_db: f32,
    max_db: f32,
}

impl AnalyserState {
    fn resize(&mut self, fft_size: usize) {
        self.fft_size = fft_size;
        self.fft = FftPlanner::new().plan_fft_forward(fft_size);
        self.smoothed = vec![0.0; fft_size / 2];
        while self.history.len() > fft_size {
            self.history.pop_front();
        }
    }
}

/// Blackman window coefficient for sample `n` of `size`.
fn blackman(n: usize, size: usize) -> f32 {
    let x = n as f32 / size as f32;
    0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
}

struct AnalyserProcessor {
    state: Arc<Mutex<AnalyserState>>,
}

impl Processor for AnalyserProcessor {
    fn process(&mut self, input: &Block, _: &ProcessContext) -> Block {
        let mut state = self.state.lock();
        let capacity = state.fft_size;
        for sample in input.mono() {
            if state.history.len() == capacity {
                state.history.pop_front();
            }
            state.history.push_back(sample);
        }
        input.clone()
    }

    fn params(&self) -> Vec<(&'static str, f32)> {
        let state = self.state.lock();
        vec![
            ("fftSize", state.fft_size as f32),
            ("smoothing", state.smoothing),
        ]
    }
}

/// Captures the most recent samples of its input and reports their spectrum. Passes
/// input through unchanged.
#[derive(Clone)]
pub struct AnalyserNode {
    node: AudioNode,
    state: Arc<Mutex<AnalyserState>>,
}

impl AnalyserNode {
    pub fn new(name: impl Into<String>) -> AnalyserNode {
        let state = Arc::new(Mutex::new(AnalyserState {
            fft_size: DEFAULT_FFT_SIZE,
            fft: FftPlanner::new().plan_fft_forward(DEFAULT_FFT_SIZE),
            history: VecDeque::with_capacity(DEFAULT_FFT_SIZE),
            smoothed: vec![0.0; DEFAULT_FFT_SIZE / 2],
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }));
        let node = AudioNode::new(
            name,
            Box::new(AnalyserProcessor {
                state: state.clone(),
            }),
        );
        AnalyserNode { node, state }
    }

    pub fn node(&self) -> &AudioNode {
        &self.node
    }

    /// Sets the transform size. Must be at least 2.
    pub fn set_fft_size(&self, fft_size: usize) -> Result<(), EngineError> {
        if fft_size < 2 {
            return Err(EngineError::InvalidFftSize(fft_size));
        }
        self.state.lock().resize(fft_size);
        Ok(())
    }

    pub fn fft_size(&self) -> usize {
        self.state.lock().fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size() / 2
    }

    pub fn set_min_decibels(&self, db: f32) {
        self.state.lock().min_db = db;
    }

    pub fn min_decibels(&self) -> f32 {
        self.state.lock().min_db
    }

    pub fn set_max_decibels(&self, db: f32) {
        self.state.lock().max_db = db;
    }

    pub fn max_decibels(&self) -> f32 {
        self.state.lock().max_db
    }

    /// Time smoothing between successive reads, clamped to [0, 1].
    pub fn set_smoothing(&self, smoothing: f32) {
        self.state.lock().smoothing = smoothing.clamp(0.0, 1.0);
    }

    pub fn smoothing(&self) -> f32 {
        self.state.lock().smoothing
    }

    /// Smoothed magnitude in decibels for each frequency bin.
    pub fn frequency_data_db(&self) -> Vec<f32> {
        let mut state = self.state.lock();
        let size = state.fft_size;
        let padding = size - state.history.len();

        let mut buffer: Vec<Complex<f32>> = std::iter::repeat(0.0)
            .take(padding)
            .chain(state.history.iter().copied())
            .enumerate()
            .map(|(n, sample)| Complex::new(sample * blackman(n, size), 0.0))
            .collect();
        state.fft.process(&mut buffer);

        let smoothing = state.smoothing;
        let scale = 1.0 / size as f32;
        let bins = size / 2;
        for (smoothed, value) in state.smoothed.iter_mut().zip(&buffer[..bins]) {
            *smoothed = smoothing * *smoothed + (1.0 - smoothing) * value.norm() * scale;
        }
        state
            .smoothed
            .iter()
            .map(|magnitude| {
                if *magnitude > 0.0 {
                    (20.0 * magnitude.log10()).max(DB_FLOOR)
                } else {
                    DB_FLOOR
                }
            })
            .collect()
    }
}
