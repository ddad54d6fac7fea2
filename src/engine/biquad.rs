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
use std::f32::consts::{FRAC_1_SQRT_2, PI};

use super::{param::Param, AudioNode, Block, ProcessContext, Processor};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterType {
    LowPass,
    HighPass,
}

/// Normalized biquad coefficients (a0 = 1).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Coefficients {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coefficients {
    /// RBJ cookbook coefficients.
    fn design(filter: FilterType, frequency: f32, q: f32, sample_rate: f32) -> Coefficients {
        let nyquist = sample_rate * 0.5;
        let frequency = frequency.clamp(1.0, nyquist * 0.999);
        let omega = 2.0 * PI * frequency / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / (2.0 * q.max(1e-4));

        let (b0, b1, b2) = match filter {
            FilterType::LowPass => {
                let b1 = 1.0 - cos_omega;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterType::HighPass => {
                let b1 = -(1.0 + cos_omega);
                (-b1 / 2.0, b1, -b1 / 2.0)
            }
        };
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        let a0_inv = 1.0 / a0;
        Coefficients {
            b0: b0 * a0_inv,
            b1: b1 * a0_inv,
            b2: b2 * a0_inv,
            a1: a1 * a0_inv,
            a2: a2 * a0_inv,
        }
    }
}

/// Direct form I history for one channel.
#[derive(Clone, Copy, Default)]
struct History {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

struct BiquadProcessor {
    filter: FilterType,
    frequency: Param,
    q: Param,
    designed_for: Option<(f32, f32, f32)>,
    coefficients: Coefficients,
    history: Vec<History>,
}

impl Processor for BiquadProcessor {
    fn process(&mut self, input: &Block, ctx: &ProcessContext) -> Block {
        let key = (self.frequency.get(), self.q.get(), ctx.sample_rate);
        if self.designed_for != Some(key) {
            self.coefficients = Coefficients::design(self.filter, key.0, key.1, key.2);
            self.designed_for = Some(key);
        }
        if self.history.len() != input.channel_count() {
            self.history = vec![History::default(); input.channel_count()];
        }

        let c = self.coefficients;
        let mut output = input.clone();
        for (channel, history) in output.channels_mut().zip(self.history.iter_mut()) {
            for sample in channel.iter_mut() {
                let x0 = *sample;
                let y0 = c.b0 * x0 + c.b1 * history.x1 + c.b2 * history.x2
                    - c.a1 * history.y1
                    - c.a2 * history.y2;
                history.x2 = history.x1;
                history.x1 = x0;
                history.y2 = history.y1;
                history.y1 = y0;
                *sample = y0;
            }
        }
        output
    }

    fn params(&self) -> Vec<(&'static str, f32)> {
        vec![("frequency", self.frequency.get()), ("q", self.q.get())]
    }
}

/// A second order low-pass or high-pass filter.
#[derive(Clone)]
pub struct BiquadNode {
    node: AudioNode,
    filter: FilterType,
    frequency: Param,
    q: Param,
}

impl BiquadNode {
    pub fn new(name: impl Into<String>, filter: FilterType, frequency: f32) -> BiquadNode {
        let frequency = Param::new(frequency);
        let q = Param::new(FRAC_1_SQRT_2);
        let node = AudioNode::new(
            name,
            Box::new(BiquadProcessor {
                filter,
                frequency: frequency.clone(),
                q: q.clone(),
                designed_for: None,
                coefficients: Coefficients::default(),
                history: Vec::new(),
            }),
        );
        BiquadNode {
            node,
            filter,
            frequency,
            q,
        }
    }

    pub fn node(&self) -> &AudioNode {
        &self.node
    }

    pub fn filter_type(&self) -> FilterType {
        self.filter
    }

    /// Cutoff frequency in Hz.
    pub fn frequency(&self) -> &Param {
        &self.frequency
    }

    pub fn q(&self) -> &Param {
        &self.q
    }
}
