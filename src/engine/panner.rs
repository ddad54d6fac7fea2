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
use std::{f32::consts::FRAC_PI_2, sync::Arc};

use parking_lot::Mutex;
use serde::Deserialize;

use super::{listener::ListenerState, AudioNode, Block, ProcessContext, Processor};
use crate::spatial::Vec3;

/// How gain falls off with distance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceModel {
    Linear,
    #[default]
    Inverse,
    Exponential,
}

/// Distance and cone settings for a panner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceSettings {
    pub model: DistanceModel,
    pub ref_distance: f32,
    pub max_distance: f32,
    pub rolloff: f32,
    /// Cone angles in degrees.
    pub cone_inner_angle: f32,
    pub cone_outer_angle: f32,
    pub cone_outer_gain: f32,
}

impl Default for DistanceSettings {
    fn default() -> DistanceSettings {
        DistanceSettings {
            model: DistanceModel::Inverse,
            ref_distance: 1.0,
            max_distance: 10000.0,
            rolloff: 1.0,
            cone_inner_angle: 360.0,
            cone_outer_angle: 360.0,
            cone_outer_gain: 0.0,
        }
    }
}

impl DistanceSettings {
    /// Gain from distance alone.
    pub fn distance_gain(&self, distance: f32) -> f32 {
        let reference = self.ref_distance.max(f32::EPSILON);
        match self.model {
            DistanceModel::Linear => {
                let max = self.max_distance.max(reference);
                if max <= reference {
                    return 1.0;
                }
                let clamped = distance.clamp(reference, max);
                let rolloff = self.rolloff.clamp(0.0, 1.0);
                1.0 - rolloff * (clamped - reference) / (max - reference)
            }
            DistanceModel::Inverse => {
                let distance = distance.max(reference);
                reference / (reference + self.rolloff.max(0.0) * (distance - reference))
            }
            DistanceModel::Exponential => {
                let distance = distance.max(reference);
                (distance / reference).powf(-self.rolloff.max(0.0))
            }
        }
    }

    /// Gain from the source's cone, given the angle in degrees between the source
    /// orientation and the direction to the listener.
    pub fn cone_gain(&self, angle: f32) -> f32 {
        if self.cone_inner_angle >= 360.0 && self.cone_outer_angle >= 360.0 {
            return 1.0;
        }
        let inner = self.cone_inner_angle * 0.5;
        let outer = self.cone_outer_angle * 0.5;
        let angle = angle.abs();
        if angle <= inner {
            1.0
        } else if angle >= outer {
            self.cone_outer_gain
        } else {
            let x = (angle - inner) / (outer - inner);
            1.0 + (self.cone_outer_gain - 1.0) * x
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct PannerState {
    settings: DistanceSettings,
    position: Vec3,
    orientation: Vec3,
}

/// Azimuth in degrees of `source` relative to the listener, folded into [-90, 90].
/// Positive is to the listener's right.
fn azimuth(listener: &ListenerState, source: Vec3) -> f32 {
    let relative = (source - listener.position).normalized();
    if relative == Vec3::ZERO {
        return 0.0;
    }
    let forward = listener.forward.normalized();
    let right = forward.cross(listener.up).normalized();
    let degrees = relative.dot(right).atan2(relative.dot(forward)).to_degrees();
    if degrees > 90.0 {
        180.0 - degrees
    } else if degrees < -90.0 {
        -180.0 - degrees
    } else {
        degrees
    }
}

struct PannerProcessor {
    state: Arc<Mutex<PannerState>>,
}

impl Processor for PannerProcessor {
    fn process(&mut self, input: &Block, ctx: &ProcessContext) -> Block {
        let state = *self.state.lock();
        let to_listener = ctx.listener.position - state.position;
        let distance = to_listener.length();

        let mut gain = state.settings.distance_gain(distance);
        if state.orientation != Vec3::ZERO && distance > 0.0 {
            let cosine = state
                .orientation
                .normalized()
                .dot(to_listener.normalized())
                .clamp(-1.0, 1.0);
            gain *= state.settings.cone_gain(cosine.acos().to_degrees());
        }

        // Equal power panning of the mono mix.
        let pan = (azimuth(&ctx.listener, state.position) + 90.0) / 180.0;
        let left = (pan * FRAC_PI_2).cos() * gain;
        let right = (pan * FRAC_PI_2).sin() * gain;
        let mono = input.mono();
        Block::from_channels(vec![
            mono.iter().map(|s| s * left).collect(),
            mono.iter().map(|s| s * right).collect(),
        ])
    }

    fn params(&self) -> Vec<(&'static str, f32)> {
        let settings = self.state.lock().settings;
        vec![
            ("refDistance", settings.ref_distance),
            ("maxDistance", settings.max_distance),
            ("rolloff", settings.rolloff),
        ]
    }
}

/// Positions a source relative to the context's listener. Always outputs stereo.
#[derive(Clone)]
pub struct PannerNode {
    node: AudioNode,
    state: Arc<Mutex<PannerState>>,
}

impl PannerNode {
    pub fn new(name: impl Into<String>) -> PannerNode {
        let state = Arc::new(Mutex::new(PannerState {
            settings: DistanceSettings::default(),
            position: Vec3::ZERO,
            orientation: Vec3::ZERO,
        }));
        let node = AudioNode::new(
            name,
            Box::new(PannerProcessor {
                state: state.clone(),
            }),
        );
        PannerNode { node, state }
    }

    pub fn node(&self) -> &AudioNode {
        &self.node
    }

    pub fn set_distance_settings(&self, settings: DistanceSettings) {
        self.state.lock().settings = settings;
    }

    pub fn distance_settings(&self) -> DistanceSettings {
        self.state.lock().settings
    }

    pub fn set_position(&self, position: Vec3) {
        self.state.lock().position = position;
    }

    pub fn position(&self) -> Vec3 {
        self.state.lock().position
    }

    /// Direction the source faces. Zero disables the cone.
    pub fn set_orientation(&self, orientation: Vec3) {
        self.state.lock().orientation = orientation;
    }
}
