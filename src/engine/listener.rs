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
use parking_lot::Mutex;

use crate::spatial::Vec3;

/// Where the listener is and which way it faces, in engine space (Y up, -Z forward).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ListenerState {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for ListenerState {
    fn default() -> ListenerState {
        ListenerState {
            position: Vec3::ZERO,
            forward: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::Y,
        }
    }
}

/// The context's single listener. Panner nodes read a snapshot of it every quantum.
#[derive(Default)]
pub struct Listener {
    state: Mutex<ListenerState>,
}

impl Listener {
    pub fn set_position(&self, position: Vec3) {
        self.state.lock().position = position;
    }

    pub fn set_orientation(&self, forward: Vec3, up: Vec3) {
        let mut state = self.state.lock();
        state.forward = forward;
        state.up = up;
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock()
    }
}
