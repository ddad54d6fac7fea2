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
use std::sync::{atomic::Ordering, Arc};

use atomic_float::AtomicF32;

/// A node parameter shared between the control side and the render thread.
/// Setting it needs no graph lock.
#[derive(Clone, Debug)]
pub struct Param {
    value: Arc<AtomicF32>,
}

impl Param {
    pub fn new(value: f32) -> Param {
        Param {
            value: Arc::new(AtomicF32::new(value)),
        }
    }

    pub fn get(&self) -> f32 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: f32) {
        self.value.store(value, Ordering::Relaxed);
    }
}
