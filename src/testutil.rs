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

//! Fixtures shared by unit tests.

mod audio;
mod polling;

use std::sync::Arc;

pub use audio::{constant_asset, sine, sine_asset, write_wav};
pub use polling::eventually;

use crate::{
    engine::{Context, ContextOptions},
    system::{Services, SoundSystem},
};

/// Sample rate used by offline fixtures. Low so tests can render seconds cheaply.
pub const TEST_SAMPLE_RATE: f32 = 1000.0;

/// A context with a destination that nothing renders unless the test asks.
pub fn offline_context() -> Arc<Context> {
    Context::new(ContextOptions {
        sample_rate: TEST_SAMPLE_RATE,
        channels: 2,
        with_destination: true,
    })
    .expect("offline context")
}

/// Services around an offline context, with the default bus created.
pub fn offline_services() -> Services {
    Services::new(offline_context())
}

/// A system with no output device. Tests drive rendering through its context.
pub fn offline_system() -> SoundSystem {
    SoundSystem::with_services(offline_services())
}

/// Renders the given number of seconds in one go.
pub fn render_seconds(context: &Context, seconds: f64) {
    let frames = (seconds * f64::from(context.sample_rate())).round() as usize;
    context.render(frames);
}
