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
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use tracing::{info, span, Level};

use crate::engine::Context;
use crate::playsync::CancelHandle;

/// Frames rendered per mock callback.
const MOCK_BLOCK_FRAMES: usize = 480;

/// A mock output. Renders the context on a thread at roughly real time and throws the
/// audio away.
pub struct Output {
    name: String,
    cancel_handle: CancelHandle,
    running: Arc<AtomicBool>,
    frames_rendered: Arc<AtomicU64>,
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Output {
    pub fn start(name: &str, context: Arc<Context>) -> Output {
        let span = span!(Level::INFO, "output (mock)");
        let _enter = span.enter();

        let cancel_handle = CancelHandle::new();
        let running = Arc::new(AtomicBool::new(true));
        let frames_rendered = Arc::new(AtomicU64::new(0));

        let block_duration =
            Duration::from_secs_f64(MOCK_BLOCK_FRAMES as f64 / f64::from(context.sample_rate()));
        let output_thread = {
            let cancel_handle = cancel_handle.clone();
            let running = running.clone();
            let frames_rendered = frames_rendered.clone();
            thread::spawn(move || {
                let channels = usize::from(context.channels());
                let mut buffer = vec![0.0f32; MOCK_BLOCK_FRAMES * channels];
                loop {
                    context.render_interleaved(&mut buffer, channels);
                    frames_rendered.fetch_add(MOCK_BLOCK_FRAMES as u64, Ordering::Relaxed);
                    if cancel_handle.wait_timeout(block_duration) {
                        break;
                    }
                }
                running.store(false, Ordering::Release);
            })
        };

        info!(device = name, "Mock output started.");
        Output {
            name: name.to_string(),
            cancel_handle,
            running,
            frames_rendered,
            output_thread: Some(output_thread),
        }
    }

    /// Frames rendered since the output started.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered.load(Ordering::Relaxed)
    }
}

impl super::Output for Output {
    fn stop(&mut self) {
        self.cancel_handle.cancel();
        if let Some(thread) = self.output_thread.take() {
            let _ = thread.join();
            info!(device = self.name, "Mock output stopped.");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        super::Output::stop(self);
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::Output as _;
    use crate::testutil::{eventually, offline_context};

    #[test]
    fn test_mock_renders_until_stopped() {
        let context = offline_context();
        let mut output = Output::start("mock", context.clone());

        eventually(
            || output.frames_rendered() >= 2 * MOCK_BLOCK_FRAMES as u64,
            "Mock output did not keep rendering",
        );
        assert!(output.is_running());

        output.stop();
        assert!(!output.is_running());
        let rendered = output.frames_rendered();
        assert_eq!(context.current_frame(), rendered);
    }
}
