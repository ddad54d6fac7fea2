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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

pub const PRIORITY_ENV: &str = "MIXGRAPH_THREAD_PRIORITY";
pub const DISABLE_RT_ENV: &str = "MIXGRAPH_DISABLE_RT_AUDIO";

/// Used when MIXGRAPH_THREAD_PRIORITY is unset or invalid.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Parses a priority in 0..100.
fn parse_priority(value: &str) -> Option<ThreadPriorityValue> {
    let n = value.trim().parse::<u8>().ok()?;
    if n >= 100 {
        return None;
    }
    ThreadPriorityValue::try_from(n).ok()
}

/// Reads MIXGRAPH_THREAD_PRIORITY once, before the callback is built.
pub fn callback_thread_priority() -> ThreadPriority {
    match std::env::var(PRIORITY_ENV)
        .ok()
        .and_then(|v| parse_priority(&v))
    {
        Some(priority) => ThreadPriority::Crossplatform(priority),
        None => ThreadPriorityValue::try_from(DEFAULT_CALLBACK_THREAD_PRIORITY)
            .map(ThreadPriority::Crossplatform)
            .unwrap_or(ThreadPriority::Max),
    }
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// RT scheduling is on unless MIXGRAPH_DISABLE_RT_AUDIO is set.
pub fn rt_audio_enabled() -> bool {
    !env_flag(DISABLE_RT_ENV)
}

/// Raises the calling thread's priority the first time it is called from that thread.
pub fn configure_audio_thread_priority(
    priority: ThreadPriority,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    if let Err(e) = set_current_thread_priority(priority) {
        warn!(err = ?e, "Failed to raise audio thread priority");
    }

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            priority,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for audio thread"),
            Err(e) => warn!(err = %e, "Failed to set RT SCHED_FIFO for audio thread"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    *priority_set = true;
}
