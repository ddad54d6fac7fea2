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

/// A play request made before the player's asset was ready.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeferredPlay {
    /// Context time the playback should appear to have started at.
    pub requested_at: f64,
    /// Negative loops forever.
    pub loop_count: i32,
}

/// A deferred request resolved against the clock at readiness.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CatchUp {
    pub offset: f64,
    pub loop_count: i32,
}

/// How queued requests are honoured once the asset is ready.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Every request plays, each caught up to when it was asked for.
    ReplayAll,
    /// Existing playback is cleared and only the newest request plays.
    LatestOnly,
}

impl DrainPolicy {
    pub fn for_play_multiple(play_multiple: bool) -> DrainPolicy {
        if play_multiple {
            DrainPolicy::ReplayAll
        } else {
            DrainPolicy::LatestOnly
        }
    }
}

#[derive(Debug, Default)]
pub struct DeferredQueue {
    entries: Vec<DeferredPlay>,
}

impl DeferredQueue {
    pub fn push(&mut self, requested_at: f64, loop_count: i32) {
        self.entries.push(DeferredPlay {
            requested_at,
            loop_count,
        });
    }

    pub fn entries(&self) -> &[DeferredPlay] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Empties the queue and returns what should be scheduled at `now`. Requests whose
    /// time has not come yet start from the beginning.
    pub fn drain(&mut self, policy: DrainPolicy, now: f64) -> Vec<CatchUp> {
        let catch_up = |entry: DeferredPlay| CatchUp {
            offset: (now - entry.requested_at).max(0.0),
            loop_count: entry.loop_count,
        };
        let entries = std::mem::take(&mut self.entries);
        match policy {
            DrainPolicy::ReplayAll => entries.into_iter().map(catch_up).collect(),
            DrainPolicy::LatestOnly => entries.last().copied().map(catch_up).into_iter().collect(),
        }
    }
}
