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

//! Sound assets and the library that loads them.
//!
//! Players ask the library for an asset by id. A ready asset comes back immediately;
//! otherwise the player subscribes and the system delivers the ready notification on the
//! control timeline once the loader thread finishes.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level};

use crate::{
    engine::sampled::AudioBuffer,
    ids::{AssetId, PlayerId},
};

mod decode;

pub use decode::decode_file;

/// Errors raised by the asset library.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("Asset {0} is not known")]
    Unknown(AssetId),

    #[error("Asset {0} is still referenced by {1} holder(s)")]
    InUse(AssetId, usize),

    #[error("Decoding failed for {0}")]
    Decode(String),

    #[error("Audio file error: {0}")]
    Audio(#[from] symphonia::core::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A decoded sound with its format. Shared read-only once ready.
#[derive(Debug)]
pub struct SoundAsset {
    id: AssetId,
    buffer: Arc<AudioBuffer>,
}

impl SoundAsset {
    pub fn new(id: AssetId, buffer: AudioBuffer) -> SoundAsset {
        SoundAsset {
            id,
            buffer: Arc::new(buffer),
        }
    }

    pub fn id(&self) -> AssetId {
        self.id
    }

    pub fn channels(&self) -> usize {
        self.buffer.channel_count()
    }

    pub fn sample_rate(&self) -> f32 {
        self.buffer.sample_rate()
    }

    pub fn frames(&self) -> usize {
        self.buffer.frames()
    }

    pub fn length_seconds(&self) -> f64 {
        self.buffer.length_seconds()
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }
}

/// The answer to an asset request.
#[derive(Clone, Debug)]
pub enum AssetRequest {
    Ready(Arc<SoundAsset>),
    Loading,
    Unknown,
}

/// Loader notifications, drained on the control timeline.
#[derive(Clone, Debug)]
pub enum AssetEvent {
    Ready(AssetId),
    Failed(AssetId, String),
}

enum Entry {
    Loading,
    Ready(Arc<SoundAsset>),
    Failed(String),
}

/// Owns every known asset and who is waiting on it.
pub struct AssetLibrary {
    entries: Mutex<HashMap<AssetId, Entry>>,
    subscribers: Mutex<HashMap<AssetId, BTreeSet<PlayerId>>>,
    events_tx: Sender<AssetEvent>,
    events_rx: Receiver<AssetEvent>,
}

impl Default for AssetLibrary {
    fn default() -> AssetLibrary {
        AssetLibrary::new()
    }
}

impl AssetLibrary {
    pub fn new() -> AssetLibrary {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        AssetLibrary {
            entries: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            events_tx,
            events_rx,
        }
    }

    /// Stores an already decoded asset. It is ready immediately.
    pub fn insert(&self, asset: SoundAsset) -> Arc<SoundAsset> {
        let asset = Arc::new(asset);
        info!(
            asset = %asset.id(),
            channels = asset.channels(),
            sample_rate = asset.sample_rate(),
            frames = asset.frames(),
            "Asset ready."
        );
        self.entries
            .lock()
            .insert(asset.id(), Entry::Ready(asset.clone()));
        asset
    }

    /// Declares an asset whose data arrives later through [`AssetLibrary::complete`].
    pub fn register_pending(&self, id: AssetId) {
        self.entries.lock().entry(id).or_insert(Entry::Loading);
    }

    /// Finishes a pending load and queues its ready notification.
    pub fn complete(&self, asset: SoundAsset) -> Arc<SoundAsset> {
        let id = asset.id();
        let asset = self.insert(asset);
        if let Err(e) = self.events_tx.send(AssetEvent::Ready(id)) {
            error!(err = %e, asset = %id, "Unable to queue asset ready event.");
        }
        asset
    }

    /// Marks a pending load as failed and queues the failure.
    pub fn fail(&self, id: AssetId, reason: String) {
        warn!(asset = %id, reason = reason.as_str(), "Asset failed to load.");
        self.entries.lock().insert(id, Entry::Failed(reason.clone()));
        if let Err(e) = self.events_tx.send(AssetEvent::Failed(id, reason)) {
            error!(err = %e, asset = %id, "Unable to queue asset failure event.");
        }
    }

    /// Decodes a file on a loader thread. The id is derived from the path, so loading
    /// the same path twice yields the same asset.
    pub fn load_file(self: &Arc<Self>, path: impl AsRef<Path>) -> AssetId {
        let path: PathBuf = path.as_ref().to_path_buf();
        let id = AssetId::from_key(&path.to_string_lossy());
        {
            let mut entries = self.entries.lock();
            match entries.get(&id) {
                Some(Entry::Loading) | Some(Entry::Ready(_)) => return id,
                Some(Entry::Failed(_)) => info!(asset = %id, "Retrying failed asset load."),
                None => {}
            }
            entries.insert(id, Entry::Loading);
        }

        let library = Arc::clone(self);
        thread::spawn(move || {
            let span = span!(Level::INFO, "asset loader");
            let _enter = span.enter();
            match decode_file(&path) {
                Ok(buffer) => {
                    library.complete(SoundAsset::new(id, buffer));
                }
                Err(e) => library.fail(id, e.to_string()),
            }
        });
        id
    }

    pub fn request(&self, id: AssetId) -> AssetRequest {
        match self.entries.lock().get(&id) {
            Some(Entry::Ready(asset)) => AssetRequest::Ready(asset.clone()),
            Some(Entry::Loading) => AssetRequest::Loading,
            Some(Entry::Failed(_)) | None => AssetRequest::Unknown,
        }
    }

    /// Ready asset, if any.
    pub fn get(&self, id: AssetId) -> Option<Arc<SoundAsset>> {
        match self.request(id) {
            AssetRequest::Ready(asset) => Some(asset),
            _ => None,
        }
    }

    /// Asks for a ready notification for `player`. Subscribing twice is the same as once.
    pub fn subscribe(&self, asset: AssetId, player: PlayerId) {
        self.subscribers
            .lock()
            .entry(asset)
            .or_default()
            .insert(player);
    }

    pub fn unsubscribe(&self, asset: AssetId, player: PlayerId) {
        let mut subscribers = self.subscribers.lock();
        if let Some(players) = subscribers.get_mut(&asset) {
            players.remove(&player);
            if players.is_empty() {
                subscribers.remove(&asset);
            }
        }
    }

    pub fn subscribers(&self, asset: AssetId) -> Vec<PlayerId> {
        self.subscribers
            .lock()
            .get(&asset)
            .map(|players| players.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Takes every queued loader notification.
    pub fn drain_events(&self) -> Vec<AssetEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Forgets an asset. Refused while anything besides the library still holds it.
    pub fn release(&self, id: AssetId) -> Result<(), AssetError> {
        let mut entries = self.entries.lock();
        match entries.get(&id) {
            None => return Err(AssetError::Unknown(id)),
            Some(Entry::Ready(asset)) => {
                let holders = Arc::strong_count(asset) - 1;
                if holders > 0 {
                    error!(asset = %id, holders, "Refusing to release an asset in use.");
                    return Err(AssetError::InUse(id, holders));
                }
            }
            Some(Entry::Loading) => {
                let waiting = self.subscribers.lock().get(&id).map_or(0, BTreeSet::len);
                if waiting > 0 {
                    error!(asset = %id, waiting, "Refusing to release an asset players wait on.");
                    return Err(AssetError::InUse(id, waiting));
                }
            }
            Some(Entry::Failed(_)) => {}
        }
        entries.remove(&id);
        self.subscribers.lock().remove(&id);
        info!(asset = %id, "Released asset.");
        Ok(())
    }
}
