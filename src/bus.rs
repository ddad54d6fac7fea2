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
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use tracing::{error, info, warn};

use crate::{
    engine::{gain::GainNode, AudioNode, Context},
    ids::{BusId, PlayerId},
};

/// The bus players use when none is named.
pub const DEFAULT_BUS: &str = "Default";

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus {0} still has {1} player(s) routed to it")]
    InUse(BusId, usize),
}

/// A named mix point. Its gain stage is both the input players connect to and the
/// output feeding the destination.
pub struct Bus {
    id: BusId,
    name: String,
    gain: GainNode,
    routes: BTreeSet<PlayerId>,
}

impl Bus {
    fn new(name: &str) -> Bus {
        Bus {
            id: BusId::from_name(name),
            name: name.to_string(),
            gain: GainNode::new(format!("bus:{}", name)),
            routes: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> BusId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_node(&self) -> &AudioNode {
        self.gain.node()
    }

    pub fn gain(&self) -> f32 {
        self.gain.gain().get()
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.gain().set(gain);
    }

    /// Players currently routed into this bus.
    pub fn routes(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.routes.iter().copied()
    }
}

/// Registry of buses by id.
pub struct BusManager {
    context: Arc<Context>,
    buses: RwLock<BTreeMap<BusId, Bus>>,
}

impl BusManager {
    pub fn new(context: Arc<Context>) -> BusManager {
        BusManager {
            context,
            buses: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn exists(&self, id: BusId) -> bool {
        self.buses.read().contains_key(&id)
    }

    /// Creates the bus if needed and returns its id. Creating an existing name returns
    /// the existing bus.
    pub fn create(&self, name: &str) -> BusId {
        let id = BusId::from_name(name);
        let mut buses = self.buses.write();
        if buses.contains_key(&id) {
            return id;
        }

        let bus = Bus::new(name);
        match self.context.destination() {
            Some(destination) => {
                self.context
                    .graph_lock("create bus")
                    .connect(destination, bus.input_node());
            }
            None => warn!(bus = name, "No destination, bus will be muted."),
        }
        info!(bus = name, id = %id, "Created bus.");
        buses.insert(id, bus);
        id
    }

    /// Destroys the bus. Returns false for an unknown id. Refused while players are
    /// routed into it.
    pub fn delete(&self, id: BusId) -> Result<bool, BusError> {
        let mut buses = self.buses.write();
        let Some(bus) = buses.get(&id) else {
            return Ok(false);
        };
        if !bus.routes.is_empty() {
            error!(
                bus = bus.name(),
                players = bus.routes.len(),
                "Refusing to delete a bus with routed players."
            );
            return Err(BusError::InUse(id, bus.routes.len()));
        }

        if let Some(bus) = buses.remove(&id) {
            self.context
                .graph_lock("delete bus")
                .disconnect_node(bus.input_node());
            info!(bus = bus.name(), "Deleted bus.");
        }
        Ok(true)
    }

    /// Calls `callback` with the id and name of every bus, in id order.
    pub fn iterate(&self, mut callback: impl FnMut(BusId, &str)) {
        for (id, bus) in self.buses.read().iter() {
            callback(*id, bus.name());
        }
    }

    /// Borrows the bus. The registry stays read-locked while the guard lives.
    pub fn get(&self, id: BusId) -> Option<MappedRwLockReadGuard<'_, Bus>> {
        RwLockReadGuard::try_map(self.buses.read(), |buses| buses.get(&id)).ok()
    }

    pub fn len(&self) -> usize {
        self.buses.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buses.read().is_empty()
    }

    pub fn input_node(&self, id: BusId) -> Option<AudioNode> {
        self.buses.read().get(&id).map(|bus| bus.input_node().clone())
    }

    pub fn name(&self, id: BusId) -> Option<String> {
        self.buses.read().get(&id).map(|bus| bus.name().to_string())
    }

    pub fn gain(&self, id: BusId) -> Option<f32> {
        self.buses.read().get(&id).map(Bus::gain)
    }

    /// Returns false for an unknown bus.
    pub fn set_gain(&self, id: BusId, gain: f32) -> bool {
        match self.buses.read().get(&id) {
            Some(bus) => {
                bus.set_gain(gain);
                true
            }
            None => false,
        }
    }

    pub fn routes(&self, id: BusId) -> Vec<PlayerId> {
        self.buses
            .read()
            .get(&id)
            .map(|bus| bus.routes().collect())
            .unwrap_or_default()
    }

    /// Records that `player` now feeds `bus`.
    pub fn attach_route(&self, bus: BusId, player: PlayerId) {
        if let Some(bus) = self.buses.write().get_mut(&bus) {
            bus.routes.insert(player);
        }
    }

    pub fn detach_route(&self, bus: BusId, player: PlayerId) {
        if let Some(bus) = self.buses.write().get_mut(&bus) {
            bus.routes.remove(&player);
        }
    }

    /// Disconnects and drops every bus, routed or not.
    pub fn clear(&self) {
        let mut buses = self.buses.write();
        if buses.is_empty() {
            return;
        }
        let mut lock = self.context.graph_lock("clear buses");
        for bus in buses.values() {
            lock.disconnect_node(bus.input_node());
        }
        info!(count = buses.len(), "Cleared buses.");
        buses.clear();
    }
}

impl Drop for BusManager {
    fn drop(&mut self) {
        self.clear();
    }
}
