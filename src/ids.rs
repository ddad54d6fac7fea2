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
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a hash. Stable across runs and platforms.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
        pub struct $name(u64);

        impl $name {
            /// The reserved sentinel. Never handed out for a live object.
            pub const INVALID: $name = $name(u64::MAX);

            pub const fn new(raw: u64) -> $name {
                $name(raw)
            }

            /// A fresh random id that is never the invalid sentinel.
            pub fn random() -> $name {
                loop {
                    let raw = rand::random::<u64>();
                    if raw != u64::MAX {
                        return $name(raw);
                    }
                }
            }

            pub const fn raw(self) -> u64 {
                self.0
            }

            pub const fn is_valid(self) -> bool {
                self.0 != u64::MAX
            }
        }

        impl Default for $name {
            fn default() -> $name {
                $name::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}[{:016X}]", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// Identifies a sound player owned by the system.
    PlayerId
);
define_id!(
    /// Identifies an effect attached to a player.
    EffectId
);
define_id!(
    /// Identifies a bus. Derived from the bus name.
    BusId
);
define_id!(
    /// Identifies a sound asset in the asset library.
    AssetId
);
define_id!(
    /// Identifies an engine node.
    NodeId
);

impl BusId {
    /// The id for the given bus name.
    pub fn from_name(name: &str) -> BusId {
        let hash = fnv1a(name.as_bytes());
        // Keep the sentinel reserved even for an unlucky name.
        BusId(if hash == u64::MAX { hash - 1 } else { hash })
    }
}

impl AssetId {
    /// The id for an asset identified by a path or key.
    pub fn from_key(key: &str) -> AssetId {
        let hash = fnv1a(key.as_bytes());
        AssetId(if hash == u64::MAX { hash - 1 } else { hash })
    }
}

static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    /// Sequential ids for engine nodes.
    pub fn next() -> NodeId {
        NodeId(NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}
