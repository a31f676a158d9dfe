// Copyright 2026 Strata ECS Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Entity identities, the generational id pool and per-entity metadata.

use std::collections::VecDeque;
use std::fmt;

/// A generational entity handle.
///
/// The id names a slot in the world's meta array; the generation
/// distinguishes successive occupants of that slot. Live entities have
/// `id >= 1` and `generation >= 1`; negative ids are reserved for
/// externally tracked object keys (see the reference store). Two
/// sentinels exist: [`Identity::NONE`] (the plain-component target)
/// and [`Identity::ANY`] (the query-side wildcard target).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    id: i32,
    generation: u16,
}

impl Identity {
    /// The "no target" sentinel marking plain components.
    pub const NONE: Identity = Identity { id: 0, generation: 0 };

    /// The wildcard target, valid only on the query side.
    pub const ANY: Identity = Identity { id: i32::MAX, generation: 0 };

    pub const fn new(id: i32, generation: u16) -> Self {
        Identity { id, generation }
    }

    pub const fn id(self) -> i32 {
        self.id
    }

    pub const fn generation(self) -> u16 {
        self.generation
    }

    /// Packed 64-bit form: id in the low half, generation above it.
    pub const fn value(self) -> u64 {
        (self.id as u32 as u64) | ((self.generation as u64) << 32)
    }

    pub const fn is_none(self) -> bool {
        self.id == 0 && self.generation == 0
    }

    pub const fn is_any(self) -> bool {
        self.id == i32::MAX && self.generation == 0
    }

    /// True for handles that can name a live entity (not a sentinel).
    pub const fn is_entity(self) -> bool {
        !self.is_none() && !self.is_any()
    }

    /// The identity that reuses this slot next: generation + 1,
    /// wrapping, never 0.
    pub fn successor(self) -> Identity {
        let generation = match self.generation.wrapping_add(1) {
            0 => 1,
            g => g,
        };
        Identity { id: self.id, generation }
    }
}

impl Default for Identity {
    fn default() -> Self {
        Identity::NONE
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else if self.is_any() {
            write!(f, "any")
        } else {
            write!(f, "E{}v{}", self.id, self.generation)
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Where a live entity is stored: which table, which row.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntityMeta {
    pub identity: Identity,
    pub table_id: usize,
    pub row: usize,
}

impl EntityMeta {
    pub fn clear(&mut self) {
        *self = EntityMeta::default();
    }
}

/// Mints and recycles identities.
///
/// Despawned identities re-enter circulation FIFO with their generation
/// already bumped, so a stale handle to the old occupant can never
/// match the new one.
#[derive(Debug, Default)]
pub struct IdentityPool {
    living: i32,
    recycled: VecDeque<Identity>,
}

impl IdentityPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self) -> Identity {
        if let Some(identity) = self.recycled.pop_front() {
            return identity;
        }
        self.living += 1;
        Identity::new(self.living, 1)
    }

    pub fn despawn(&mut self, identity: Identity) {
        self.recycled.push_back(identity.successor());
    }

    /// Highest id ever minted; an upper bound for meta array sizing.
    pub fn capacity(&self) -> usize {
        self.living as usize
    }

    pub fn alive_count(&self) -> usize {
        self.living as usize - self.recycled.len()
    }
}
