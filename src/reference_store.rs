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

//! A key-generating side table mapping shared objects to identities,
//! so hosts can use arbitrary objects as relation targets.

use std::sync::{Arc, Weak};

use ahash::AHashMap;

use crate::entity::{Identity, IdentityPool};
use crate::error::{EcsError, Result};

/// Hands out stable identities for shared objects.
///
/// Store keys carry negative ids, keeping them disjoint from world
/// entities, so they can serve as relation targets without a world
/// liveness check. The store keeps only weak handles;
/// [`ReferenceStore::collect`] sweeps identities whose object was
/// dropped elsewhere.
pub struct ReferenceStore<T> {
    pool: IdentityPool,
    by_identity: AHashMap<Identity, Weak<T>>,
    by_address: AHashMap<usize, Identity>,
}

impl<T> Default for ReferenceStore<T> {
    fn default() -> Self {
        ReferenceStore {
            pool: IdentityPool::new(),
            by_identity: AHashMap::new(),
            by_address: AHashMap::new(),
        }
    }
}

impl<T> ReferenceStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The identity tracking `object`, minting one on first sight.
    /// Spawning the same object twice returns the same identity.
    pub fn spawn(&mut self, object: &Arc<T>) -> Identity {
        let address = Arc::as_ptr(object) as usize;
        if let Some(&identity) = self.by_address.get(&address) {
            let live = self
                .by_identity
                .get(&identity)
                .map(|weak| weak.upgrade().is_some())
                .unwrap_or(false);
            if live {
                return identity;
            }
            // A dropped object's address was reused; retire its key.
            let _ = self.despawn(identity);
        }
        let identity = self.mint();
        self.by_identity.insert(identity, Arc::downgrade(object));
        self.by_address.insert(address, identity);
        identity
    }

    // Recycled keys are already negative; fresh ones get negated.
    fn mint(&mut self) -> Identity {
        let raw = self.pool.spawn();
        if raw.id() > 0 {
            Identity::new(-raw.id(), raw.generation())
        } else {
            raw
        }
    }

    /// The object behind a key, if both key and object are still live.
    pub fn get(&self, identity: Identity) -> Result<Arc<T>> {
        self.by_identity
            .get(&identity)
            .and_then(|weak| weak.upgrade())
            .ok_or(EcsError::EntityNotAlive(identity))
    }

    pub fn contains(&self, identity: Identity) -> bool {
        self.by_identity.contains_key(&identity)
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    /// Retires a key, recycling its identity.
    pub fn despawn(&mut self, identity: Identity) -> Result<()> {
        match self.by_identity.remove(&identity) {
            Some(weak) => {
                self.by_address.remove(&(weak.as_ptr() as usize));
                self.pool.despawn(identity);
                Ok(())
            }
            None => Err(EcsError::EntityNotAlive(identity)),
        }
    }

    /// Sweeps keys whose objects were dropped elsewhere.
    pub fn collect(&mut self) {
        let dead: Vec<Identity> = self
            .by_identity
            .iter()
            .filter(|(_, weak)| weak.upgrade().is_none())
            .map(|(&identity, _)| identity)
            .collect();
        for identity in dead {
            let _ = self.despawn(identity);
        }
    }

    pub fn identities(&self) -> Vec<Identity> {
        self.by_identity.keys().copied().collect()
    }
}
