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

//! Error types

use std::fmt;

use crate::entity::Identity;

/// Errors reported by world and query operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The identity does not refer to a live entity (wrong generation,
    /// recycled slot, or one of the sentinels).
    EntityNotAlive(Identity),
    /// The entity already stores this exact type expression.
    ComponentAlreadyPresent(Identity, &'static str),
    /// The entity does not store this exact type expression.
    ComponentNotPresent(Identity, &'static str),
    /// The ANY wildcard was used where a storage target is required.
    WildcardTarget(&'static str),
    /// `unlock` was called on a world that is not locked.
    NotLocked,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::EntityNotAlive(identity) => {
                write!(f, "entity {} is not alive", identity)
            }
            EcsError::ComponentAlreadyPresent(identity, name) => {
                write!(f, "entity {} already has component {}", identity, name)
            }
            EcsError::ComponentNotPresent(identity, name) => {
                write!(f, "entity {} does not have component {}", identity, name)
            }
            EcsError::WildcardTarget(name) => {
                write!(
                    f,
                    "the ANY wildcard cannot be a storage target for {}",
                    name
                )
            }
            EcsError::NotLocked => write!(f, "world is not locked"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, EcsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_entity() {
        let e = EcsError::EntityNotAlive(Identity::new(7, 2));
        assert!(e.to_string().contains("7"));
    }

    #[test]
    fn errors_are_comparable() {
        assert_eq!(EcsError::NotLocked, EcsError::NotLocked);
        assert_ne!(
            EcsError::NotLocked,
            EcsError::EntityNotAlive(Identity::NONE)
        );
    }
}
