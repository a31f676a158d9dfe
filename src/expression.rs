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

//! Type expressions: a component type paired with a relation target,
//! packed into a single 64-bit storage key.

use std::fmt;

use crate::component::{Component, TypeRegistry};
use crate::entity::Identity;

/// A component type plus an optional relation target.
///
/// Packed layout: bits 0..16 hold the type id, bits 16..32 the target
/// generation, bits 32..64 the target id. A `NONE` target marks a plain
/// component, a concrete entity target a relation; the `ANY` target is
/// only meaningful in masks and never keys storage.
///
/// Ordering and hashing use the packed value, so type sets sort
/// deterministically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeExpression {
    value: u64,
}

impl TypeExpression {
    pub fn new(type_id: u16, target: Identity) -> Self {
        let value = type_id as u64
            | ((target.generation() as u64) << 16)
            | ((target.id() as u32 as u64) << 32);
        TypeExpression { value }
    }

    /// The expression for component type `T` with the given target.
    pub fn of<T: Component>(target: Identity) -> Self {
        Self::new(TypeRegistry::global().id_of::<T>(), target)
    }

    pub const fn type_id(self) -> u16 {
        self.value as u16
    }

    pub const fn target(self) -> Identity {
        Identity::new((self.value >> 32) as u32 as i32, (self.value >> 16) as u16)
    }

    pub const fn value(self) -> u64 {
        self.value
    }

    /// True when the expression carries a target, wildcard included.
    pub fn is_relation(self) -> bool {
        !self.target().is_none()
    }

    /// Wildcard-aware comparison between a query-side expression and a
    /// storage-side one.
    ///
    /// Type ids must agree. A `NONE` target only matches `NONE`; an
    /// `ANY` target matches every non-`NONE` target; concrete targets
    /// match themselves (or the other side's `ANY`).
    pub fn matches(self, other: TypeExpression) -> bool {
        if self.type_id() != other.type_id() {
            return false;
        }
        let target = self.target();
        let other_target = other.target();
        if target.is_none() {
            return other_target.is_none();
        }
        if target.is_any() {
            return !other_target.is_none();
        }
        if target == other_target {
            return true;
        }
        other_target.is_any()
    }
}

impl fmt::Display for TypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = TypeRegistry::global().type_name(self.type_id());
        if self.is_relation() {
            write!(f, "{}({})", name, self.target())
        } else {
            write!(f, "{}", name)
        }
    }
}

impl fmt::Debug for TypeExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
