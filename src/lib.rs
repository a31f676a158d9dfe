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

//! Relational archetype ECS.
//!
//! Entities are grouped by their exact component set into columnar
//! tables. Components may carry a relation target (another entity),
//! making entity-entity links first-class: queries match them exactly
//! or through a wildcard. Queries are cached live views; structural
//! mutation during iteration is deferred and replayed when the world
//! unlocks.
//!
//! ```
//! use strata_ecs::{Identity, World};
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! let mut world = World::new();
//! let player = world.spawn();
//! world.add(player, Position { x: 0.0, y: 0.0 }).unwrap();
//!
//! let apple = world.spawn();
//! struct Eats;
//! world.add_relation(player, Eats, apple).unwrap();
//! assert!(world.has_relation::<Eats>(player, Identity::ANY));
//!
//! world.query::<(Position,)>().build()
//!     .run(|position| position.x += 1.0)
//!     .unwrap();
//! assert_eq!(world.get::<Position>(player).unwrap().x, 1.0);
//! ```

pub mod component;
pub mod entity;
pub mod error;
pub mod expression;
pub mod mask;
pub mod query;
pub mod reference_store;
pub mod table;
pub mod world;

pub use component::{Component, TypeRegistry};
pub use entity::{EntityMeta, Identity, IdentityPool};
pub use error::{EcsError, Result};
pub use expression::TypeExpression;
pub use mask::{Mask, MaskPool};
pub use query::{ComponentTuple, Ops, Query, QueryBuilder};
pub use reference_store::ReferenceStore;
pub use table::{Column, Table, TableEdge};
pub use world::{DeferredOperation, World};
