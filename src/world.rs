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

//! The world: entity registry, archetype graph, query cache and the
//! deferred structural-mutation protocol.

use ahash::AHashMap;
use crossbeam::queue::SegQueue;
use rustc_hash::{FxHashMap, FxHashSet};

#[cfg(feature = "profiling")]
use tracing::info_span;

use crate::component::{BoxedComponent, Component, TypeRegistry};
use crate::entity::{EntityMeta, Identity, IdentityPool};
use crate::error::{EcsError, Result};
use crate::expression::TypeExpression;
use crate::mask::{Mask, MaskPool};
use crate::table::{Table, TableTypes};

/// Whether structural mutation applies immediately or queues up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorldMode {
    Immediate,
    Deferred,
}

/// A structural request captured while the world is locked, replayed
/// FIFO when the outermost lock releases.
pub enum DeferredOperation {
    Add {
        identity: Identity,
        expression: TypeExpression,
        data: BoxedComponent,
    },
    Remove {
        identity: Identity,
        expression: TypeExpression,
    },
    Despawn {
        identity: Identity,
    },
}

pub(crate) struct QueryNode {
    pub mask: Mask,
    pub tables: Vec<usize>,
}

/// Archetype-based entity storage with relations and cached queries.
///
/// Entities are grouped by their exact component set into tables;
/// structural changes walk cached edges between tables. While the
/// world is locked, structural mutation is deferred into a concurrent
/// FIFO queue and replayed (with liveness re-validated) on unlock.
pub struct World {
    pool: IdentityPool,
    meta: Vec<EntityMeta>,
    tables: Vec<Table>,
    table_index: AHashMap<TableTypes, usize>,
    tables_by_type: AHashMap<TypeExpression, Vec<usize>>,
    types_by_relation_target: AHashMap<Identity, FxHashSet<TypeExpression>>,
    relations_by_type: FxHashMap<u16, FxHashSet<TypeExpression>>,
    queries: AHashMap<Mask, usize>,
    query_nodes: Vec<Option<QueryNode>>,
    mode: WorldMode,
    lock_count: u32,
    deferred: SegQueue<DeferredOperation>,
}

impl World {
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut world = World {
            pool: IdentityPool::new(),
            meta: Vec::with_capacity(capacity),
            tables: Vec::new(),
            table_index: AHashMap::new(),
            tables_by_type: AHashMap::new(),
            types_by_relation_target: AHashMap::new(),
            relations_by_type: FxHashMap::default(),
            queries: AHashMap::new(),
            query_nodes: Vec::new(),
            mode: WorldMode::Immediate,
            lock_count: 0,
            deferred: SegQueue::new(),
        };
        // Table 0: the empty-signature root holding component-less
        // entities.
        world.add_table(TableTypes::new());
        world
    }

    // ---- entity lifecycle -------------------------------------------------

    /// Creates a live entity in the root table.
    pub fn spawn(&mut self) -> Identity {
        #[cfg(feature = "profiling")]
        let _span = info_span!("spawn").entered();

        let identity = self.pool.spawn();
        let id = identity.id() as usize;
        if id >= self.meta.len() {
            self.meta.resize(id + 1, EntityMeta::default());
        }
        let row = self.tables[0].add_row(identity);
        self.meta[id] = EntityMeta { identity, table_id: 0, row };
        identity
    }

    /// Removes an entity and all its components. While locked, the
    /// removal is deferred; a deferred despawn of an identity that died
    /// in the meantime is a silent no-op.
    pub fn despawn(&mut self, identity: Identity) -> Result<()> {
        self.assert_alive(identity)?;
        if self.mode == WorldMode::Deferred {
            self.deferred.push(DeferredOperation::Despawn { identity });
            return Ok(());
        }
        self.despawn_now(identity)
    }

    fn despawn_now(&mut self, identity: Identity) -> Result<()> {
        let meta = self.meta[identity.id() as usize];
        let swapped = self.tables[meta.table_id].remove_row(meta.row);
        if let Some(swapped) = swapped {
            self.meta[swapped.id() as usize].row = meta.row;
        }
        self.meta[identity.id() as usize].clear();
        self.pool.despawn(identity);

        // Strip every relation pointing at the dead entity from its
        // origin entities.
        if let Some(expressions) = self.types_by_relation_target.remove(&identity) {
            for expression in expressions {
                let table_ids = self
                    .tables_by_type
                    .get(&expression)
                    .cloned()
                    .unwrap_or_default();
                for table_id in table_ids {
                    while let Some(&origin) = self.tables[table_id].identities().last() {
                        self.remove_expression_now(origin, expression)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn is_alive(&self, identity: Identity) -> bool {
        identity.is_entity()
            && (identity.id() as usize) < self.meta.len()
            && self.meta[identity.id() as usize].identity == identity
    }

    pub fn entity_count(&self) -> usize {
        self.pool.alive_count()
    }

    fn assert_alive(&self, identity: Identity) -> Result<EntityMeta> {
        if !self.is_alive(identity) {
            return Err(EcsError::EntityNotAlive(identity));
        }
        Ok(self.meta[identity.id() as usize])
    }

    // ---- components -------------------------------------------------------

    /// Attaches a plain component.
    pub fn add<T: Component>(&mut self, identity: Identity, data: T) -> Result<()> {
        self.add_with_target(identity, Identity::NONE, data)
    }

    /// Attaches a relation component keyed by `target`.
    pub fn add_relation<T: Component>(
        &mut self,
        identity: Identity,
        data: T,
        target: Identity,
    ) -> Result<()> {
        self.add_with_target(identity, target, data)
    }

    fn add_with_target<T: Component>(
        &mut self,
        identity: Identity,
        target: Identity,
        data: T,
    ) -> Result<()> {
        if target.is_any() {
            return Err(EcsError::WildcardTarget(std::any::type_name::<T>()));
        }
        // Negative-id targets are external reference-store keys, not
        // world entities; only entity targets get a liveness check.
        if target.is_entity() && target.id() > 0 {
            self.assert_alive(target)?;
        }
        let meta = self.assert_alive(identity)?;
        let expression = TypeExpression::of::<T>(target);
        // Presence is not checked while deferred: earlier queued ops may
        // change it before replay, which re-validates.
        if self.mode == WorldMode::Deferred {
            self.deferred.push(DeferredOperation::Add {
                identity,
                expression,
                data: Box::new(data),
            });
            return Ok(());
        }
        if self.tables[meta.table_id].contains(expression) {
            return Err(EcsError::ComponentAlreadyPresent(
                identity,
                std::any::type_name::<T>(),
            ));
        }
        let (table_id, row) = self.apply_add(identity, expression)?;
        match self.tables[table_id].column_mut(expression) {
            Some(column) => unsafe { column.write(row, data) },
            None => unreachable!("destination table lacks the column it was built for"),
        }
        Ok(())
    }

    /// Moves the entity along the add edge; the new column slot is left
    /// uninitialized for the caller to fill.
    fn apply_add(
        &mut self,
        identity: Identity,
        expression: TypeExpression,
    ) -> Result<(usize, usize)> {
        let meta = self.meta[identity.id() as usize];
        if self.tables[meta.table_id].contains(expression) {
            return Err(EcsError::ComponentAlreadyPresent(
                identity,
                TypeRegistry::global().type_name(expression.type_id()),
            ));
        }
        let destination = self.table_for_addition(meta.table_id, expression);
        let row = self.relocate_entity(identity, meta, destination);
        Ok((destination, row))
    }

    /// Detaches a plain component.
    pub fn remove<T: Component>(&mut self, identity: Identity) -> Result<()> {
        self.remove_with_target::<T>(identity, Identity::NONE)
    }

    /// Detaches the relation component keyed by `target`.
    pub fn remove_relation<T: Component>(
        &mut self,
        identity: Identity,
        target: Identity,
    ) -> Result<()> {
        self.remove_with_target::<T>(identity, target)
    }

    fn remove_with_target<T: Component>(
        &mut self,
        identity: Identity,
        target: Identity,
    ) -> Result<()> {
        if target.is_any() {
            return Err(EcsError::WildcardTarget(std::any::type_name::<T>()));
        }
        let meta = self.assert_alive(identity)?;
        let expression = TypeExpression::of::<T>(target);
        if self.mode == WorldMode::Deferred {
            self.deferred
                .push(DeferredOperation::Remove { identity, expression });
            return Ok(());
        }
        if !self.tables[meta.table_id].contains(expression) {
            return Err(EcsError::ComponentNotPresent(
                identity,
                std::any::type_name::<T>(),
            ));
        }
        self.remove_expression_now(identity, expression)
    }

    fn remove_expression_now(
        &mut self,
        identity: Identity,
        expression: TypeExpression,
    ) -> Result<()> {
        let meta = self.meta[identity.id() as usize];
        if !self.tables[meta.table_id].contains(expression) {
            return Err(EcsError::ComponentNotPresent(
                identity,
                TypeRegistry::global().type_name(expression.type_id()),
            ));
        }
        let destination = self.table_for_removal(meta.table_id, expression);
        self.relocate_entity(identity, meta, destination);
        Ok(())
    }

    /// Wildcard-aware component presence check.
    pub fn has<T: Component>(&self, identity: Identity) -> bool {
        self.has_expression(identity, TypeExpression::of::<T>(Identity::NONE))
    }

    /// Relation presence; `target` may be [`Identity::ANY`].
    pub fn has_relation<T: Component>(&self, identity: Identity, target: Identity) -> bool {
        self.has_expression(identity, TypeExpression::of::<T>(target))
    }

    pub fn has_expression(&self, identity: Identity, expression: TypeExpression) -> bool {
        match self.assert_alive(identity) {
            Ok(meta) => self.tables[meta.table_id]
                .types()
                .iter()
                .any(|stored| expression.matches(*stored)),
            Err(_) => false,
        }
    }

    pub fn get<T: Component>(&self, identity: Identity) -> Result<&T> {
        self.get_with_target::<T>(identity, Identity::NONE)
    }

    pub fn get_relation<T: Component>(&self, identity: Identity, target: Identity) -> Result<&T> {
        self.get_with_target::<T>(identity, target)
    }

    fn get_with_target<T: Component>(&self, identity: Identity, target: Identity) -> Result<&T> {
        if target.is_any() {
            return Err(EcsError::WildcardTarget(std::any::type_name::<T>()));
        }
        let meta = self.assert_alive(identity)?;
        let expression = TypeExpression::of::<T>(target);
        let column = self.tables[meta.table_id]
            .column(expression)
            .ok_or(EcsError::ComponentNotPresent(
                identity,
                std::any::type_name::<T>(),
            ))?;
        match column.get::<T>(meta.row) {
            Some(value) => Ok(value),
            None => unreachable!("entity row out of column bounds"),
        }
    }

    pub fn get_mut<T: Component>(&mut self, identity: Identity) -> Result<&mut T> {
        self.get_mut_with_target::<T>(identity, Identity::NONE)
    }

    pub fn get_relation_mut<T: Component>(
        &mut self,
        identity: Identity,
        target: Identity,
    ) -> Result<&mut T> {
        self.get_mut_with_target::<T>(identity, target)
    }

    fn get_mut_with_target<T: Component>(
        &mut self,
        identity: Identity,
        target: Identity,
    ) -> Result<&mut T> {
        if target.is_any() {
            return Err(EcsError::WildcardTarget(std::any::type_name::<T>()));
        }
        let meta = self.assert_alive(identity)?;
        let expression = TypeExpression::of::<T>(target);
        let column = self.tables[meta.table_id]
            .column_mut(expression)
            .ok_or(EcsError::ComponentNotPresent(
                identity,
                std::any::type_name::<T>(),
            ))?;
        match column.get_mut::<T>(meta.row) {
            Some(value) => Ok(value),
            None => unreachable!("entity row out of column bounds"),
        }
    }

    // ---- relations --------------------------------------------------------

    /// Targets of `T`-relations on one entity.
    pub fn targets_of<T: Component>(&self, identity: Identity) -> Result<Vec<Identity>> {
        let meta = self.assert_alive(identity)?;
        let type_id = TypeRegistry::global().id_of::<T>();
        Ok(self.tables[meta.table_id]
            .types()
            .iter()
            .filter(|e| e.type_id() == type_id && e.target().is_entity())
            .map(|e| e.target())
            .collect())
    }

    /// Every live target of `T`-relations world-wide. Storage keys
    /// whose tables are all empty are skipped, so despawned targets
    /// stop being reported.
    pub fn collect_targets<T: Component>(&self) -> Vec<Identity> {
        let wildcard = TypeExpression::of::<T>(Identity::ANY);
        let mut targets = Vec::new();
        for (expression, tables) in &self.tables_by_type {
            if wildcard.matches(*expression)
                && tables.iter().any(|&t| !self.tables[t].is_empty())
            {
                targets.push(expression.target());
            }
        }
        targets
    }

    /// Despawns every entity carrying plain component `T`.
    pub fn despawn_all_with<T: Component>(&mut self) -> Result<()> {
        let expression = TypeExpression::of::<T>(Identity::NONE);
        let table_ids = self
            .tables_by_type
            .get(&expression)
            .cloned()
            .unwrap_or_default();
        if self.mode == WorldMode::Deferred {
            for table_id in table_ids {
                for &identity in self.tables[table_id].identities() {
                    self.deferred.push(DeferredOperation::Despawn { identity });
                }
            }
            return Ok(());
        }
        for table_id in table_ids {
            while let Some(&identity) = self.tables[table_id].identities().last() {
                self.despawn_now(identity)?;
            }
        }
        Ok(())
    }

    /// The entity's stored type expressions, for diagnostics.
    pub fn components_of(&self, identity: Identity) -> Result<Vec<TypeExpression>> {
        let meta = self.assert_alive(identity)?;
        Ok(self.tables[meta.table_id].types().to_vec())
    }

    // ---- archetype graph --------------------------------------------------

    fn relocate_entity(
        &mut self,
        identity: Identity,
        meta: EntityMeta,
        destination: usize,
    ) -> usize {
        debug_assert_ne!(meta.table_id, destination);
        let (src, dst) = if meta.table_id < destination {
            let (left, right) = self.tables.split_at_mut(destination);
            (&mut left[meta.table_id], &mut right[0])
        } else {
            let (left, right) = self.tables.split_at_mut(meta.table_id);
            (&mut right[0], &mut left[destination])
        };
        let (row, swapped) = Table::relocate(src, meta.row, dst, identity);
        if let Some(swapped) = swapped {
            self.meta[swapped.id() as usize].row = meta.row;
        }
        self.meta[identity.id() as usize] = EntityMeta {
            identity,
            table_id: destination,
            row,
        };
        row
    }

    fn table_for_addition(&mut self, from: usize, expression: TypeExpression) -> usize {
        if let Some(to) = self.tables[from].edge(expression).add {
            return to;
        }
        let mut types: TableTypes = self.tables[from].types().iter().copied().collect();
        types.push(expression);
        types.sort_unstable();
        let to = self.table_for_types(types);
        self.tables[from].edge_mut(expression).add = Some(to);
        self.tables[to].edge_mut(expression).remove = Some(from);
        to
    }

    fn table_for_removal(&mut self, from: usize, expression: TypeExpression) -> usize {
        if let Some(to) = self.tables[from].edge(expression).remove {
            return to;
        }
        let types: TableTypes = self.tables[from]
            .types()
            .iter()
            .copied()
            .filter(|t| *t != expression)
            .collect();
        let to = self.table_for_types(types);
        self.tables[from].edge_mut(expression).remove = Some(to);
        self.tables[to].edge_mut(expression).add = Some(from);
        to
    }

    fn table_for_types(&mut self, types: TableTypes) -> usize {
        if let Some(&id) = self.table_index.get(&types) {
            return id;
        }
        self.add_table(types)
    }

    fn add_table(&mut self, types: TableTypes) -> usize {
        #[cfg(feature = "profiling")]
        let _span = info_span!("add_table", types = types.len()).entered();

        let id = self.tables.len();
        let table = Table::new(id, types.clone());
        for expression in table.types() {
            self.tables_by_type.entry(*expression).or_default().push(id);
            if expression.target().is_entity() {
                self.types_by_relation_target
                    .entry(expression.target())
                    .or_default()
                    .insert(*expression);
                self.relations_by_type
                    .entry(expression.type_id())
                    .or_default()
                    .insert(*expression);
            }
        }
        self.tables.push(table);
        self.table_index.insert(types, id);

        // Keep registered query views live.
        let matching: Vec<usize> = self
            .query_nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.as_ref().map(|n| (i, n)))
            .filter(|(_, node)| {
                Self::mask_matches(&node.mask, &self.tables[id], &self.relations_by_type)
            })
            .map(|(i, _)| i)
            .collect();
        for i in matching {
            if let Some(node) = &mut self.query_nodes[i] {
                node.tables.push(id);
            }
        }
        id
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    // ---- query cache ------------------------------------------------------

    fn mask_matches(
        mask: &Mask,
        table: &Table,
        relations_by_type: &FxHashMap<u16, FxHashSet<TypeExpression>>,
    ) -> bool {
        for has in &mask.has {
            if has.target().is_any() {
                let found = match relations_by_type.get(&has.type_id()) {
                    Some(relations) => table.types().iter().any(|t| relations.contains(t)),
                    None => false,
                };
                if !found {
                    return false;
                }
            } else if !table.contains(*has) {
                return false;
            }
        }
        if mask.not.iter().any(|n| table.contains(*n)) {
            return false;
        }
        if !mask.any.is_empty() && !mask.any.iter().any(|a| table.contains(*a)) {
            return false;
        }
        true
    }

    /// Returns the cached view for a mask, registering it on first use.
    /// Cache hits recycle the mask.
    pub(crate) fn get_query(&mut self, mut mask: Mask) -> usize {
        mask.canonicalize();
        if let Some(&index) = self.queries.get(&mask) {
            MaskPool::global().recycle(mask);
            return index;
        }

        #[cfg(feature = "profiling")]
        let _span = info_span!("register_query").entered();

        let candidates: Vec<usize> = match mask.first_concrete_has() {
            Some(seed) => self.tables_by_type.get(&seed).cloned().unwrap_or_default(),
            None => (0..self.tables.len()).collect(),
        };
        let tables: Vec<usize> = candidates
            .into_iter()
            .filter(|&t| Self::mask_matches(&mask, &self.tables[t], &self.relations_by_type))
            .collect();
        let index = self.query_nodes.len();
        self.query_nodes.push(Some(QueryNode {
            mask: mask.clone(),
            tables,
        }));
        self.queries.insert(mask, index);
        index
    }

    pub(crate) fn discard_query(&mut self, index: usize) {
        if let Some(node) = self.query_nodes[index].take() {
            self.queries.remove(&node.mask);
            MaskPool::global().recycle(node.mask);
        }
    }

    pub(crate) fn query_tables(&self, index: usize) -> &[usize] {
        match &self.query_nodes[index] {
            Some(node) => &node.tables,
            None => &[],
        }
    }

    #[cfg(test)]
    pub(crate) fn registered_query_count(&self) -> usize {
        self.queries.len()
    }

    pub(crate) fn entity_table(&self, identity: Identity) -> Option<usize> {
        self.assert_alive(identity).ok().map(|meta| meta.table_id)
    }

    pub(crate) fn table(&self, id: usize) -> &Table {
        &self.tables[id]
    }

    pub(crate) fn table_mut(&mut self, id: usize) -> &mut Table {
        &mut self.tables[id]
    }

    /// Split borrow for runners: mutable tables plus the shared
    /// deferred queue callbacks enqueue into.
    pub(crate) fn tables_and_queue(
        &mut self,
    ) -> (&mut Vec<Table>, &SegQueue<DeferredOperation>) {
        (&mut self.tables, &self.deferred)
    }

    // ---- deferral ---------------------------------------------------------

    /// Enters deferred mode; nestable.
    pub fn lock(&mut self) {
        self.lock_count += 1;
        self.mode = WorldMode::Deferred;
    }

    /// Leaves one level of deferred mode. Releasing the outermost lock
    /// replays the queue FIFO; the first replay failure is returned
    /// after the whole queue has drained.
    pub fn unlock(&mut self) -> Result<()> {
        if self.lock_count == 0 {
            return Err(EcsError::NotLocked);
        }
        self.lock_count -= 1;
        if self.lock_count > 0 {
            return Ok(());
        }
        self.mode = WorldMode::Immediate;
        self.replay_deferred()
    }

    pub fn is_locked(&self) -> bool {
        self.lock_count > 0
    }

    fn replay_deferred(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(operation) = self.deferred.pop() {
            if let Err(error) = self.apply_deferred(operation) {
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn apply_deferred(&mut self, operation: DeferredOperation) -> Result<()> {
        match operation {
            DeferredOperation::Add {
                identity,
                expression,
                data,
            } => {
                let target = expression.target();
                if target.is_any() {
                    return Err(EcsError::WildcardTarget(
                        TypeRegistry::global().type_name(expression.type_id()),
                    ));
                }
                // The target may have died since the op was queued.
                if target.is_entity() && target.id() > 0 && !self.is_alive(target) {
                    return Err(EcsError::EntityNotAlive(target));
                }
                self.assert_alive(identity)?;
                let (table_id, row) = self.apply_add(identity, expression)?;
                let info = TypeRegistry::global().info(expression.type_id());
                match self.tables[table_id].column_mut(expression) {
                    Some(column) => unsafe { (info.unbox_fn)(data, column.ptr_at(row)) },
                    None => unreachable!("destination table lacks the column it was built for"),
                }
                Ok(())
            }
            DeferredOperation::Remove { identity, expression } => {
                self.assert_alive(identity)?;
                self.remove_expression_now(identity, expression)
            }
            DeferredOperation::Despawn { identity } => {
                if self.is_alive(identity) {
                    self.despawn_now(identity)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Runs `f` with the world locked, unlocking even if `f` panics
    /// (the panic then resumes after the unlock).
    pub(crate) fn run_locked<F: FnOnce(&mut World)>(&mut self, f: F) -> Result<()> {
        self.lock();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&mut *self)));
        let unlocked = self.unlock();
        match outcome {
            Ok(()) => unlocked,
            Err(payload) => {
                let _ = unlocked;
                std::panic::resume_unwind(payload)
            }
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}
