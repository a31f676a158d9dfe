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

//! Query building and execution.
//!
//! A query is a cached live view over the tables its mask matches.
//! Runners stream the plain (untargeted) columns of the tuple types;
//! relation constraints join in through the builder's has/not/any.
//! Every runner brackets its scan with the world's lock/unlock, so a
//! callback can request structural changes through [`Ops`] and a
//! worker panic can never leave the world locked.

use std::marker::PhantomData;

use crossbeam::queue::SegQueue;

#[cfg(all(feature = "profiling", feature = "parallel"))]
use tracing::info_span;

use crate::component::{Component, TypeRegistry};
use crate::entity::Identity;
use crate::error::Result;
use crate::expression::TypeExpression;
use crate::mask::MaskPool;
use crate::world::{DeferredOperation, World};

/// Tuple of component types a query streams.
pub trait ComponentTuple: 'static {
    fn seed(mask: &mut crate::mask::Mask);
    fn assert_distinct();
}

/// Deferral handle passed to `run_with` callbacks. Requests are queued
/// on the world's deferred queue and validated at replay time.
#[derive(Clone, Copy)]
pub struct Ops<'a> {
    queue: &'a SegQueue<DeferredOperation>,
}

impl<'a> Ops<'a> {
    fn new(queue: &'a SegQueue<DeferredOperation>) -> Self {
        Ops { queue }
    }

    pub fn add<T: Component>(&self, identity: Identity, data: T) {
        self.add_relation(identity, data, Identity::NONE);
    }

    pub fn add_relation<T: Component>(&self, identity: Identity, data: T, target: Identity) {
        self.queue.push(DeferredOperation::Add {
            identity,
            expression: TypeExpression::of::<T>(target),
            data: Box::new(data),
        });
    }

    pub fn remove<T: Component>(&self, identity: Identity) {
        self.remove_relation::<T>(identity, Identity::NONE);
    }

    pub fn remove_relation<T: Component>(&self, identity: Identity, target: Identity) {
        self.queue.push(DeferredOperation::Remove {
            identity,
            expression: TypeExpression::of::<T>(target),
        });
    }

    pub fn despawn(&self, identity: Identity) {
        self.queue.push(DeferredOperation::Despawn { identity });
    }
}

/// Raw pointer wrapper so disjoint column chunks can cross thread
/// boundaries.
#[cfg(feature = "parallel")]
struct SendPtr<T>(*mut T);

// Not derived: the wrapper is Copy for every T, not just T: Copy.
#[cfg(feature = "parallel")]
impl<T> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

#[cfg(feature = "parallel")]
impl<T> Copy for SendPtr<T> {}

#[cfg(feature = "parallel")]
unsafe impl<T: Send> Send for SendPtr<T> {}
#[cfg(feature = "parallel")]
unsafe impl<T: Send> Sync for SendPtr<T> {}

/// Fluent mask construction for a component tuple.
pub struct QueryBuilder<'w, C: ComponentTuple> {
    world: &'w mut World,
    mask: crate::mask::Mask,
    _marker: PhantomData<C>,
}

impl World {
    /// Starts a query over the given component tuple. The tuple types
    /// become required plain components; add further constraints on
    /// the builder.
    pub fn query<C: ComponentTuple>(&mut self) -> QueryBuilder<'_, C> {
        let mut mask = MaskPool::global().rent();
        C::seed(&mut mask);
        QueryBuilder {
            world: self,
            mask,
            _marker: PhantomData,
        }
    }
}

impl<'w, C: ComponentTuple> QueryBuilder<'w, C> {
    pub fn has<T: Component>(mut self) -> Self {
        self.mask.has(TypeExpression::of::<T>(Identity::NONE));
        self
    }

    /// Requires a `T`-relation; `target` may be [`Identity::ANY`].
    pub fn has_relation<T: Component>(mut self, target: Identity) -> Self {
        self.mask.has(TypeExpression::of::<T>(target));
        self
    }

    pub fn not<T: Component>(mut self) -> Self {
        self.mask.not(TypeExpression::of::<T>(Identity::NONE));
        self
    }

    pub fn not_relation<T: Component>(mut self, target: Identity) -> Self {
        self.mask.not(TypeExpression::of::<T>(target));
        self
    }

    pub fn any<T: Component>(mut self) -> Self {
        self.mask.any(TypeExpression::of::<T>(Identity::NONE));
        self
    }

    pub fn any_relation<T: Component>(mut self, target: Identity) -> Self {
        self.mask.any(TypeExpression::of::<T>(target));
        self
    }

    /// Registers (or finds) the cached view and hands out the handle.
    pub fn build(self) -> Query<'w, C> {
        let QueryBuilder { world, mask, .. } = self;
        let index = world.get_query(mask);
        Query {
            world,
            index,
            _marker: PhantomData,
        }
    }
}

/// Handle over a cached query view.
pub struct Query<'w, C: ComponentTuple> {
    world: &'w mut World,
    index: usize,
    _marker: PhantomData<C>,
}

impl<'w, C: ComponentTuple> Query<'w, C> {
    /// Number of entities currently matched.
    pub fn count(&self) -> usize {
        self.world
            .query_tables(self.index)
            .iter()
            .map(|&t| self.world.table(t).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether a live entity is in the view right now.
    pub fn contains(&self, identity: Identity) -> bool {
        match self.world.entity_table(identity) {
            Some(table_id) => self.world.query_tables(self.index).contains(&table_id),
            None => false,
        }
    }

    /// Snapshot of the matched identities.
    pub fn entities(&self) -> Vec<Identity> {
        let mut out = Vec::new();
        for &t in self.world.query_tables(self.index) {
            out.extend_from_slice(self.world.table(t).identities());
        }
        out
    }

    /// Unregisters the view and recycles its mask.
    pub fn dispose(self) {
        let Query { world, index, .. } = self;
        world.discard_query(index);
    }
}

macro_rules! impl_query_runners {
    ($(($c:ident, $p:ident)),+) => {
        impl<$($c: Component),+> ComponentTuple for ($($c,)+) {
            fn seed(mask: &mut crate::mask::Mask) {
                $(mask.has(TypeExpression::of::<$c>(Identity::NONE));)+
            }

            fn assert_distinct() {
                let mut ids = vec![$(TypeRegistry::global().id_of::<$c>()),+];
                let before = ids.len();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(
                    ids.len(),
                    before,
                    "query tuples must use distinct component types"
                );
            }
        }

        impl<'w, $($c: Component),+> Query<'w, ($($c,)+)> {
            /// Serial pass over every matched row.
            pub fn run<F>(&mut self, mut action: F) -> Result<()>
            where
                F: FnMut($(&mut $c),+),
            {
                #[cfg(debug_assertions)]
                <($($c,)+) as ComponentTuple>::assert_distinct();
                let index = self.index;
                self.world.run_locked(|world| {
                    let table_ids = world.query_tables(index).to_vec();
                    for table_id in table_ids {
                        let table = world.table_mut(table_id);
                        let count = table.count();
                        if count == 0 {
                            continue;
                        }
                        $(
                            let $p = match table.column_base::<$c>() {
                                Some(p) => p,
                                None => continue,
                            };
                        )+
                        for row in 0..count {
                            // SAFETY: distinct tuple types map to distinct
                            // columns, and no structural change can touch the
                            // table while the world is locked.
                            action($(unsafe { &mut *$p.add(row) }),+);
                        }
                    }
                })
            }

            /// Serial pass that also hands the callback a deferral
            /// handle for structural requests.
            pub fn run_with<F>(&mut self, mut action: F) -> Result<()>
            where
                F: FnMut(Ops<'_>, $(&mut $c),+),
            {
                #[cfg(debug_assertions)]
                <($($c,)+) as ComponentTuple>::assert_distinct();
                let index = self.index;
                self.world.run_locked(|world| {
                    let table_ids = world.query_tables(index).to_vec();
                    let (tables, queue) = world.tables_and_queue();
                    for table_id in table_ids {
                        let table = &mut tables[table_id];
                        let count = table.count();
                        if count == 0 {
                            continue;
                        }
                        $(
                            let $p = match table.column_base::<$c>() {
                                Some(p) => p,
                                None => continue,
                            };
                        )+
                        for row in 0..count {
                            // SAFETY: as in `run`.
                            action(Ops::new(queue), $(unsafe { &mut *$p.add(row) }),+);
                        }
                    }
                })
            }

            /// Serial pass with a shared uniform argument.
            pub fn run_uniform<U, F>(&mut self, mut action: F, uniform: U) -> Result<()>
            where
                F: FnMut($(&mut $c,)+ &U),
            {
                #[cfg(debug_assertions)]
                <($($c,)+) as ComponentTuple>::assert_distinct();
                let index = self.index;
                self.world.run_locked(|world| {
                    let table_ids = world.query_tables(index).to_vec();
                    for table_id in table_ids {
                        let table = world.table_mut(table_id);
                        let count = table.count();
                        if count == 0 {
                            continue;
                        }
                        $(
                            let $p = match table.column_base::<$c>() {
                                Some(p) => p,
                                None => continue,
                            };
                        )+
                        for row in 0..count {
                            // SAFETY: as in `run`.
                            action($(unsafe { &mut *$p.add(row) },)+ &uniform);
                        }
                    }
                })
            }

            /// Whole-column access, one call per matched table.
            pub fn raw<F>(&mut self, mut action: F) -> Result<()>
            where
                F: FnMut($(&mut [$c]),+),
            {
                #[cfg(debug_assertions)]
                <($($c,)+) as ComponentTuple>::assert_distinct();
                let index = self.index;
                self.world.run_locked(|world| {
                    let table_ids = world.query_tables(index).to_vec();
                    for table_id in table_ids {
                        let table = world.table_mut(table_id);
                        let count = table.count();
                        if count == 0 {
                            continue;
                        }
                        $(
                            let $p = match table.column_base::<$c>() {
                                Some(p) => p,
                                None => continue,
                            };
                        )+
                        // SAFETY: as in `run`; the slices cover disjoint
                        // columns of the same table.
                        action($(unsafe { std::slice::from_raw_parts_mut($p, count) }),+);
                    }
                })
            }

            /// Parallel pass. Each table splits into
            /// `clamp(count / chunk_size, 1, threads)` disjoint row
            /// ranges; the last range absorbs the remainder and the
            /// calling thread works the first one. Returns only after
            /// every range finished; a worker panic resurfaces on the
            /// caller once all ranges are done.
            #[cfg(feature = "parallel")]
            pub fn run_parallel<F>(&mut self, action: F, chunk_size: usize) -> Result<()>
            where
                F: Fn($(&mut $c),+) + Send + Sync,
            {
                #[cfg(debug_assertions)]
                <($($c,)+) as ComponentTuple>::assert_distinct();
                let index = self.index;
                self.world.run_locked(|world| {
                    #[cfg(feature = "profiling")]
                    let _span = info_span!("run_parallel").entered();
                    let table_ids = world.query_tables(index).to_vec();
                    for table_id in table_ids {
                        let table = world.table_mut(table_id);
                        let count = table.count();
                        if count == 0 {
                            continue;
                        }
                        $(
                            let $p = match table.column_base::<$c>() {
                                Some(p) => SendPtr(p),
                                None => continue,
                            };
                        )+
                        let threads = rayon::current_num_threads().max(1);
                        let partitions = (count / chunk_size.max(1)).clamp(1, threads);
                        let partition_size = count / partitions;
                        let action = &action;
                        rayon::scope(|scope| {
                            for partition in 1..partitions {
                                scope.spawn(move |_| {
                                    // Rebind so the closure captures the Send
                                    // wrappers, not their raw pointer fields.
                                    $(let $p = $p;)+
                                    let start = partition * partition_size;
                                    let end = if partition == partitions - 1 {
                                        count
                                    } else {
                                        start + partition_size
                                    };
                                    for row in start..end {
                                        // SAFETY: row ranges are disjoint
                                        // across partitions.
                                        action($(unsafe { &mut *$p.0.add(row) }),+);
                                    }
                                });
                            }
                            let end = if partitions == 1 { count } else { partition_size };
                            for row in 0..end {
                                // SAFETY: partition 0 is disjoint from the rest.
                                action($(unsafe { &mut *$p.0.add(row) }),+);
                            }
                        });
                    }
                })
            }

            /// Parallel pass with a shared uniform argument.
            #[cfg(feature = "parallel")]
            pub fn run_parallel_uniform<U, F>(
                &mut self,
                action: F,
                uniform: U,
                chunk_size: usize,
            ) -> Result<()>
            where
                U: Sync,
                F: Fn($(&mut $c,)+ &U) + Send + Sync,
            {
                #[cfg(debug_assertions)]
                <($($c,)+) as ComponentTuple>::assert_distinct();
                let index = self.index;
                self.world.run_locked(|world| {
                    let table_ids = world.query_tables(index).to_vec();
                    for table_id in table_ids {
                        let table = world.table_mut(table_id);
                        let count = table.count();
                        if count == 0 {
                            continue;
                        }
                        $(
                            let $p = match table.column_base::<$c>() {
                                Some(p) => SendPtr(p),
                                None => continue,
                            };
                        )+
                        let threads = rayon::current_num_threads().max(1);
                        let partitions = (count / chunk_size.max(1)).clamp(1, threads);
                        let partition_size = count / partitions;
                        let action = &action;
                        let uniform = &uniform;
                        rayon::scope(|scope| {
                            for partition in 1..partitions {
                                scope.spawn(move |_| {
                                    $(let $p = $p;)+
                                    let start = partition * partition_size;
                                    let end = if partition == partitions - 1 {
                                        count
                                    } else {
                                        start + partition_size
                                    };
                                    for row in start..end {
                                        // SAFETY: as in `run_parallel`.
                                        action($(unsafe { &mut *$p.0.add(row) },)+ uniform);
                                    }
                                });
                            }
                            let end = if partitions == 1 { count } else { partition_size };
                            for row in 0..end {
                                // SAFETY: as in `run_parallel`.
                                action($(unsafe { &mut *$p.0.add(row) },)+ uniform);
                            }
                        });
                    }
                })
            }

            /// Parallel pass whose callback may defer structural
            /// changes through [`Ops`].
            #[cfg(feature = "parallel")]
            pub fn run_parallel_with<F>(&mut self, action: F, chunk_size: usize) -> Result<()>
            where
                F: Fn(Ops<'_>, $(&mut $c),+) + Send + Sync,
            {
                #[cfg(debug_assertions)]
                <($($c,)+) as ComponentTuple>::assert_distinct();
                let index = self.index;
                self.world.run_locked(|world| {
                    let table_ids = world.query_tables(index).to_vec();
                    let (tables, queue) = world.tables_and_queue();
                    for table_id in table_ids {
                        let table = &mut tables[table_id];
                        let count = table.count();
                        if count == 0 {
                            continue;
                        }
                        $(
                            let $p = match table.column_base::<$c>() {
                                Some(p) => SendPtr(p),
                                None => continue,
                            };
                        )+
                        let threads = rayon::current_num_threads().max(1);
                        let partitions = (count / chunk_size.max(1)).clamp(1, threads);
                        let partition_size = count / partitions;
                        let action = &action;
                        let ops = Ops::new(queue);
                        rayon::scope(|scope| {
                            for partition in 1..partitions {
                                scope.spawn(move |_| {
                                    $(let $p = $p;)+
                                    let start = partition * partition_size;
                                    let end = if partition == partitions - 1 {
                                        count
                                    } else {
                                        start + partition_size
                                    };
                                    for row in start..end {
                                        // SAFETY: as in `run_parallel`.
                                        action(ops, $(unsafe { &mut *$p.0.add(row) }),+);
                                    }
                                });
                            }
                            let end = if partitions == 1 { count } else { partition_size };
                            for row in 0..end {
                                // SAFETY: as in `run_parallel`.
                                action(ops, $(unsafe { &mut *$p.0.add(row) }),+);
                            }
                        });
                    }
                })
            }
        }
    };
}

impl_query_runners!((C1, p1));
impl_query_runners!((C1, p1), (C2, p2));
impl_query_runners!((C1, p1), (C2, p2), (C3, p3));
impl_query_runners!((C1, p1), (C2, p2), (C3, p3), (C4, p4));
impl_query_runners!((C1, p1), (C2, p2), (C3, p3), (C4, p4), (C5, p5));
