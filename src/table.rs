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

//! Tables: one columnar storage block per exact component set.
//!
//! Every entity lives in exactly one table row. Rows are removed by
//! swap-remove, so the caller must patch the meta of whichever entity
//! slid into the vacated row. Tables are created lazily and never
//! destroyed; cached edges link each table to its add/remove
//! neighbours in the archetype graph.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::component::{Component, TypeInfo, TypeRegistry};
use crate::entity::Identity;
use crate::expression::TypeExpression;

/// A table's sorted type set.
pub type TableTypes = SmallVec<[TypeExpression; 8]>;

/// Type-erased contiguous component storage.
///
/// Layout-aware raw buffer: the item layout comes from the type
/// registry, values are manipulated through raw pointers and dropped
/// via the registered drop fn. Zero-sized types store no bytes but
/// still track a length.
pub struct Column {
    data: NonNull<u8>,
    len: usize,
    capacity: usize,
    layout: Layout,
    drop_fn: Option<unsafe fn(*mut u8)>,
}

// Columns only ever hold component values, which are Send + Sync by
// the Component trait bound at every insertion site.
unsafe impl Send for Column {}
unsafe impl Sync for Column {}

fn array_layout(item: Layout, n: usize) -> Layout {
    let size = match item.size().checked_mul(n) {
        Some(s) => s,
        None => panic!("column capacity overflow"),
    };
    match Layout::from_size_align(size, item.align()) {
        Ok(layout) => layout,
        Err(_) => panic!("column capacity overflow"),
    }
}

impl Column {
    pub fn new(info: &TypeInfo) -> Self {
        // Aligned dangling pointer; real storage is allocated on first
        // reserve. ZST columns keep it forever.
        let data = unsafe { NonNull::new_unchecked(info.layout.align() as *mut u8) };
        Column {
            data,
            len: 0,
            capacity: if info.layout.size() == 0 { usize::MAX } else { 0 },
            layout: info.layout,
            drop_fn: info.drop_fn,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn item_size(&self) -> usize {
        self.layout.size()
    }

    fn reserve(&mut self, additional: usize) {
        let size = self.layout.size();
        if size == 0 {
            return;
        }
        let needed = self.len + additional;
        if needed <= self.capacity {
            return;
        }
        let new_capacity = needed.max(self.capacity * 2).max(4);
        let new_layout = array_layout(self.layout, new_capacity);
        let ptr = if self.capacity == 0 {
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = array_layout(self.layout, self.capacity);
            unsafe { alloc::realloc(self.data.as_ptr(), old_layout, new_layout.size()) }
        };
        self.data = match NonNull::new(ptr) {
            Some(p) => p,
            None => alloc::handle_alloc_error(new_layout),
        };
        self.capacity = new_capacity;
    }

    /// Raw pointer to a row. The row is not bounds-checked.
    pub(crate) fn ptr_at(&self, row: usize) -> *mut u8 {
        unsafe { self.data.as_ptr().add(row * self.layout.size()) }
    }

    /// Appends an uninitialized row and returns its index. The caller
    /// must initialize it (via `write` or a raw copy) before anything
    /// reads or drops it.
    pub fn push_uninit(&mut self) -> usize {
        self.reserve(1);
        let row = self.len;
        self.len += 1;
        row
    }

    /// Writes a value into a row slot without dropping prior contents.
    ///
    /// # Safety
    /// `row < len`, `T` matches the column's registered type, and the
    /// slot must currently be uninitialized (fresh from `push_uninit`).
    pub unsafe fn write<T>(&mut self, row: usize, value: T) {
        debug_assert!(row < self.len);
        debug_assert_eq!(std::mem::size_of::<T>(), self.layout.size());
        std::ptr::write(self.ptr_at(row) as *mut T, value);
    }

    pub fn get<T>(&self, row: usize) -> Option<&T> {
        debug_assert_eq!(std::mem::size_of::<T>(), self.layout.size());
        if row < self.len {
            Some(unsafe { &*(self.ptr_at(row) as *const T) })
        } else {
            None
        }
    }

    pub fn get_mut<T>(&mut self, row: usize) -> Option<&mut T> {
        debug_assert_eq!(std::mem::size_of::<T>(), self.layout.size());
        if row < self.len {
            Some(unsafe { &mut *(self.ptr_at(row) as *mut T) })
        } else {
            None
        }
    }

    /// Base pointer for typed bulk access.
    pub(crate) fn as_mut_ptr<T>(&mut self) -> *mut T {
        debug_assert_eq!(std::mem::size_of::<T>(), self.layout.size());
        self.data.as_ptr() as *mut T
    }

    pub fn as_slice<T>(&self) -> &[T] {
        debug_assert_eq!(std::mem::size_of::<T>(), self.layout.size());
        unsafe { std::slice::from_raw_parts(self.data.as_ptr() as *const T, self.len) }
    }

    pub fn as_mut_slice<T>(&mut self) -> &mut [T] {
        debug_assert_eq!(std::mem::size_of::<T>(), self.layout.size());
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr() as *mut T, self.len) }
    }

    /// Drops the value in a row, leaving the slot uninitialized.
    pub(crate) fn drop_in_place(&mut self, row: usize) {
        debug_assert!(row < self.len);
        if let Some(drop_fn) = self.drop_fn {
            unsafe { drop_fn(self.ptr_at(row)) };
        }
    }

    /// Swap-removes a row without dropping its value (the value was
    /// moved out or dropped by the caller).
    pub(crate) fn swap_remove_forget(&mut self, row: usize) {
        debug_assert!(row < self.len);
        let last = self.len - 1;
        if row < last && self.layout.size() > 0 {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.ptr_at(last),
                    self.ptr_at(row),
                    self.layout.size(),
                );
            }
        }
        self.len = last;
    }

    /// Swap-removes a row, dropping its value.
    pub(crate) fn swap_remove_drop(&mut self, row: usize) {
        self.drop_in_place(row);
        self.swap_remove_forget(row);
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop_fn {
            for row in 0..self.len {
                unsafe { drop_fn(self.ptr_at(row)) };
            }
        }
        if self.layout.size() > 0 && self.capacity > 0 {
            unsafe {
                alloc::dealloc(self.data.as_ptr(), array_layout(self.layout, self.capacity));
            }
        }
    }
}

/// Cached structural neighbours of a table for one type expression.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableEdge {
    pub add: Option<usize>,
    pub remove: Option<usize>,
}

/// One archetype: every entity whose exact component set equals
/// `types`, stored row-aligned across `identities` and `columns`.
pub struct Table {
    id: usize,
    types: TableTypes,
    identities: Vec<Identity>,
    columns: Vec<Column>,
    column_index: FxHashMap<TypeExpression, usize>,
    edges: FxHashMap<TypeExpression, TableEdge>,
}

impl Table {
    /// Builds a table for an exact (sorted) type set, pulling column
    /// vtables from the global registry.
    pub fn new(id: usize, types: TableTypes) -> Self {
        debug_assert!(types.windows(2).all(|w| w[0] < w[1]));
        let registry = TypeRegistry::global();
        let mut columns = Vec::with_capacity(types.len());
        let mut column_index =
            FxHashMap::with_capacity_and_hasher(types.len(), Default::default());
        for (i, expression) in types.iter().enumerate() {
            columns.push(Column::new(&registry.info(expression.type_id())));
            column_index.insert(*expression, i);
        }
        Table {
            id,
            types,
            identities: Vec::new(),
            columns,
            column_index,
            edges: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn types(&self) -> &[TypeExpression] {
        &self.types
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn count(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Exact (non-wildcard) membership of a type expression.
    pub fn contains(&self, expression: TypeExpression) -> bool {
        self.column_index.contains_key(&expression)
    }

    pub fn column(&self, expression: TypeExpression) -> Option<&Column> {
        self.column_index.get(&expression).map(|&i| &self.columns[i])
    }

    pub fn column_mut(&mut self, expression: TypeExpression) -> Option<&mut Column> {
        match self.column_index.get(&expression) {
            Some(&i) => Some(&mut self.columns[i]),
            None => None,
        }
    }

    /// Base pointer of the plain (untargeted) column for `T`.
    pub(crate) fn column_base<T: Component>(&mut self) -> Option<*mut T> {
        let expression = TypeExpression::of::<T>(Identity::NONE);
        self.column_mut(expression).map(|c| c.as_mut_ptr::<T>())
    }

    /// Appends a row for `identity` with every column slot
    /// uninitialized; the caller fills them before the row is read.
    pub(crate) fn add_row(&mut self, identity: Identity) -> usize {
        let row = self.identities.len();
        self.identities.push(identity);
        for column in &mut self.columns {
            let r = column.push_uninit();
            debug_assert_eq!(r, row);
        }
        row
    }

    /// Swap-removes a row, dropping every component value in it.
    /// Returns the identity that now occupies `row`, if any.
    pub(crate) fn remove_row(&mut self, row: usize) -> Option<Identity> {
        debug_assert!(row < self.identities.len());
        for column in &mut self.columns {
            column.swap_remove_drop(row);
        }
        self.identities.swap_remove(row);
        self.identities.get(row).copied()
    }

    /// Swap-removes a row whose values were already moved out or
    /// dropped. Returns the identity that now occupies `row`, if any.
    fn swap_remove_forget_row(&mut self, row: usize) -> Option<Identity> {
        for column in &mut self.columns {
            column.swap_remove_forget(row);
        }
        self.identities.swap_remove(row);
        self.identities.get(row).copied()
    }

    /// Moves the entity in `src[row]` into `dst`.
    ///
    /// Columns present in both tables are copied byte-wise; values
    /// whose type the destination lacks are dropped. Returns the new
    /// row in `dst` and the identity swapped into `src[row]`.
    pub(crate) fn relocate(
        src: &mut Table,
        row: usize,
        dst: &mut Table,
        identity: Identity,
    ) -> (usize, Option<Identity>) {
        debug_assert!(row < src.identities.len());
        let new_row = dst.add_row(identity);
        for (i, expression) in src.types.iter().enumerate() {
            let src_column = &mut src.columns[i];
            match dst.column_index.get(expression) {
                Some(&j) => unsafe {
                    std::ptr::copy_nonoverlapping(
                        src_column.ptr_at(row),
                        dst.columns[j].ptr_at(new_row),
                        src_column.item_size(),
                    );
                },
                None => src_column.drop_in_place(row),
            }
        }
        let swapped = src.swap_remove_forget_row(row);
        (new_row, swapped)
    }

    /// Cached edge for a type expression (zeroed on first access).
    pub(crate) fn edge_mut(&mut self, expression: TypeExpression) -> &mut TableEdge {
        self.edges.entry(expression).or_default()
    }

    pub(crate) fn edge(&self, expression: TypeExpression) -> TableEdge {
        self.edges.get(&expression).copied().unwrap_or_default()
    }
}
