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

//! Component trait and the process-wide type registry.
//!
//! Components are plain data attached to entities. The registry assigns
//! every component type a small numeric id that type expressions embed,
//! and keeps the erased column vtable (layout, drop, unbox) so storage
//! can be built from a type id alone.

use std::alloc::Layout;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

/// Marker trait for component data.
///
/// Blanket-implemented: any `'static + Send + Sync` type is a component.
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Boxed component payload as carried by deferred operations.
pub type BoxedComponent = Box<dyn Any + Send + Sync>;

/// Erased per-type metadata: everything a column needs to store values
/// of the type without knowing it statically.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    pub name: &'static str,
    pub layout: Layout,
    pub drop_fn: Option<unsafe fn(*mut u8)>,
    pub unbox_fn: unsafe fn(BoxedComponent, *mut u8),
}

impl TypeInfo {
    pub fn of<T: Component>() -> Self {
        TypeInfo {
            name: type_name::<T>(),
            layout: Layout::new::<T>(),
            drop_fn: if std::mem::needs_drop::<T>() {
                Some(drop_in_place::<T> as unsafe fn(*mut u8))
            } else {
                None
            },
            unbox_fn: unbox_into::<T> as unsafe fn(BoxedComponent, *mut u8),
        }
    }
}

unsafe fn drop_in_place<T>(ptr: *mut u8) {
    std::ptr::drop_in_place(ptr as *mut T);
}

/// Moves a boxed value into raw column memory.
///
/// # Safety
/// `dst` must be valid, writable and aligned for `T`; the box must hold
/// a `T` (guaranteed by the registry pairing id and info).
unsafe fn unbox_into<T: 'static>(data: BoxedComponent, dst: *mut u8) {
    match data.downcast::<T>() {
        Ok(value) => std::ptr::write(dst as *mut T, *value),
        Err(_) => unreachable!("boxed component does not match its registered type"),
    }
}

struct RegistryInner {
    ids: HashMap<TypeId, u16>,
    infos: Vec<TypeInfo>,
}

/// Process-wide component type registry.
///
/// A single mutex guards id assignment; ids start at 1 and are stable
/// for the lifetime of the process. The u16 id space running out is a
/// programming error and fails fast.
pub struct TypeRegistry {
    inner: Mutex<RegistryInner>,
}

static REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

impl TypeRegistry {
    pub fn global() -> &'static TypeRegistry {
        REGISTRY.get_or_init(|| TypeRegistry {
            inner: Mutex::new(RegistryInner {
                ids: HashMap::new(),
                infos: Vec::new(),
            }),
        })
    }

    /// The numeric id of `T`, assigned on first use.
    pub fn id_of<T: Component>(&self) -> u16 {
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.ids.get(&TypeId::of::<T>()) {
            return id;
        }
        if inner.infos.len() >= u16::MAX as usize - 1 {
            panic!("component type id space exhausted");
        }
        inner.infos.push(TypeInfo::of::<T>());
        let id = inner.infos.len() as u16;
        inner.ids.insert(TypeId::of::<T>(), id);
        id
    }

    /// Column vtable for a registered id. Panics on unknown ids; every
    /// id reaching storage was minted by `id_of`.
    pub fn info(&self, type_id: u16) -> TypeInfo {
        let inner = self.inner.lock();
        match inner.infos.get(type_id as usize - 1) {
            Some(info) => *info,
            None => panic!("unregistered component type id {}", type_id),
        }
    }

    /// Human-readable name for diagnostics.
    pub fn type_name(&self, type_id: u16) -> &'static str {
        let inner = self.inner.lock();
        inner
            .infos
            .get(type_id as usize - 1)
            .map(|info| info.name)
            .unwrap_or("<unregistered>")
    }
}
