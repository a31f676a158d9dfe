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

//! Query masks: the has/not/any constraint lists a query is keyed by.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::expression::TypeExpression;

/// A query's constraint set.
///
/// `has` entries are required (an `ANY` target resolves through the
/// world's relation index), `not` entries exclude, and a non-empty
/// `any` list requires at least one hit. Masks are canonicalized
/// (sorted, deduplicated) before they key the query cache, so the
/// order constraints were added in does not split the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Mask {
    pub has: Vec<TypeExpression>,
    pub not: Vec<TypeExpression>,
    pub any: Vec<TypeExpression>,
}

impl Mask {
    pub fn new() -> Self {
        Mask::default()
    }

    pub fn has(&mut self, expression: TypeExpression) -> &mut Self {
        self.has.push(expression);
        self
    }

    pub fn not(&mut self, expression: TypeExpression) -> &mut Self {
        self.not.push(expression);
        self
    }

    pub fn any(&mut self, expression: TypeExpression) -> &mut Self {
        self.any.push(expression);
        self
    }

    pub fn canonicalize(&mut self) {
        self.has.sort_unstable();
        self.has.dedup();
        self.not.sort_unstable();
        self.not.dedup();
        self.any.sort_unstable();
        self.any.dedup();
    }

    /// First `has` entry usable as a storage key (target not `ANY`),
    /// the seed for candidate-table scans.
    pub fn first_concrete_has(&self) -> Option<TypeExpression> {
        self.has.iter().copied().find(|e| !e.target().is_any())
    }

    pub fn clear(&mut self) {
        self.has.clear();
        self.not.clear();
        self.any.clear();
    }
}

/// Recycles mask allocations across query builds.
pub struct MaskPool {
    pool: Mutex<Vec<Mask>>,
}

static MASK_POOL: OnceLock<MaskPool> = OnceLock::new();

impl MaskPool {
    pub fn global() -> &'static MaskPool {
        MASK_POOL.get_or_init(|| MaskPool { pool: Mutex::new(Vec::new()) })
    }

    pub fn rent(&self) -> Mask {
        self.pool.lock().pop().unwrap_or_default()
    }

    pub fn recycle(&self, mut mask: Mask) {
        mask.clear();
        self.pool.lock().push(mask);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Identity;

    struct A;
    struct B;

    #[test]
    fn canonical_masks_compare_equal_regardless_of_order() {
        let a = TypeExpression::of::<A>(Identity::NONE);
        let b = TypeExpression::of::<B>(Identity::NONE);

        let mut first = Mask::new();
        first.has(a).has(b);
        let mut second = Mask::new();
        second.has(b).has(a).has(a);

        first.canonicalize();
        second.canonicalize();
        assert_eq!(first, second);
    }

    #[test]
    fn lists_are_independent() {
        let a = TypeExpression::of::<A>(Identity::NONE);
        let mut with_has = Mask::new();
        with_has.has(a);
        let mut with_not = Mask::new();
        with_not.not(a);
        assert_ne!(with_has, with_not);
    }

    #[test]
    fn first_concrete_has_skips_wildcards() {
        let wild = TypeExpression::of::<A>(Identity::ANY);
        let plain = TypeExpression::of::<B>(Identity::NONE);
        let mut mask = Mask::new();
        mask.has(wild).has(plain);
        assert_eq!(mask.first_concrete_has(), Some(plain));

        let mut only_wild = Mask::new();
        only_wild.has(wild);
        assert_eq!(only_wild.first_concrete_has(), None);
    }

    #[test]
    fn pool_hands_back_cleared_masks() {
        let pool = MaskPool::global();
        let mut mask = pool.rent();
        mask.has(TypeExpression::of::<A>(Identity::NONE));
        pool.recycle(mask);
        let again = pool.rent();
        assert!(again.has.is_empty());
    }
}
