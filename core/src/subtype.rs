//! SubtypeRegistry - Explicit "same-or-supertype" Matching
//!
//! A step declares the message type it reacts to; an incoming message
//! carries its concrete runtime tag. The two match when they are equal or
//! when the registry says the declared type is a (transitive) supertype of
//! the runtime type.
//!
//! Supertype edges are registered at build time. There is no reflection and
//! no implicit hierarchy: what is not registered does not match.

use std::any::TypeId;

use ahash::AHashMap;

use crate::message::TypeTag;

#[derive(Debug, Clone, Default)]
pub struct SubtypeRegistry {
    supers: AHashMap<TypeId, Vec<TypeTag>>,
}

impl SubtypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `Super` a supertype of `Sub`. Transitivity is resolved at
    /// lookup time, so chains may be registered edge by edge.
    pub fn register<Sub: 'static, Super: 'static>(&mut self) {
        let supers = self.supers.entry(TypeId::of::<Sub>()).or_default();
        let tag = TypeTag::of::<Super>();
        if !supers.contains(&tag) {
            supers.push(tag);
        }
    }

    /// Is `declared` the same as, or a registered supertype of, `runtime`?
    pub fn satisfies(&self, declared: TypeTag, runtime: TypeTag) -> bool {
        if declared == runtime {
            return true;
        }
        let mut seen: Vec<TypeId> = vec![runtime.id()];
        let mut frontier = vec![runtime.id()];
        while let Some(current) = frontier.pop() {
            let Some(supers) = self.supers.get(&current) else {
                continue;
            };
            for tag in supers {
                if tag.id() == declared.id() {
                    return true;
                }
                if !seen.contains(&tag.id()) {
                    seen.push(tag.id());
                    frontier.push(tag.id());
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    struct Mid;
    struct Leaf;
    struct Unrelated;

    #[test]
    fn equal_tags_always_satisfy() {
        let registry = SubtypeRegistry::new();
        assert!(registry.satisfies(TypeTag::of::<Leaf>(), TypeTag::of::<Leaf>()));
    }

    #[test]
    fn transitive_supertypes_satisfy() {
        let mut registry = SubtypeRegistry::new();
        registry.register::<Leaf, Mid>();
        registry.register::<Mid, Base>();

        assert!(registry.satisfies(TypeTag::of::<Mid>(), TypeTag::of::<Leaf>()));
        assert!(registry.satisfies(TypeTag::of::<Base>(), TypeTag::of::<Leaf>()));
        // the relation is directed
        assert!(!registry.satisfies(TypeTag::of::<Leaf>(), TypeTag::of::<Base>()));
        assert!(!registry.satisfies(TypeTag::of::<Unrelated>(), TypeTag::of::<Leaf>()));
    }

    #[test]
    fn cycles_terminate() {
        let mut registry = SubtypeRegistry::new();
        registry.register::<Leaf, Mid>();
        registry.register::<Mid, Leaf>();

        assert!(!registry.satisfies(TypeTag::of::<Base>(), TypeTag::of::<Leaf>()));
    }
}
