//! Blackboard - Type-Safe Working State
//!
//! The Blackboard is where step reactions keep the state of a running
//! session. It is a TypeMap: one slot per Rust type, no string keys, no
//! runtime casting visible at the API surface.
//!
//! Reactions receive `&mut Blackboard`; conditions and flow predicates
//! receive `&Blackboard`.

use std::any::{Any, TypeId};

use ahash::AHashMap;

/// Type-keyed working state for one runner session.
#[derive(Default)]
pub struct Blackboard {
    slots: AHashMap<TypeId, Box<dyn Any + Send>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous value of the same type.
    pub fn put<T: Send + 'static>(&mut self, value: T) {
        self.slots.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Borrow the stored value of type `T`, if present.
    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.slots
            .get(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_ref())
    }

    /// Mutably borrow the stored value of type `T`, if present.
    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.slots
            .get_mut(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast_mut())
    }

    /// Remove and return the stored value of type `T`.
    pub fn take<T: 'static>(&mut self) -> Option<T> {
        self.slots
            .remove(&TypeId::of::<T>())
            .and_then(|slot| slot.downcast().ok())
            .map(|slot| *slot)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.slots.contains_key(&TypeId::of::<T>())
    }

    /// Drop all stored values.
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blackboard")
            .field("slot_count", &self.slots.len())
            .finish()
    }
}
