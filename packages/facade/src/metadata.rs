//! Metadata Store
//!
//! Decorator declarations keyed by `(semantic key, target)`. Targets are
//! compared by identity, so unrelated classes never share entries, and
//! nothing is written onto the class value itself.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::callable::FnRef;

/// A typed semantic key. The value type is part of the key.
pub struct MetadataKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> MetadataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for MetadataKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MetadataKey<T> {}

impl<T> fmt::Debug for MetadataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MetadataKey({})", self.name)
    }
}

/// Attachment point: the class itself, or its prototype (instance members).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Class(FnRef),
    Prototype(FnRef),
}

impl Target {
    pub fn class(&self) -> &FnRef {
        match self {
            Target::Class(class) | Target::Prototype(class) => class,
        }
    }
}

type Slot = (TypeId, &'static str, Target);

#[derive(Default)]
pub struct MetadataStore {
    entries: HashMap<Slot, Box<dyn Any>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Any>(&mut self, key: MetadataKey<T>, value: T, target: &Target) {
        self.entries.insert(slot(key, target), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: MetadataKey<T>, target: &Target) -> Option<&T> {
        self.entries
            .get(&slot(key, target))
            .and_then(|value| value.downcast_ref::<T>())
    }

    pub fn has<T: Any>(&self, key: MetadataKey<T>, target: &Target) -> bool {
        self.entries.contains_key(&slot(key, target))
    }

    /// Install `default` on first use and hand back the stored value on
    /// every later call.
    pub fn get_or_init<T: Any>(
        &mut self,
        key: MetadataKey<T>,
        default: T,
        target: &Target,
    ) -> &mut T {
        let value = self
            .entries
            .entry(slot(key, target))
            .or_insert_with(|| Box::new(default));
        // The slot carries `TypeId::of::<T>()`, so it only ever holds a `T`.
        let Some(value) = value.downcast_mut::<T>() else {
            unreachable!("metadata slot holds a value of another type")
        };
        value
    }
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.keys().map(|(_, name, target)| (name, target)))
            .finish()
    }
}

fn slot<T: Any>(key: MetadataKey<T>, target: &Target) -> Slot {
    (TypeId::of::<T>(), key.name, target.clone())
}
