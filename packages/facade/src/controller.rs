//! Controller contracts
//!
//! Lifecycle hooks are recognized by implementation, not registered: a
//! component or directive class implements [`Controller`] and overrides the
//! hooks it cares about.

use std::any::Any;

use indexmap::IndexMap;
use serde_json::Value;

use crate::callable::Instance;
use crate::error::Result;

/// One binding change delivered to [`Controller::on_changes`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleChange {
    pub previous: Value,
    pub current: Value,
    pub first_change: bool,
}

impl SimpleChange {
    pub fn new(previous: Value, current: Value, first_change: bool) -> Self {
        Self {
            previous,
            current,
            first_change,
        }
    }

    pub fn is_first_change(&self) -> bool {
        self.first_change
    }
}

/// Changes keyed by property name, in binding order.
pub type Changes = IndexMap<String, SimpleChange>;

pub trait Controller: Any {
    fn on_init(&self) -> Result<()> {
        Ok(())
    }

    fn on_changes(&self, _changes: &Changes) -> Result<()> {
        Ok(())
    }

    fn on_destroy(&self) {}
}

/// The pipe transform contract.
pub trait PipeTransform: Any {
    fn transform(&self, value: &Value, args: &[Value]) -> Value;
}

/// Recovers the controller view of an injector-produced instance.
pub type ControllerCast = for<'a> fn(&'a Instance) -> Option<&'a dyn Controller>;

pub type PipeCast = for<'a> fn(&'a Instance) -> Option<&'a dyn PipeTransform>;

pub fn cast_controller<C: Controller>(instance: &Instance) -> Option<&dyn Controller> {
    instance
        .downcast_ref::<C>()
        .map(|controller| controller as &dyn Controller)
}

pub fn cast_pipe<P: PipeTransform>(instance: &Instance) -> Option<&dyn PipeTransform> {
    instance.downcast_ref::<P>().map(|pipe| pipe as &dyn PipeTransform)
}
