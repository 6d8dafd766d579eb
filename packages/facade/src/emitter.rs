//! Event emission
//!
//! An [`EventEmitter`] is inert until the owning component's pre-link routine
//! connects it to the bound callback expression. Emitting earlier is a
//! programming error and always fails.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{FacadeError, Result};

pub(crate) type EmitSink = Rc<dyn Fn(Value) -> Result<()>>;

#[derive(Default)]
pub struct EventEmitter {
    sink: RefCell<Option<EmitSink>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&self, value: impl Into<Value>) -> Result<()> {
        let sink = self
            .sink
            .borrow()
            .clone()
            .ok_or(FacadeError::UninitializedEmitter)?;
        sink(value.into())
    }

    pub fn is_connected(&self) -> bool {
        self.sink.borrow().is_some()
    }

    pub(crate) fn connect(&self, sink: EmitSink) {
        *self.sink.borrow_mut() = Some(sink);
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("connected", &self.is_connected())
            .finish()
    }
}
