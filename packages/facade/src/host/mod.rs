//! Host container contracts
//!
//! The by-name injection runtime the translation layer drives. Every
//! callable handed to the host is an [`Annotated`] function whose
//! dependencies are already canonical string tokens.

pub mod expression;
pub mod memory;

use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use bitflags::bitflags;
use indexmap::IndexMap;
use serde_json::Value;

use crate::callable::{Annotated, Instance};
use crate::controller::ControllerCast;
use crate::error::Result;

/// Named values made available to a single instantiation or invocation.
pub type Locals = IndexMap<String, Instance>;

/// Variables visible to an evaluated expression.
pub type ExprLocals = IndexMap<String, Value>;

pub type EventHandler = Rc<dyn Fn(&Value) -> Result<()>>;

pub trait HostRuntime {
    /// Create (or replace) the module `name` requiring `requires`.
    fn module(&self, name: &str, requires: &[String]) -> Rc<dyn HostModule>;
}

/// Registration verbs of a host module. Registration is recorded; nothing is
/// instantiated until an injector is created from the module.
pub trait HostModule {
    fn name(&self) -> &str;
    fn requires(&self) -> Vec<String>;
    fn constant(&self, name: &str, value: Instance);
    fn value(&self, name: &str, value: Instance);
    fn factory(&self, name: &str, factory: Annotated);
    fn service(&self, name: &str, constructor: Annotated);
    /// `constructor` must produce a [`HostProvider`].
    fn provider(&self, name: &str, constructor: Annotated);
    /// `decorator` receives the original instance as `$delegate`.
    fn decorator(&self, name: &str, decorator: Annotated);
    fn directive(&self, name: &str, factory: Annotated);
    fn filter(&self, name: &str, factory: Annotated);
    fn run(&self, block: Annotated);
}

pub trait HostInjector {
    fn get(&self, name: &str) -> Result<Instance>;
    fn has(&self, name: &str) -> bool;
    fn instantiate(&self, constructor: &Annotated, locals: &Locals) -> Result<Instance>;
    fn invoke(
        &self,
        function: &Annotated,
        this: Option<&Instance>,
        locals: &Locals,
    ) -> Result<Instance>;
}

pub trait HostScope {
    /// The digest phase currently running, if any.
    fn phase(&self) -> Option<&'static str>;
    /// Run `f` inside a digest cycle.
    fn apply(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}

pub trait HostElement {
    fn on(&self, event: &str, handler: EventHandler);
}

pub trait Expression {
    fn evaluate(&self, locals: &ExprLocals) -> Result<Value>;
}

pub trait ExpressionParser {
    fn parse(&self, text: &str) -> Result<Rc<dyn Expression>>;
}

macro_rules! host_ref {
    ($(#[$meta:meta])* $name:ident => $target:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub struct $name(pub Rc<dyn $target>);

        impl Deref for $name {
            type Target = dyn $target;

            fn deref(&self) -> &Self::Target {
                &*self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(stringify!($name))
            }
        }
    };
}

host_ref!(
    /// The `$injector` instance.
    InjectorRef => HostInjector
);
host_ref!(
    /// The `$scope` / `$rootScope` instances.
    ScopeRef => HostScope
);
host_ref!(
    /// The `$element` instance.
    ElementRef => HostElement
);
host_ref!(
    /// The `$parse` instance.
    ParserRef => ExpressionParser
);

/// What a provider constructor produces: the `$get` factory.
#[derive(Debug, Clone)]
pub struct HostProvider {
    pub get: Annotated,
}

/// Normalized element attributes, exposed as `$attrs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(IndexMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

pub type BindingCallback = Rc<dyn Fn(&ExprLocals) -> Result<Value>>;

#[derive(Clone)]
pub enum BindingValue {
    Value(Value),
    Text(String),
    Callback(BindingCallback),
    Controller(Option<Instance>),
}

impl fmt::Debug for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            BindingValue::Text(text) => f.debug_tuple("Text").field(text).finish(),
            BindingValue::Callback(_) => f.write_str("Callback"),
            BindingValue::Controller(c) => write!(f, "Controller({})", c.is_some()),
        }
    }
}

/// Bind-to-controller storage of one controller instance, exposed as `$bindings`.
#[derive(Debug, Default)]
pub struct Bindings {
    values: RefCell<IndexMap<String, BindingValue>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: BindingValue) {
        self.values.borrow_mut().insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<BindingValue> {
        self.values.borrow().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.borrow().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.values.borrow().keys().cloned().collect()
    }

    /// A one-way value, or an interpolated string as a JSON string.
    pub fn value(&self, name: &str) -> Option<Value> {
        match self.get(name)? {
            BindingValue::Value(value) => Some(value),
            BindingValue::Text(text) => Some(Value::String(text)),
            _ => None,
        }
    }

    pub fn callback(&self, name: &str) -> Option<BindingCallback> {
        match self.get(name)? {
            BindingValue::Callback(callback) => Some(callback),
            _ => None,
        }
    }

    pub fn controller(&self, name: &str) -> Option<Instance> {
        match self.get(name)? {
            BindingValue::Controller(controller) => controller,
            _ => None,
        }
    }
}

/// A registered filter.
#[derive(Clone)]
pub struct FilterFn {
    /// Re-evaluated on every digest even when the input is unchanged.
    pub stateful: bool,
    pub transform: Rc<dyn Fn(&Value, &[Value]) -> Value>,
}

impl FilterFn {
    pub fn apply(&self, value: &Value, args: &[Value]) -> Value {
        (self.transform)(value, args)
    }
}

impl fmt::Debug for FilterFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterFn")
            .field("stateful", &self.stateful)
            .finish()
    }
}

bitflags! {
    /// Directive matching restriction (`E`, `A`, `C`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Restrict: u8 {
        const ELEMENT = 1 << 0;
        const ATTRIBUTE = 1 << 1;
        const CLASS = 1 << 2;
    }
}

impl Restrict {
    pub fn to_host_string(self) -> String {
        let mut out = String::new();
        if self.contains(Restrict::ELEMENT) {
            out.push('E');
        }
        if self.contains(Restrict::ATTRIBUTE) {
            out.push('A');
        }
        if self.contains(Restrict::CLASS) {
            out.push('C');
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transclude {
    Enabled(bool),
    /// Multi-slot transclusion: slot name to element selector.
    Slots(IndexMap<String, String>),
}

/// Everything a pre-link routine receives for one compiled instance.
pub struct LinkContext {
    pub scope: Rc<ScopeRef>,
    pub element: Rc<ElementRef>,
    pub attrs: Rc<Attributes>,
    pub bindings: Rc<Bindings>,
    /// Required controllers by require-map key; `$$self` is the own controller.
    pub controllers: IndexMap<String, Option<Instance>>,
}

pub type PreLinkFn = Rc<dyn Fn(&LinkContext) -> Result<()>>;

#[derive(Clone, Default)]
pub struct LinkFns {
    pub pre: Option<PreLinkFn>,
}

pub type CompileFn = Rc<dyn Fn(&ElementRef, &Attributes) -> Result<LinkFns>>;

/// A host directive definition object.
#[derive(Clone)]
pub struct DirectiveDefinition {
    pub restrict: Restrict,
    pub controller: Option<Annotated>,
    pub controller_as: Option<String>,
    pub template: Option<String>,
    pub transclude: Option<Transclude>,
    /// Components get an isolated scope; plain directives share the parent's.
    pub isolate_scope: bool,
    /// Property to binding string, e.g. `"<?"`.
    pub bind_to_controller: IndexMap<String, String>,
    /// Require-map key to require string.
    pub require: IndexMap<String, String>,
    pub compile: Option<CompileFn>,
    pub lifecycle: Option<ControllerCast>,
}

impl DirectiveDefinition {
    pub fn new(restrict: Restrict) -> Self {
        Self {
            restrict,
            controller: None,
            controller_as: None,
            template: None,
            transclude: None,
            isolate_scope: false,
            bind_to_controller: IndexMap::new(),
            require: IndexMap::new(),
            compile: None,
            lifecycle: None,
        }
    }
}

impl fmt::Debug for DirectiveDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveDefinition")
            .field("restrict", &self.restrict.to_host_string())
            .field("controller", &self.controller)
            .field("controller_as", &self.controller_as)
            .field("template", &self.template)
            .field("transclude", &self.transclude)
            .field("isolate_scope", &self.isolate_scope)
            .field("bind_to_controller", &self.bind_to_controller)
            .field("require", &self.require)
            .field("compile", &self.compile.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_render_restrict_letters() {
        assert_eq!((Restrict::ELEMENT | Restrict::ATTRIBUTE).to_host_string(), "EA");
        assert_eq!(Restrict::CLASS.to_host_string(), "C");
    }

    #[test]
    fn should_read_bindings_by_kind() {
        let bindings = Bindings::new();
        bindings.set("count", BindingValue::Value(json!(3)));
        bindings.set("label", BindingValue::Text("hi".into()));

        assert_eq!(bindings.value("count"), Some(json!(3)));
        assert_eq!(bindings.value("label"), Some(json!("hi")));
        assert!(bindings.callback("count").is_none());
        assert!(bindings.controller("missing").is_none());
    }
}
