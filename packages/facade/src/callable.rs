//! Function and class values
//!
//! Classes and plain functions are runtime values compared by identity, the
//! way constructor references are. A class carries an explicit list of
//! parameter types in place of reflected constructor metadata, plus any
//! explicitly injected tokens (`$inject` / `@Inject`).

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{FacadeError, Result};
use crate::token::Token;

/// Any value produced by the injector.
pub type Instance = Rc<dyn Any>;

/// Resolved dependency names; `None` marks a parameter that is not injected.
pub type DependencyList = SmallVec<[Option<String>; 4]>;

type Body = Rc<dyn Fn(Option<&Instance>, &Args) -> Result<Instance>>;

/// The unit instance returned by functions that produce nothing.
pub fn unit() -> Instance {
    Rc::new(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnKind {
    Class,
    Function,
}

/// Positional arguments handed to a function body by the injector.
pub struct Args {
    callee: String,
    values: Vec<Option<Instance>>,
}

impl Args {
    pub fn new(callee: impl Into<String>, values: Vec<Option<Instance>>) -> Self {
        Self {
            callee: callee.into(),
            values,
        }
    }

    pub fn empty(callee: impl Into<String>) -> Self {
        Self::new(callee, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn raw(&self, index: usize) -> Option<&Instance> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn instance(&self, index: usize) -> Result<Instance> {
        self.raw(index)
            .cloned()
            .ok_or_else(|| FacadeError::MissingArgument {
                callee: self.callee.clone(),
                index,
            })
    }

    /// Typed access to an injected argument.
    pub fn get<T: Any>(&self, index: usize) -> Result<Rc<T>> {
        self.instance(index)?
            .downcast::<T>()
            .map_err(|_| FacadeError::ArgumentType {
                callee: self.callee.clone(),
                index,
                expected: type_name::<T>(),
            })
    }

    pub fn optional<T: Any>(&self, index: usize) -> Option<Rc<T>> {
        self.raw(index)
            .and_then(|value| Rc::clone(value).downcast::<T>().ok())
    }
}

struct FnDef {
    name: String,
    kind: FnKind,
    inject: Vec<Option<Token>>,
    param_types: Option<Vec<Option<FnRef>>>,
    instance_type: Option<(TypeId, &'static str)>,
    body: Body,
}

/// A class or function reference.
///
/// Equality and hashing follow identity: two separately built functions with
/// the same name are different references.
#[derive(Clone)]
pub struct FnRef(Rc<FnDef>);

impl FnRef {
    pub fn class(name: impl Into<String>) -> FnBuilder {
        FnBuilder::new(name.into(), FnKind::Class)
    }

    pub fn function(name: impl Into<String>) -> FnBuilder {
        FnBuilder::new(name.into(), FnKind::Function)
    }

    /// A zero-dependency function returning `value` unchanged.
    pub fn value_fn(name: impl Into<String>, value: Instance) -> FnRef {
        FnRef::function(name).returning(move |_, _| Ok(Rc::clone(&value)))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> FnKind {
        self.0.kind
    }

    pub fn is_class(&self) -> bool {
        self.0.kind == FnKind::Class
    }

    /// Explicitly declared tokens, by parameter position.
    pub fn explicit_inject(&self) -> &[Option<Token>] {
        &self.0.inject
    }

    pub fn has_explicit_inject(&self) -> bool {
        self.0.inject.iter().any(Option::is_some)
    }

    /// Declared parameter types, absent when the class declares none.
    pub fn param_types(&self) -> Option<&[Option<FnRef>]> {
        self.0.param_types.as_deref()
    }

    /// Whether this class constructs values of type `T`.
    pub fn constructs<T: Any>(&self) -> bool {
        matches!(self.0.instance_type, Some((id, _)) if id == TypeId::of::<T>())
    }

    pub fn instance_type_name(&self) -> Option<&'static str> {
        self.0.instance_type.map(|(_, name)| name)
    }

    pub fn call(&self, this: Option<&Instance>, args: &Args) -> Result<Instance> {
        (self.0.body)(this, args)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl PartialEq for FnRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for FnRef {}

impl Hash for FnRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for FnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self.0.kind {
            FnKind::Class => "class",
            FnKind::Function => "function",
        };
        write!(f, "{} {}", keyword, self.0.name)
    }
}

impl fmt::Display for FnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

/// Builder for [`FnRef`]; all metadata is fixed once the body is attached.
pub struct FnBuilder {
    name: String,
    kind: FnKind,
    inject: Vec<Option<Token>>,
    param_types: Option<Vec<Option<FnRef>>>,
}

impl FnBuilder {
    fn new(name: String, kind: FnKind) -> Self {
        Self {
            name,
            kind,
            inject: Vec::new(),
            param_types: None,
        }
    }

    /// Constructor parameter types; `None` marks a position with no usable type.
    pub fn param_types<I>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = Option<FnRef>>,
    {
        self.param_types = Some(types.into_iter().collect());
        self
    }

    /// Inject `token` at parameter `index`, overriding its declared type.
    pub fn inject(mut self, index: usize, token: impl Into<Token>) -> Self {
        if self.inject.len() <= index {
            self.inject.resize(index + 1, None);
        }
        self.inject[index] = Some(token.into());
        self
    }

    /// Replace the whole explicit dependency list.
    pub fn with_inject<I, T>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        self.inject = tokens.into_iter().map(|t| Some(t.into())).collect();
        self
    }

    /// Finish a class whose constructor produces a `T`.
    pub fn construct<T, F>(self, constructor: F) -> FnRef
    where
        T: Any,
        F: Fn(&Args) -> Result<T> + 'static,
    {
        let body: Body = Rc::new(move |_this, args| Ok(Rc::new(constructor(args)?) as Instance));
        self.finish(body, Some((TypeId::of::<T>(), type_name::<T>())))
    }

    /// Finish a function with an untyped body; `this` is the call context.
    pub fn returning<F>(self, body: F) -> FnRef
    where
        F: Fn(Option<&Instance>, &Args) -> Result<Instance> + 'static,
    {
        self.finish(Rc::new(body), None)
    }

    fn finish(self, body: Body, instance_type: Option<(TypeId, &'static str)>) -> FnRef {
        FnRef(Rc::new(FnDef {
            name: self.name,
            kind: self.kind,
            inject: self.inject,
            param_types: self.param_types,
            instance_type,
            body,
        }))
    }
}

/// A function paired with its resolved dependency names; what the host
/// container consumes.
#[derive(Clone)]
pub struct Annotated {
    deps: DependencyList,
    target: FnRef,
}

impl Annotated {
    pub fn new<I>(deps: I, target: FnRef) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        Self {
            deps: deps.into_iter().collect(),
            target,
        }
    }

    /// Every position injected by name.
    pub fn named<I, S>(names: I, target: FnRef) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(|n| Some(n.into())), target)
    }

    pub fn deps(&self) -> &[Option<String>] {
        &self.deps
    }

    pub fn target(&self) -> &FnRef {
        &self.target
    }

    pub fn name(&self) -> &str {
        self.target.name()
    }
}

impl fmt::Debug for Annotated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.deps.iter())
            .entry(&self.target)
            .finish()
    }
}

/// Anything the injector can call: a bare function, the array form
/// `[...tokens, fn]`, or an already resolved annotation.
#[derive(Debug, Clone)]
pub enum Injectable {
    Fn(FnRef),
    Array(Vec<Token>, FnRef),
    Resolved(Annotated),
}

impl From<FnRef> for Injectable {
    fn from(target: FnRef) -> Self {
        Injectable::Fn(target)
    }
}

impl From<&FnRef> for Injectable {
    fn from(target: &FnRef) -> Self {
        Injectable::Fn(target.clone())
    }
}

impl From<Annotated> for Injectable {
    fn from(annotated: Annotated) -> Self {
        Injectable::Resolved(annotated)
    }
}
