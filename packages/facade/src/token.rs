//! Identity Resolver
//!
//! Maps identifiers (string tokens or class references) to the canonical
//! string token the host container indexes on. Class references receive a
//! synthetic `<Name>_<n>` token the first time they are resolved; the token
//! is memoized against the reference for the lifetime of the registry.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::trace;

use crate::callable::FnRef;

/// An identifier accepted anywhere the host expects a name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Name(String),
    Ref(FnRef),
}

impl Token {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Token::Name(name) => Some(name),
            Token::Ref(_) => None,
        }
    }

    pub fn as_fn(&self) -> Option<&FnRef> {
        match self {
            Token::Name(_) => None,
            Token::Ref(target) => Some(target),
        }
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Token::Name(name.to_string())
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Name(name)
    }
}

impl From<&String> for Token {
    fn from(name: &String) -> Self {
        Token::Name(name.clone())
    }
}

impl From<FnRef> for Token {
    fn from(target: FnRef) -> Self {
        Token::Ref(target)
    }
}

impl From<&FnRef> for Token {
    fn from(target: &FnRef) -> Self {
        Token::Ref(target.clone())
    }
}

impl From<&Token> for Token {
    fn from(token: &Token) -> Self {
        token.clone()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => write!(f, "{:?}", name),
            Token::Ref(target) => write!(f, "{:?}", target),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(name) => f.write_str(name),
            Token::Ref(target) => f.write_str(target.name()),
        }
    }
}

/// Memoized class-reference tokens.
///
/// One registry per translation engine; single-threaded by construction.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    names: RefCell<HashMap<FnRef, String>>,
    marked: RefCell<HashSet<FnRef>>,
    sequence: Cell<usize>,
    raw_names: bool,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Testing mode: class references resolve to their bare names.
    pub fn with_raw_names(raw_names: bool) -> Self {
        Self {
            raw_names,
            ..Self::default()
        }
    }

    pub fn uses_raw_names(&self) -> bool {
        self.raw_names
    }

    pub fn resolve(&self, identifier: &Token) -> String {
        match identifier {
            Token::Name(name) => name.clone(),
            Token::Ref(target) => self.resolve_fn(target),
        }
    }

    pub fn resolve_fn(&self, target: &FnRef) -> String {
        if let Some(name) = self.names.borrow().get(target) {
            return name.clone();
        }

        let name = if self.raw_names {
            target.name().to_string()
        } else {
            let sequence = self.sequence.get();
            self.sequence.set(sequence + 1);
            format!("{}_{}", target.name(), sequence)
        };
        trace!(class = target.name(), token = %name, "assigned class token");

        self.names.borrow_mut().insert(target.clone(), name.clone());
        name
    }

    /// Mark `target` as taking part in injection and return its token.
    pub fn mark(&self, target: &FnRef) -> String {
        self.marked.borrow_mut().insert(target.clone());
        self.resolve_fn(target)
    }

    pub fn is_marked(&self, target: &FnRef) -> bool {
        self.marked.borrow().contains(target)
    }

    /// Like [`resolve`](Self::resolve), but unknown class references stay
    /// unknown instead of acquiring a token.
    pub fn resolve_if_marked(&self, identifier: &Token) -> Option<String> {
        match identifier {
            Token::Name(name) => Some(name.clone()),
            Token::Ref(target) if self.is_marked(target) => Some(self.resolve_fn(target)),
            Token::Ref(_) => None,
        }
    }
}
