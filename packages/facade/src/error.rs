//! Error Types
//!
//! Declaration-time, usage-order and host errors raised while translating
//! decorator metadata into host registrations.

use thiserror::Error;

/// Errors produced by the host container itself.
///
/// These pass through the translation layer untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Unknown provider: {0}Provider <- {0}")]
    UnknownProvider(String),

    #[error("Circular dependency found: {0}")]
    CircularDependency(String),

    #[error("Module '{0}' is not available")]
    ModuleUnavailable(String),

    #[error("Provider '{0}' must produce a $get factory")]
    InvalidProvider(String),

    #[error("Controller '{name}', required by directive '{directive}', can't be found")]
    MissingController { name: String, directive: String },

    #[error("Syntax error in expression '{expression}': {reason}")]
    Expression { expression: String, reason: String },

    #[error("Cannot assign to '{0}' from this expression context")]
    NonAssignable(String),

    #[error("{0} already in progress")]
    PhaseInProgress(&'static str),

    #[error("'{name}' resolved to a {found}, expected a {expected}")]
    UnexpectedInstance {
        name: String,
        found: &'static str,
        expected: &'static str,
    },
}

/// Errors raised by the translation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FacadeError {
    #[error("Unknown declaration: {0}")]
    UnknownDeclaration(String),

    #[error("Unknown module import: {0} is not an @NgModule class")]
    UnknownModule(String),

    #[error("Directive inputs unsupported: {class}.{property} (directives have no isolated scope)")]
    UnsupportedDirectiveBinding { class: String, property: String },

    #[error("Directive requirements unsupported: {class}.{property} (directives have no isolated scope)")]
    UnsupportedDirectiveRequire { class: String, property: String },

    #[error("Factory {factory} for '{token}' declares an explicit dependency list and deps; use only one")]
    ConflictingDependencies { token: String, factory: String },

    #[error("{class}.{property} type must be EventEmitter")]
    OutputType { class: String, property: String },

    #[error("{class} does not construct a {expected}")]
    ControllerType { class: String, expected: &'static str },

    #[error("Provider {0} is not marked @Injectable")]
    NotInjectable(String),

    #[error("Uninitialized EventEmitter")]
    UninitializedEmitter,

    #[error("{callee}: missing argument #{index}")]
    MissingArgument { callee: String, index: usize },

    #[error("{callee}: argument #{index} is not a {expected}")]
    ArgumentType {
        callee: String,
        index: usize,
        expected: &'static str,
    },

    #[error("{0} requires a `this` context")]
    MissingContext(String),

    #[error("{token} does not resolve to a {expected}")]
    InstanceType { token: String, expected: &'static str },

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T, E = FacadeError> = std::result::Result<T, E>;
