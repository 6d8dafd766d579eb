#![deny(clippy::all)]

/**
 * Angular Facade - Rust Implementation
 *
 * Angular-style decorator metadata translated into the by-name registrations
 * of an AngularJS-style injector
 */

// Core modules
pub mod callable;
pub mod config;
pub mod error;
pub mod metadata;
pub mod token;
mod util;

// Translation engine
pub mod declaration;
pub mod decorators;
pub mod di;
pub mod facade;
pub mod provider;
pub mod shim;

// Runtime contracts
pub mod controller;
pub mod emitter;
pub mod host;

// Re-exports
pub use callable::{unit, Annotated, Args, FnRef, Injectable, Instance};
pub use config::{FacadeConfig, UnmarkedProviderPolicy};
pub use controller::{Changes, Controller, PipeTransform, SimpleChange};
pub use decorators::{ComponentDecl, DirectiveDecl, ModuleImport, NgModule, PipeDecl};
pub use emitter::EventEmitter;
pub use error::{FacadeError, HostError, Result};
pub use facade::Facade;
pub use provider::Provider;
pub use shim::{TypedInjector, TypedModule};
pub use token::{Token, TokenRegistry};

/// Crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
