//! Dependency Extractor
//!
//! Produces the ordered list of canonical tokens a function is called with.
//! Explicit per-parameter tokens win over declared parameter types; positions
//! with neither stay empty and are not injected.

use std::rc::Rc;

use crate::callable::{Annotated, DependencyList, FnRef, Injectable};
use crate::token::{Token, TokenRegistry};

#[derive(Debug, Clone)]
pub struct DependencyExtractor {
    tokens: Rc<TokenRegistry>,
}

impl DependencyExtractor {
    pub fn new(tokens: Rc<TokenRegistry>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    pub fn extract(&self, target: &FnRef) -> Annotated {
        let explicit = target.explicit_inject();
        let declared = target.param_types().unwrap_or(&[]);
        let arity = explicit.len().max(declared.len());

        let deps: DependencyList = (0..arity)
            .map(|index| {
                match explicit.get(index).and_then(Option::as_ref) {
                    Some(token) => Some(self.tokens.resolve(token)),
                    None => declared
                        .get(index)
                        .and_then(Option::as_ref)
                        .map(|ty| self.tokens.resolve_fn(ty)),
                }
            })
            .collect();

        Annotated::new(deps, target.clone())
    }

    /// Only the explicit dependency list; declared parameter types are ignored.
    pub fn extract_explicit(&self, target: &FnRef) -> Annotated {
        let deps = target
            .explicit_inject()
            .iter()
            .map(|token| token.as_ref().map(|t| self.tokens.resolve(t)));
        Annotated::new(deps, target.clone())
    }

    /// `[...tokens, fn]`: every token resolved, string tokens untouched.
    pub fn extract_array_form(&self, tokens: &[Token], target: &FnRef) -> Annotated {
        let deps = tokens.iter().map(|token| Some(self.tokens.resolve(token)));
        Annotated::new(deps, target.clone())
    }

    pub fn annotate(&self, injectable: impl Into<Injectable>) -> Annotated {
        match injectable.into() {
            Injectable::Fn(target) => self.extract(&target),
            Injectable::Array(tokens, target) => self.extract_array_form(&tokens, &target),
            Injectable::Resolved(annotated) => annotated,
        }
    }
}
