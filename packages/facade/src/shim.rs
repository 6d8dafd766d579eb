//! Runtime Shim
//!
//! Wrappers around a host injector and host module that accept class
//! references wherever the host expects a string token. Tokens are resolved
//! through the shared [`TokenRegistry`](crate::token::TokenRegistry) and the
//! call is delegated unchanged.

use std::any::{type_name, Any};
use std::rc::Rc;

use crate::callable::{Annotated, Injectable, Instance};
use crate::di::DependencyExtractor;
use crate::error::{FacadeError, Result};
use crate::host::{HostInjector, HostModule, Locals};
use crate::token::Token;

#[derive(Clone)]
pub struct TypedInjector {
    inner: Rc<dyn HostInjector>,
    extractor: DependencyExtractor,
}

impl TypedInjector {
    pub fn new(inner: Rc<dyn HostInjector>, extractor: DependencyExtractor) -> Self {
        Self { inner, extractor }
    }

    pub fn inner(&self) -> &Rc<dyn HostInjector> {
        &self.inner
    }

    pub fn get(&self, token: impl Into<Token>) -> Result<Instance> {
        let name = self.extractor.tokens().resolve(&token.into());
        self.inner.get(&name)
    }

    pub fn get_as<T: Any>(&self, token: impl Into<Token>) -> Result<Rc<T>> {
        let token = token.into();
        self.get(&token)?
            .downcast::<T>()
            .map_err(|_| FacadeError::InstanceType {
                token: token.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Class references that never took part in injection report `false`
    /// instead of acquiring a token.
    pub fn has(&self, token: impl Into<Token>) -> bool {
        self.extractor
            .tokens()
            .resolve_if_marked(&token.into())
            .is_some_and(|name| self.inner.has(&name))
    }

    pub fn instantiate(&self, constructor: impl Into<Injectable>, locals: &Locals) -> Result<Instance> {
        let constructor = self.extractor.annotate(constructor);
        self.inner.instantiate(&constructor, locals)
    }

    pub fn instantiate_as<T: Any>(
        &self,
        constructor: impl Into<Injectable>,
        locals: &Locals,
    ) -> Result<Rc<T>> {
        let constructor = self.extractor.annotate(constructor);
        self.inner
            .instantiate(&constructor, locals)?
            .downcast::<T>()
            .map_err(|_| FacadeError::InstanceType {
                token: constructor.name().to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn invoke(
        &self,
        function: impl Into<Injectable>,
        this: Option<&Instance>,
        locals: &Locals,
    ) -> Result<Instance> {
        let function = self.extractor.annotate(function);
        self.inner.invoke(&function, this, locals)
    }
}

impl HostInjector for TypedInjector {
    fn get(&self, name: &str) -> Result<Instance> {
        self.inner.get(name)
    }

    fn has(&self, name: &str) -> bool {
        self.inner.has(name)
    }

    fn instantiate(&self, constructor: &Annotated, locals: &Locals) -> Result<Instance> {
        self.inner.instantiate(constructor, locals)
    }

    fn invoke(
        &self,
        function: &Annotated,
        this: Option<&Instance>,
        locals: &Locals,
    ) -> Result<Instance> {
        self.inner.invoke(function, this, locals)
    }
}

/// `$provide`-style registration accepting class tokens.
#[derive(Clone)]
pub struct TypedModule {
    inner: Rc<dyn HostModule>,
    extractor: DependencyExtractor,
}

impl TypedModule {
    pub fn new(inner: Rc<dyn HostModule>, extractor: DependencyExtractor) -> Self {
        Self { inner, extractor }
    }

    pub fn inner(&self) -> &Rc<dyn HostModule> {
        &self.inner
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    fn token(&self, token: impl Into<Token>) -> String {
        match token.into() {
            Token::Name(name) => name,
            Token::Ref(class) => self.extractor.tokens().mark(&class),
        }
    }

    pub fn constant(&self, token: impl Into<Token>, value: Instance) -> &Self {
        self.inner.constant(&self.token(token), value);
        self
    }

    pub fn value(&self, token: impl Into<Token>, value: Instance) -> &Self {
        self.inner.value(&self.token(token), value);
        self
    }

    pub fn factory(&self, token: impl Into<Token>, factory: impl Into<Injectable>) -> &Self {
        self.inner
            .factory(&self.token(token), self.extractor.annotate(factory));
        self
    }

    pub fn service(&self, token: impl Into<Token>, constructor: impl Into<Injectable>) -> &Self {
        self.inner
            .service(&self.token(token), self.extractor.annotate(constructor));
        self
    }

    pub fn provider(&self, token: impl Into<Token>, constructor: impl Into<Injectable>) -> &Self {
        self.inner
            .provider(&self.token(token), self.extractor.annotate(constructor));
        self
    }

    pub fn decorator(&self, token: impl Into<Token>, decorator: impl Into<Injectable>) -> &Self {
        self.inner
            .decorator(&self.token(token), self.extractor.annotate(decorator));
        self
    }

    pub fn directive(&self, name: &str, factory: impl Into<Injectable>) -> &Self {
        self.inner.directive(name, self.extractor.annotate(factory));
        self
    }

    pub fn filter(&self, name: &str, factory: impl Into<Injectable>) -> &Self {
        self.inner.filter(name, self.extractor.annotate(factory));
        self
    }

    pub fn run(&self, block: impl Into<Injectable>) -> &Self {
        self.inner.run(self.extractor.annotate(block));
        self
    }

    pub fn constants<I, K>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (K, Instance)>,
        K: Into<Token>,
    {
        for (token, value) in entries {
            self.constant(token, value);
        }
        self
    }

    pub fn values<I, K>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (K, Instance)>,
        K: Into<Token>,
    {
        for (token, value) in entries {
            self.value(token, value);
        }
        self
    }

    pub fn factories<I, K, F>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (K, F)>,
        K: Into<Token>,
        F: Into<Injectable>,
    {
        for (token, factory) in entries {
            self.factory(token, factory);
        }
        self
    }

    pub fn services<I, K, F>(&self, entries: I) -> &Self
    where
        I: IntoIterator<Item = (K, F)>,
        K: Into<Token>,
        F: Into<Injectable>,
    {
        for (token, constructor) in entries {
            self.service(token, constructor);
        }
        self
    }
}
