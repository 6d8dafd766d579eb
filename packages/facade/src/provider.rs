//! Provider Resolver
//!
//! Turns provider declarations into host registration calls. Every shape is
//! validated before anything is registered, so a bad declaration fails module
//! decoration rather than first use.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::callable::{Annotated, FnRef, Instance};
use crate::config::UnmarkedProviderPolicy;
use crate::decorators::{PipeRecord, PIPE};
use crate::di::DependencyExtractor;
use crate::error::{FacadeError, Result};
use crate::host::{FilterFn, HostModule, InjectorRef};
use crate::metadata::{MetadataStore, Target};
use crate::token::Token;

/// A provider declaration.
#[derive(Clone)]
pub enum Provider {
    /// The class is both token and implementation.
    Type(FnRef),
    Value {
        provide: Token,
        use_value: Instance,
    },
    Class {
        provide: Token,
        use_class: FnRef,
    },
    Existing {
        provide: Token,
        use_existing: Token,
    },
    Factory {
        provide: Token,
        use_factory: FnRef,
        deps: Option<Vec<Token>>,
    },
}

impl Provider {
    pub fn value(provide: impl Into<Token>, use_value: Instance) -> Self {
        Provider::Value {
            provide: provide.into(),
            use_value,
        }
    }

    pub fn class(provide: impl Into<Token>, use_class: &FnRef) -> Self {
        Provider::Class {
            provide: provide.into(),
            use_class: use_class.clone(),
        }
    }

    pub fn existing(provide: impl Into<Token>, use_existing: impl Into<Token>) -> Self {
        Provider::Existing {
            provide: provide.into(),
            use_existing: use_existing.into(),
        }
    }

    pub fn factory(provide: impl Into<Token>, use_factory: &FnRef) -> Self {
        Provider::Factory {
            provide: provide.into(),
            use_factory: use_factory.clone(),
            deps: None,
        }
    }

    /// A factory with an explicit dependency list.
    pub fn factory_with_deps<I, T>(provide: impl Into<Token>, use_factory: &FnRef, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        Provider::Factory {
            provide: provide.into(),
            use_factory: use_factory.clone(),
            deps: Some(deps.into_iter().map(Into::into).collect()),
        }
    }

    pub fn provide(&self) -> Token {
        match self {
            Provider::Type(class) => Token::Ref(class.clone()),
            Provider::Value { provide, .. }
            | Provider::Class { provide, .. }
            | Provider::Existing { provide, .. }
            | Provider::Factory { provide, .. } => provide.clone(),
        }
    }
}

impl From<FnRef> for Provider {
    fn from(class: FnRef) -> Self {
        Provider::Type(class)
    }
}

impl From<&FnRef> for Provider {
    fn from(class: &FnRef) -> Self {
        Provider::Type(class.clone())
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Type(class) => write!(f, "{:?}", class),
            Provider::Value { provide, .. } => write!(f, "{{ provide: {:?}, useValue }}", provide),
            Provider::Class { provide, use_class } => {
                write!(f, "{{ provide: {:?}, useClass: {:?} }}", provide, use_class)
            }
            Provider::Existing {
                provide,
                use_existing,
            } => write!(f, "{{ provide: {:?}, useExisting: {:?} }}", provide, use_existing),
            Provider::Factory {
                provide,
                use_factory,
                deps,
            } => write!(
                f,
                "{{ provide: {:?}, useFactory: {:?}, deps: {:?} }}",
                provide, use_factory, deps
            ),
        }
    }
}

pub struct ProviderResolver<'a> {
    extractor: &'a DependencyExtractor,
    metadata: &'a MetadataStore,
    policy: UnmarkedProviderPolicy,
}

impl<'a> ProviderResolver<'a> {
    pub fn new(
        extractor: &'a DependencyExtractor,
        metadata: &'a MetadataStore,
        policy: UnmarkedProviderPolicy,
    ) -> Self {
        Self {
            extractor,
            metadata,
            policy,
        }
    }

    fn pipe(&self, class: &FnRef) -> Option<&'a PipeRecord> {
        self.metadata.get(PIPE, &Target::Class(class.clone()))
    }

    /// Eager checks; nothing is registered.
    pub fn validate(&self, provider: &Provider) -> Result<()> {
        match provider {
            Provider::Type(class) if self.pipe(class).is_none() => {
                let marked = self.extractor.tokens().is_marked(class);
                if !marked && self.policy == UnmarkedProviderPolicy::Reject {
                    return Err(FacadeError::NotInjectable(class.name().to_string()));
                }
                Ok(())
            }
            Provider::Factory {
                provide,
                use_factory,
                deps: Some(_),
            } if use_factory.has_explicit_inject() => Err(FacadeError::ConflictingDependencies {
                token: self.extractor.tokens().resolve(provide),
                factory: use_factory.name().to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn register(&self, module: &dyn HostModule, provider: &Provider) -> Result<()> {
        self.validate(provider)?;
        let tokens = self.extractor.tokens();

        match provider {
            Provider::Type(class) => match self.pipe(class) {
                Some(record) => self.register_pipe(module, class, record),
                None => {
                    let constructor = if tokens.is_marked(class) {
                        self.extractor.extract(class)
                    } else {
                        warn!(class = class.name(), "registering unmarked class provider");
                        self.extractor.extract_explicit(class)
                    };
                    // Registration counts as marking for `has` lookups.
                    let name = tokens.mark(class);
                    debug!(module = module.name(), token = %name, "service");
                    module.service(&name, constructor);
                }
            },
            Provider::Existing {
                provide,
                use_existing,
            } => {
                let name = self.provide_token(provide);
                let existing = tokens.resolve(use_existing);
                debug!(module = module.name(), token = %name, existing = %existing, "alias");
                let passthrough =
                    FnRef::function(format!("{}Alias", name)).returning(|_, args| args.instance(0));
                module.factory(&name, Annotated::named([existing], passthrough));
            }
            Provider::Factory {
                provide,
                use_factory,
                deps,
            } => {
                let name = self.provide_token(provide);
                let factory = match deps {
                    Some(deps) => self.extractor.extract_array_form(deps, use_factory),
                    None => self.extractor.extract(use_factory),
                };
                debug!(module = module.name(), token = %name, "factory");
                module.factory(&name, factory);
            }
            Provider::Class { provide, use_class } => {
                let name = self.provide_token(provide);
                debug!(module = module.name(), token = %name, class = use_class.name(), "class substitution");
                module.service(&name, self.extractor.extract(use_class));
            }
            Provider::Value { provide, use_value } => {
                let name = self.provide_token(provide);
                debug!(module = module.name(), token = %name, "value");
                module.factory(
                    &name,
                    Annotated::new([], FnRef::value_fn(name.clone(), Rc::clone(use_value))),
                );
            }
        }
        Ok(())
    }

    /// Class tokens used as `provide` take part in injection from here on.
    fn provide_token(&self, provide: &Token) -> String {
        match provide {
            Token::Name(name) => name.clone(),
            Token::Ref(class) => self.extractor.tokens().mark(class),
        }
    }

    fn register_pipe(&self, module: &dyn HostModule, class: &FnRef, record: &PipeRecord) {
        let name = self.extractor.tokens().mark(class);
        let constructor = self.extractor.extract(class);
        debug!(module = module.name(), token = %name, pipe = %record.decl.name, "pipe");
        module.service(&name, constructor.clone());

        let stateful = record.decl.is_stateful();
        let cast = record.cast;
        let filter = FnRef::function(format!("{}Filter", record.decl.name)).returning(
            move |_, args| {
                let injector = args.get::<InjectorRef>(0)?;
                let pipe = injector.instantiate(&constructor, &Default::default())?;
                if cast(&pipe).is_none() {
                    return Err(FacadeError::InstanceType {
                        token: constructor.name().to_string(),
                        expected: "PipeTransform",
                    });
                }
                let transform = move |value: &Value, rest: &[Value]| match cast(&pipe) {
                    Some(pipe) => pipe.transform(value, rest),
                    None => Value::Null,
                };
                Ok(Rc::new(FilterFn {
                    stateful,
                    transform: Rc::new(transform),
                }) as Instance)
            },
        );
        module.filter(&record.decl.name, Annotated::named(["$injector"], filter));
    }
}
