//! Decorator declarations
//!
//! The structured descriptors recorded by the decorator vocabulary, and the
//! typed metadata keys they are stored under.

use indexmap::IndexMap;

use crate::callable::{Annotated, FnRef};
use crate::controller::{ControllerCast, PipeCast};
use crate::host::Transclude;
use crate::metadata::MetadataKey;
use crate::provider::Provider;
use crate::util::dash_case_to_camel_case;

pub(crate) const MODULE_ID: MetadataKey<String> = MetadataKey::new("ngModule:id");
pub(crate) const PIPE: MetadataKey<PipeRecord> = MetadataKey::new("ngPipe");
pub(crate) const COMPONENT: MetadataKey<ComponentDecl> = MetadataKey::new("ngComponent");
pub(crate) const DIRECTIVE: MetadataKey<DirectiveDecl> = MetadataKey::new("ngDirective");
pub(crate) const LIFECYCLE: MetadataKey<ControllerCast> = MetadataKey::new("ngLifecycle");
pub(crate) const BINDINGS: MetadataKey<Vec<BindingDecl>> = MetadataKey::new("ngBindings");
pub(crate) const REQUIRES: MetadataKey<IndexMap<String, RequireDecl>> =
    MetadataKey::new("ngRequires");
pub(crate) const HOST_LISTENERS: MetadataKey<Vec<HostListenerDecl>> =
    MetadataKey::new("ngHostListeners");
/// Routines run by the synthesized pre-link, stored on the prototype.
pub(crate) const PRE_LINK: MetadataKey<Vec<Annotated>> = MetadataKey::new("ngPreLink");

/// An entry of a module's `imports`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleImport {
    /// A host module known by name.
    Name(String),
    /// Another decorated module class.
    Module(FnRef),
}

impl From<&str> for ModuleImport {
    fn from(name: &str) -> Self {
        ModuleImport::Name(name.to_string())
    }
}

impl From<String> for ModuleImport {
    fn from(name: String) -> Self {
        ModuleImport::Name(name)
    }
}

impl From<FnRef> for ModuleImport {
    fn from(class: FnRef) -> Self {
        ModuleImport::Module(class)
    }
}

impl From<&FnRef> for ModuleImport {
    fn from(class: &FnRef) -> Self {
        ModuleImport::Module(class.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NgModule {
    pub id: String,
    pub imports: Vec<ModuleImport>,
    pub providers: Vec<Provider>,
    pub declarations: Vec<FnRef>,
}

impl NgModule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn import(mut self, import: impl Into<ModuleImport>) -> Self {
        self.imports.push(import.into());
        self
    }

    pub fn provider(mut self, provider: impl Into<Provider>) -> Self {
        self.providers.push(provider.into());
        self
    }

    pub fn declaration(mut self, class: &FnRef) -> Self {
        self.declarations.push(class.clone());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeDecl {
    pub name: String,
    /// `None` means the default, pure.
    pub pure: Option<bool>,
}

impl PipeDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pure: None,
        }
    }

    pub fn pure(mut self, pure: bool) -> Self {
        self.pure = Some(pure);
        self
    }

    /// Stateful exactly when purity was explicitly turned off.
    pub fn is_stateful(&self) -> bool {
        self.pure == Some(false)
    }
}

#[derive(Clone)]
pub(crate) struct PipeRecord {
    pub decl: PipeDecl,
    pub cast: PipeCast,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveDecl {
    pub selector: String,
}

impl DirectiveDecl {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComponentDecl {
    pub selector: String,
    pub template: Option<String>,
    pub transclude: Option<Transclude>,
    pub controller_as: Option<String>,
}

impl ComponentDecl {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            ..Self::default()
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn transclude(mut self, transclude: Transclude) -> Self {
        self.transclude = Some(transclude);
        self
    }

    pub fn controller_as(mut self, alias: impl Into<String>) -> Self {
        self.controller_as = Some(alias.into());
        self
    }
}

/// Binding kinds and their host symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// `<`
    OneWay,
    /// `@`
    Text,
    /// `&`
    Callback,
    /// `&`, bound under a prefixed name and driven by an [`EventEmitter`](crate::EventEmitter).
    Event,
}

impl BindingKind {
    pub fn symbol(self) -> &'static str {
        match self {
            BindingKind::OneWay => "<",
            BindingKind::Text => "@",
            BindingKind::Callback | BindingKind::Event => "&",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingDecl {
    pub property: String,
    pub public_name: Option<String>,
    pub kind: BindingKind,
}

/// Where a required controller is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequireRelation {
    #[default]
    SameElement,
    /// `^`
    SelfOrAncestor,
    /// `^^`
    Ancestor,
}

impl RequireRelation {
    pub fn prefix(self) -> &'static str {
        match self {
            RequireRelation::SameElement => "",
            RequireRelation::SelfOrAncestor => "^",
            RequireRelation::Ancestor => "^^",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireDecl {
    pub property: String,
    pub relation: RequireRelation,
    pub optional: bool,
    /// Explicit controller name; defaults to the property name.
    pub name: Option<String>,
}

impl RequireDecl {
    /// Parse a require string such as `^^?parentCtrl` for `property`.
    /// Only the prefix may be given, in which case the property name is used.
    pub fn parse(property: &str, spec: Option<&str>) -> Self {
        let mut rest = spec.unwrap_or("").trim();
        let mut relation = RequireRelation::SameElement;
        let mut optional = false;

        loop {
            if let Some(stripped) = rest.strip_prefix("^^") {
                relation = RequireRelation::Ancestor;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix('^') {
                relation = RequireRelation::SelfOrAncestor;
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix('?') {
                optional = true;
                rest = stripped;
            } else {
                break;
            }
        }

        Self {
            property: property.to_string(),
            relation,
            optional,
            name: (!rest.is_empty()).then(|| rest.to_string()),
        }
    }

    pub fn target_name(&self) -> String {
        dash_case_to_camel_case(self.name.as_deref().unwrap_or(&self.property))
    }

    /// The host require string: relation prefix, optional marker, name.
    pub fn to_require_string(&self) -> String {
        format!(
            "{}{}{}",
            self.relation.prefix(),
            if self.optional { "?" } else { "" },
            self.target_name()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostListenerDecl {
    pub event: String,
    pub args: Vec<String>,
    pub method: String,
}
