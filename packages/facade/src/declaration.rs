//! Declaration Synthesizer
//!
//! Builds host directive definitions for component and directive classes
//! from their recorded metadata: selector, bindings, requirements, and the
//! pre-link routine wiring host listeners and outputs.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::callable::{Annotated, FnRef, Instance};
use crate::controller::ControllerCast;
use crate::decorators::{
    BindingKind, ComponentDecl, DirectiveDecl, HostListenerDecl, BINDINGS, COMPONENT, DIRECTIVE,
    HOST_LISTENERS, LIFECYCLE, PRE_LINK, REQUIRES,
};
use crate::di::DependencyExtractor;
use crate::error::{FacadeError, Result};
use crate::host::{
    Attributes, CompileFn, DirectiveDefinition, ElementRef, HostModule, InjectorRef, LinkContext,
    LinkFns, Locals, PreLinkFn, Restrict,
};
use crate::metadata::{MetadataStore, Target};
use crate::util::dash_case_to_camel_case;

/// Require-map key under which a controller finds itself.
pub const COMPONENT_SELF_BINDING: &str = "$$self";

/// Prefix of the internal callback binding behind an output property.
pub const OUTPUT_BOUND_CALLBACK_PREFIX: &str = "__event_";

/// A parsed selector: registration name and matching restriction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub name: String,
    pub restrict: Restrict,
}

impl Selector {
    /// `[my-dir]` matches attributes, `.my-dir` classes, anything else elements.
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        let (name, restrict) = if let Some(inner) = selector
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
        {
            (inner, Restrict::ATTRIBUTE)
        } else if let Some(inner) = selector.strip_prefix('.') {
            (inner, Restrict::CLASS)
        } else {
            (selector, Restrict::ELEMENT)
        };

        Self {
            name: dash_case_to_camel_case(name),
            restrict,
        }
    }
}

pub struct DeclarationSynthesizer<'a> {
    extractor: &'a DependencyExtractor,
    metadata: &'a MetadataStore,
    controller_as: &'a str,
}

impl<'a> DeclarationSynthesizer<'a> {
    pub fn new(
        extractor: &'a DependencyExtractor,
        metadata: &'a MetadataStore,
        controller_as: &'a str,
    ) -> Self {
        Self {
            extractor,
            metadata,
            controller_as,
        }
    }

    /// Eager checks; nothing is registered.
    pub fn validate(&self, class: &FnRef) -> Result<()> {
        let target = Target::Class(class.clone());
        if self.metadata.has(COMPONENT, &target) {
            return Ok(());
        }
        if !self.metadata.has(DIRECTIVE, &target) {
            return Err(FacadeError::UnknownDeclaration(class.name().to_string()));
        }

        if let Some(binding) = self.metadata.get(BINDINGS, &target).and_then(|b| b.first()) {
            return Err(FacadeError::UnsupportedDirectiveBinding {
                class: class.name().to_string(),
                property: binding.property.clone(),
            });
        }
        if let Some(property) = self
            .metadata
            .get(REQUIRES, &target)
            .and_then(|r| r.keys().next())
        {
            return Err(FacadeError::UnsupportedDirectiveRequire {
                class: class.name().to_string(),
                property: property.clone(),
            });
        }
        Ok(())
    }

    pub fn register_declaration(&self, module: &dyn HostModule, class: &FnRef) -> Result<()> {
        self.validate(class)?;
        let target = Target::Class(class.clone());
        match (
            self.metadata.get(COMPONENT, &target),
            self.metadata.get(DIRECTIVE, &target),
        ) {
            (Some(decl), _) => self.register_component(module, class, decl),
            (None, Some(decl)) => self.register_directive(module, class, decl),
            (None, None) => Err(FacadeError::UnknownDeclaration(class.name().to_string())),
        }
    }

    pub fn register_component(
        &self,
        module: &dyn HostModule,
        class: &FnRef,
        decl: &ComponentDecl,
    ) -> Result<()> {
        let selector = Selector::parse(&decl.selector);

        let mut definition = DirectiveDefinition::new(selector.restrict);
        definition.controller = Some(self.extractor.extract(class));
        definition.controller_as = Some(
            decl.controller_as
                .clone()
                .unwrap_or_else(|| self.controller_as.to_string()),
        );
        definition.template = decl.template.clone();
        definition.transclude = decl.transclude.clone();
        definition.isolate_scope = true;
        definition.bind_to_controller = self.binding_map(class);
        definition.require = self.require_map(class, &selector.name);
        definition.lifecycle = self.lifecycle(class);

        debug!(
            module = module.name(),
            component = %selector.name,
            bindings = definition.bind_to_controller.len(),
            listeners = ?self.listener_events(class),
            "component"
        );
        self.register(module, class, &selector.name, definition);
        Ok(())
    }

    pub fn register_directive(
        &self,
        module: &dyn HostModule,
        class: &FnRef,
        decl: &DirectiveDecl,
    ) -> Result<()> {
        self.validate(class)?;
        let selector = Selector::parse(&decl.selector);

        let mut definition = DirectiveDefinition::new(selector.restrict);
        definition.controller = Some(self.extractor.extract(class));
        definition.require.insert(
            COMPONENT_SELF_BINDING.to_string(),
            selector.name.clone(),
        );
        definition.lifecycle = self.lifecycle(class);

        debug!(
            module = module.name(),
            directive = %selector.name,
            restrict = %selector.restrict.to_host_string(),
            listeners = ?self.listener_events(class),
            "directive"
        );
        self.register(module, class, &selector.name, definition);
        Ok(())
    }

    /// Host listeners recorded for `class`, in declaration order.
    pub fn host_listeners(&self, class: &FnRef) -> &'a [HostListenerDecl] {
        self.metadata
            .get(HOST_LISTENERS, &Target::Class(class.clone()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn listener_events(&self, class: &FnRef) -> Vec<String> {
        self.host_listeners(class)
            .iter()
            .map(|listener| format!("{}:{}", listener.event, listener.method))
            .collect()
    }

    /// Property to `<symbol>?<public name>`; outputs bind under a prefixed name.
    pub fn binding_map(&self, class: &FnRef) -> IndexMap<String, String> {
        let target = Target::Class(class.clone());
        self.metadata
            .get(BINDINGS, &target)
            .into_iter()
            .flatten()
            .map(|binding| {
                let (key, public_name) = match binding.kind {
                    BindingKind::Event => (
                        format!("{}{}", OUTPUT_BOUND_CALLBACK_PREFIX, binding.property),
                        Some(
                            binding
                                .public_name
                                .clone()
                                .unwrap_or_else(|| binding.property.clone()),
                        ),
                    ),
                    _ => (binding.property.clone(), binding.public_name.clone()),
                };
                let value = format!(
                    "{}?{}",
                    binding.kind.symbol(),
                    public_name.unwrap_or_default()
                );
                (key, value)
            })
            .collect()
    }

    pub fn require_map(&self, class: &FnRef, self_name: &str) -> IndexMap<String, String> {
        let mut require = IndexMap::new();
        require.insert(COMPONENT_SELF_BINDING.to_string(), self_name.to_string());

        let target = Target::Class(class.clone());
        for (property, decl) in self.metadata.get(REQUIRES, &target).into_iter().flatten() {
            require.insert(property.clone(), decl.to_require_string());
        }
        require
    }

    fn lifecycle(&self, class: &FnRef) -> Option<ControllerCast> {
        self.metadata
            .get(LIFECYCLE, &Target::Class(class.clone()))
            .copied()
    }

    fn register(
        &self,
        module: &dyn HostModule,
        class: &FnRef,
        name: &str,
        definition: DirectiveDefinition,
    ) {
        let pre_link: Vec<Annotated> = self
            .metadata
            .get(PRE_LINK, &Target::Prototype(class.clone()))
            .cloned()
            .unwrap_or_default();

        let factory = FnRef::function(format!("{}Directive", name)).returning(move |_, args| {
            let mut definition = definition.clone();
            if !pre_link.is_empty() {
                let injector = args.get::<InjectorRef>(0)?;
                definition.compile = Some(compile_fn(injector, pre_link.clone()));
            }
            Ok(Rc::new(definition) as Instance)
        });
        module.directive(name, Annotated::named(["$injector"], factory));
    }
}

/// A compile function whose pre-link invokes every recorded routine with the
/// controller as `this`.
fn compile_fn(injector: Rc<InjectorRef>, routines: Vec<Annotated>) -> CompileFn {
    let pre: PreLinkFn = Rc::new(move |context: &LinkContext| {
        let this = context
            .controllers
            .get(COMPONENT_SELF_BINDING)
            .cloned()
            .flatten();

        let mut locals = Locals::new();
        locals.insert("$scope".into(), Rc::clone(&context.scope) as Instance);
        locals.insert("$element".into(), Rc::clone(&context.element) as Instance);
        locals.insert("$attrs".into(), Rc::clone(&context.attrs) as Instance);
        locals.insert("$bindings".into(), Rc::clone(&context.bindings) as Instance);

        for routine in &routines {
            injector.invoke(routine, this.as_ref(), &locals)?;
        }
        Ok(())
    });

    Rc::new(move |_element: &ElementRef, _attrs: &Attributes| {
        Ok(LinkFns {
            pre: Some(Rc::clone(&pre)),
        })
    })
}
