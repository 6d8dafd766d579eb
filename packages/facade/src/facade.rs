//! Translation engine
//!
//! [`Facade`] owns the token registry and the metadata store for one
//! application, exposes the decorator vocabulary as explicit calls, and
//! drives provider and declaration registration when a module is decorated.

use std::any::{type_name, Any};
use std::rc::Rc;

use serde_json::Value;
use tracing::debug;

use crate::callable::{unit, Annotated, FnRef, Instance};
use crate::config::FacadeConfig;
use crate::controller::{cast_controller, cast_pipe, Controller, ControllerCast, PipeTransform};
use crate::declaration::{DeclarationSynthesizer, OUTPUT_BOUND_CALLBACK_PREFIX};
use crate::decorators::{
    BindingDecl, BindingKind, ComponentDecl, DirectiveDecl, HostListenerDecl, ModuleImport,
    NgModule, PipeDecl, PipeRecord, RequireDecl, BINDINGS, COMPONENT, DIRECTIVE,
    HOST_LISTENERS, LIFECYCLE, MODULE_ID, PIPE, PRE_LINK, REQUIRES,
};
use crate::di::DependencyExtractor;
use crate::emitter::EventEmitter;
use crate::error::{FacadeError, Result};
use crate::host::{
    Bindings, ElementRef, ExprLocals, HostInjector, HostModule, HostRuntime, ParserRef, ScopeRef,
};
use crate::metadata::{MetadataStore, Target};
use crate::provider::ProviderResolver;
use crate::shim::{TypedInjector, TypedModule};
use crate::token::{Token, TokenRegistry};

pub struct Facade {
    config: FacadeConfig,
    tokens: Rc<TokenRegistry>,
    extractor: DependencyExtractor,
    metadata: MetadataStore,
}

impl Default for Facade {
    fn default() -> Self {
        Self::with_config(FacadeConfig::default())
    }
}

impl Facade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults plus the `FACADE_RAW_NAMES` switch.
    pub fn from_env() -> Self {
        Self::with_config(FacadeConfig::from_env())
    }

    pub fn with_config(config: FacadeConfig) -> Self {
        let tokens = Rc::new(TokenRegistry::with_raw_names(config.raw_names));
        Self {
            extractor: DependencyExtractor::new(Rc::clone(&tokens)),
            tokens,
            metadata: MetadataStore::new(),
            config,
        }
    }

    pub fn config(&self) -> &FacadeConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Rc<TokenRegistry> {
        &self.tokens
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn extractor(&self) -> &DependencyExtractor {
        &self.extractor
    }

    pub fn resolve(&self, identifier: impl Into<Token>) -> String {
        self.tokens.resolve(&identifier.into())
    }

    /// Wrap a host injector so it accepts class tokens.
    pub fn injector(&self, host: Rc<dyn HostInjector>) -> TypedInjector {
        TypedInjector::new(host, self.extractor.clone())
    }

    pub fn module_handle(&self, module: Rc<dyn HostModule>) -> TypedModule {
        TypedModule::new(module, self.extractor.clone())
    }

    /// The id recorded by [`ng_module`](Self::ng_module) for `class`.
    pub fn module_id(&self, class: &FnRef) -> Option<&str> {
        self.metadata
            .get(MODULE_ID, &Target::Class(class.clone()))
            .map(String::as_str)
    }

    /// Host listeners recorded on `class` through [`host_listener`](Self::host_listener).
    pub fn host_listeners(&self, class: &FnRef) -> &[HostListenerDecl] {
        DeclarationSynthesizer::new(&self.extractor, &self.metadata, &self.config.controller_as)
            .host_listeners(class)
    }

    /// `@Injectable()`: returns the class token.
    pub fn injectable(&self, class: &FnRef) -> String {
        self.tokens.mark(class)
    }

    /// `@Pipe(...)`; the class must construct a `P`.
    pub fn pipe<P: PipeTransform>(&mut self, class: &FnRef, decl: PipeDecl) -> Result<()> {
        ensure_constructs::<P>(class, "PipeTransform")?;
        self.tokens.mark(class);
        self.metadata.set(
            PIPE,
            PipeRecord {
                decl,
                cast: cast_pipe::<P>,
            },
            &Target::Class(class.clone()),
        );
        Ok(())
    }

    /// `@Input()`: a one-way `<` binding.
    pub fn input(&mut self, class: &FnRef, property: &str, public_name: Option<&str>) {
        self.add_binding(class, property, public_name, BindingKind::OneWay);
    }

    /// `@InputString()`: an interpolated `@` binding.
    pub fn input_string(&mut self, class: &FnRef, property: &str, public_name: Option<&str>) {
        self.add_binding(class, property, public_name, BindingKind::Text);
    }

    /// `@InputCallback()`: an expression `&` binding.
    pub fn input_callback(&mut self, class: &FnRef, property: &str, public_name: Option<&str>) {
        self.add_binding(class, property, public_name, BindingKind::Callback);
    }

    /// `@Output()`. `emitter` selects the [`EventEmitter`] field on the
    /// controller; the class must construct a `C`.
    pub fn output<C, F>(
        &mut self,
        class: &FnRef,
        property: &str,
        public_name: Option<&str>,
        emitter: F,
    ) -> Result<()>
    where
        C: Any,
        F: Fn(&C) -> &EventEmitter + 'static,
    {
        if !class.constructs::<C>() {
            return Err(FacadeError::OutputType {
                class: class.name().to_string(),
                property: property.to_string(),
            });
        }
        self.add_binding(class, property, public_name, BindingKind::Event);

        let callback = format!("{}{}", OUTPUT_BOUND_CALLBACK_PREFIX, property);
        let class_name = class.name().to_string();
        let setup = FnRef::function(format!("{}OutputSetup", property)).returning(
            move |this, args| {
                let controller = controller_of::<C>(this, &class_name)?;
                let bindings = args.get::<Bindings>(0)?;
                let callback = callback.clone();
                emitter(controller).connect(Rc::new(move |value: Value| {
                    if let Some(bound) = bindings.callback(&callback) {
                        let mut locals = ExprLocals::new();
                        locals.insert("$event".to_string(), value);
                        bound(&locals)?;
                    }
                    Ok(())
                }));
                Ok(unit())
            },
        );
        self.add_pre_link(class, Annotated::named(["$bindings"], setup));
        Ok(())
    }

    /// `@Require(...)`: `spec` may carry `^`, `^^` and `?` prefixes.
    pub fn require(&mut self, class: &FnRef, property: &str, spec: Option<&str>) {
        self.metadata
            .get_or_init(REQUIRES, Default::default(), &Target::Class(class.clone()))
            .insert(property.to_string(), RequireDecl::parse(property, spec));
    }

    /// `@HostListener(event, args)` on `method`. Argument expressions see
    /// only `$event`; the handler runs inside a digest.
    pub fn host_listener<C, F>(
        &mut self,
        class: &FnRef,
        event: &str,
        args: &[&str],
        method: &str,
        handler: F,
    ) -> Result<()>
    where
        C: Any,
        F: Fn(&C, &[Value]) -> Result<()> + 'static,
    {
        ensure_constructs::<C>(class, type_name::<C>())?;
        let decl = HostListenerDecl {
            event: event.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            method: method.to_string(),
        };
        self.metadata
            .get_or_init(HOST_LISTENERS, Vec::new(), &Target::Class(class.clone()))
            .push(decl.clone());

        let handler = Rc::new(handler);
        let class_name = class.name().to_string();
        let setup = FnRef::function(format!("{}HostListenerSetup", method)).returning(
            move |this, injected| {
                let instance = this
                    .cloned()
                    .ok_or_else(|| FacadeError::MissingContext(class_name.clone()))?;
                controller_of::<C>(Some(&instance), &class_name)?;
                let element = injected.get::<ElementRef>(0)?;
                let parser = injected.get::<ParserRef>(1)?;
                let scope = injected.get::<ScopeRef>(2)?;

                let expressions = decl
                    .args
                    .iter()
                    .map(|arg| parser.parse(arg))
                    .collect::<Result<Vec<_>>>()?;
                let handler = Rc::clone(&handler);

                element.on(
                    &decl.event,
                    Rc::new(move |event: &Value| {
                        let mut locals = ExprLocals::new();
                        locals.insert("$event".to_string(), event.clone());
                        let values = expressions
                            .iter()
                            .map(|expression| expression.evaluate(&locals))
                            .collect::<Result<Vec<_>>>()?;

                        let controller = instance
                            .downcast_ref::<C>()
                            .ok_or(FacadeError::InstanceType {
                                token: type_name::<C>().to_string(),
                                expected: type_name::<C>(),
                            })?;
                        let mut call = || handler(controller, &values);
                        if scope.phase().is_some() {
                            call()
                        } else {
                            scope.apply(&mut call)
                        }
                    }),
                );
                Ok(unit())
            },
        );
        self.add_pre_link(
            class,
            Annotated::named(["$element", "$parse", "$scope"], setup),
        );
        Ok(())
    }

    /// `@Component(...)`; the class must construct a `C`.
    pub fn component<C: Controller>(&mut self, class: &FnRef, decl: ComponentDecl) -> Result<()> {
        ensure_constructs::<C>(class, type_name::<C>())?;
        let target = Target::Class(class.clone());
        self.metadata.set(COMPONENT, decl, &target);
        self.metadata
            .set(LIFECYCLE, cast_controller::<C> as ControllerCast, &target);
        Ok(())
    }

    /// `@Directive(...)`; the class must construct a `C`.
    pub fn directive<C: Controller>(&mut self, class: &FnRef, decl: DirectiveDecl) -> Result<()> {
        ensure_constructs::<C>(class, type_name::<C>())?;
        let target = Target::Class(class.clone());
        self.metadata.set(DIRECTIVE, decl, &target);
        self.metadata
            .set(LIFECYCLE, cast_controller::<C> as ControllerCast, &target);
        Ok(())
    }

    /// `@NgModule(...)`: validates every provider and declaration, then
    /// creates the host module and registers them. The module class becomes
    /// a run block.
    pub fn ng_module(
        &mut self,
        runtime: &dyn HostRuntime,
        class: &FnRef,
        decl: NgModule,
    ) -> Result<Rc<dyn HostModule>> {
        let imports = decl
            .imports
            .iter()
            .map(|import| match import {
                ModuleImport::Name(name) => Ok(name.clone()),
                ModuleImport::Module(module) => self
                    .module_id(module)
                    .map(str::to_string)
                    .ok_or_else(|| FacadeError::UnknownModule(module.name().to_string())),
            })
            .collect::<Result<Vec<_>>>()?;

        let providers = ProviderResolver::new(
            &self.extractor,
            &self.metadata,
            self.config.unmarked_providers,
        );
        let declarations =
            DeclarationSynthesizer::new(&self.extractor, &self.metadata, &self.config.controller_as);

        for provider in &decl.providers {
            providers.validate(provider)?;
        }
        for declaration in &decl.declarations {
            declarations.validate(declaration)?;
        }

        let module = runtime.module(&decl.id, &imports);
        for provider in &decl.providers {
            providers.register(module.as_ref(), provider)?;
        }
        for declaration in &decl.declarations {
            declarations.register_declaration(module.as_ref(), declaration)?;
        }
        module.run(self.extractor.extract(class));

        debug!(
            module = %decl.id,
            imports = ?imports,
            providers = decl.providers.len(),
            declarations = decl.declarations.len(),
            "decorated module"
        );
        self.metadata
            .set(MODULE_ID, decl.id, &Target::Class(class.clone()));
        Ok(module)
    }

    fn add_binding(
        &mut self,
        class: &FnRef,
        property: &str,
        public_name: Option<&str>,
        kind: BindingKind,
    ) {
        self.metadata
            .get_or_init(BINDINGS, Vec::new(), &Target::Class(class.clone()))
            .push(BindingDecl {
                property: property.to_string(),
                public_name: public_name.map(str::to_string),
                kind,
            });
    }

    fn add_pre_link(&mut self, class: &FnRef, routine: Annotated) {
        self.metadata
            .get_or_init(PRE_LINK, Vec::new(), &Target::Prototype(class.clone()))
            .push(routine);
    }
}

fn ensure_constructs<T: Any>(class: &FnRef, expected: &'static str) -> Result<()> {
    if class.constructs::<T>() {
        Ok(())
    } else {
        Err(FacadeError::ControllerType {
            class: class.name().to_string(),
            expected,
        })
    }
}

fn controller_of<'a, C: Any>(this: Option<&'a Instance>, class: &str) -> Result<&'a C> {
    this.ok_or_else(|| FacadeError::MissingContext(class.to_string()))?
        .downcast_ref::<C>()
        .ok_or_else(|| FacadeError::InstanceType {
            token: class.to_string(),
            expected: type_name::<C>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryRuntime;

    struct Plain;

    impl Controller for Plain {}

    #[test]
    fn should_reject_output_on_foreign_class() {
        let mut facade = Facade::new();
        let class = FnRef::class("Other").construct(|_| Ok(()));
        let err = facade
            .output::<Plain, _>(&class, "change", None, |_| unreachable!())
            .unwrap_err();
        assert_eq!(err.to_string(), "Other.change type must be EventEmitter");
    }

    #[test]
    fn should_fail_import_of_undecorated_module() {
        let mut facade = Facade::new();
        let runtime = MemoryRuntime::new();
        let other = FnRef::class("Other").construct(|_| Ok(()));
        let app = FnRef::class("App").construct(|_| Ok(()));

        let err = facade
            .ng_module(&runtime, &app, NgModule::new("app").import(&other))
            .err();
        assert_eq!(err, Some(FacadeError::UnknownModule("Other".into())));
        assert!(runtime.get_module("app").is_none());
    }

    #[test]
    fn should_record_module_id() {
        let mut facade = Facade::new();
        let runtime = MemoryRuntime::new();
        let app = FnRef::class("App").construct(|_| Ok(()));

        facade.ng_module(&runtime, &app, NgModule::new("app")).unwrap();
        assert_eq!(facade.module_id(&app), Some("app"));
    }
}
