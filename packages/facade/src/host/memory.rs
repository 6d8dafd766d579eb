//! In-memory host container
//!
//! A small by-name injector with the registration verbs, digest phase flag,
//! element events and link step that synthesized definitions rely on. It is
//! the container the integration tests drive end to end.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

use super::expression::{EvalScope, ParsedExpression};
use super::{
    Attributes, BindingValue, Bindings, DirectiveDefinition, ElementRef, EventHandler, ExprLocals,
    FilterFn, HostElement, HostInjector, HostModule, HostProvider, HostRuntime, HostScope,
    InjectorRef, LinkContext, Locals, ParserRef, ScopeRef,
};
use crate::callable::{Annotated, Args, Instance};
use crate::controller::{Changes, SimpleChange};
use crate::decorators::{RequireDecl, RequireRelation};
use crate::error::{HostError, Result};

pub use super::expression::MemoryParser;

const INJECTOR: &str = "$injector";
const ROOT_SCOPE: &str = "$rootScope";
const PARSE: &str = "$parse";
const DELEGATE: &str = "$delegate";

pub const DIRECTIVE_SUFFIX: &str = "Directive";
pub const FILTER_SUFFIX: &str = "Filter";

#[derive(Clone)]
enum Recipe {
    Constant(Instance),
    Value(Instance),
    Factory(Annotated),
    Service(Annotated),
    Provider(Annotated),
}

enum Registration {
    Recipe(String, Recipe),
    Decorator(String, Annotated),
    Run(Annotated),
}

/// A module: an ordered log of registrations.
pub struct MemoryModule {
    name: String,
    requires: Vec<String>,
    registrations: RefCell<Vec<Registration>>,
}

impl MemoryModule {
    fn new(name: &str, requires: &[String]) -> Self {
        Self {
            name: name.to_string(),
            requires: requires.to_vec(),
            registrations: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, registration: Registration) {
        self.registrations.borrow_mut().push(registration);
    }

    fn recipe(&self, name: &str, recipe: Recipe) {
        trace!(module = %self.name, name, "recorded registration");
        self.record(Registration::Recipe(name.to_string(), recipe));
    }

    /// Names registered so far, in order (directives and filters carry their suffix).
    pub fn registered_names(&self) -> Vec<String> {
        self.registrations
            .borrow()
            .iter()
            .filter_map(|r| match r {
                Registration::Recipe(name, _) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn run_block_count(&self) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|r| matches!(r, Registration::Run(_)))
            .count()
    }
}

impl HostModule for MemoryModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn requires(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn constant(&self, name: &str, value: Instance) {
        self.recipe(name, Recipe::Constant(value));
    }

    fn value(&self, name: &str, value: Instance) {
        self.recipe(name, Recipe::Value(value));
    }

    fn factory(&self, name: &str, factory: Annotated) {
        self.recipe(name, Recipe::Factory(factory));
    }

    fn service(&self, name: &str, constructor: Annotated) {
        self.recipe(name, Recipe::Service(constructor));
    }

    fn provider(&self, name: &str, constructor: Annotated) {
        self.recipe(name, Recipe::Provider(constructor));
    }

    fn decorator(&self, name: &str, decorator: Annotated) {
        self.record(Registration::Decorator(name.to_string(), decorator));
    }

    fn directive(&self, name: &str, factory: Annotated) {
        self.recipe(&format!("{}{}", name, DIRECTIVE_SUFFIX), Recipe::Factory(factory));
    }

    fn filter(&self, name: &str, factory: Annotated) {
        self.recipe(&format!("{}{}", name, FILTER_SUFFIX), Recipe::Factory(factory));
    }

    fn run(&self, block: Annotated) {
        self.record(Registration::Run(block));
    }
}

/// The module registry.
#[derive(Default)]
pub struct MemoryRuntime {
    modules: RefCell<IndexMap<String, Rc<MemoryModule>>>,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_module(&self, name: &str) -> Option<Rc<MemoryModule>> {
        self.modules.borrow().get(name).cloned()
    }

    /// Create an injector from `modules` and everything they require.
    pub fn bootstrap(&self, modules: &[&str]) -> Result<Rc<MemoryInjector>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        for name in modules {
            self.collect(name, &mut seen, &mut order)?;
        }
        let names: Vec<&str> = order.iter().map(|m| m.name.as_str()).collect();
        debug!(modules = ?names, "bootstrapping injector");

        let mut recipes = HashMap::new();
        let mut decorators: HashMap<String, Vec<Annotated>> = HashMap::new();
        let mut run_blocks = Vec::new();
        for module in &order {
            for registration in module.registrations.borrow().iter() {
                match registration {
                    Registration::Recipe(name, recipe) => {
                        recipes.insert(name.clone(), recipe.clone());
                    }
                    Registration::Decorator(name, decorator) => {
                        decorators
                            .entry(name.clone())
                            .or_default()
                            .push(decorator.clone());
                    }
                    Registration::Run(block) => run_blocks.push(block.clone()),
                }
            }
        }

        let injector = MemoryInjector::new(recipes, decorators);
        for name in injector.decorators.keys() {
            if !injector.has(name) {
                return Err(HostError::UnknownProvider(name.clone()).into());
            }
        }
        for block in &run_blocks {
            injector.invoke(block, None, &Locals::new())?;
        }
        Ok(injector)
    }

    fn collect(
        &self,
        name: &str,
        seen: &mut HashSet<String>,
        order: &mut Vec<Rc<MemoryModule>>,
    ) -> Result<()> {
        if !seen.insert(name.to_string()) {
            return Ok(());
        }
        let module = self
            .get_module(name)
            .ok_or_else(|| HostError::ModuleUnavailable(name.to_string()))?;
        for required in &module.requires {
            self.collect(required, seen, order)?;
        }
        order.push(module);
        Ok(())
    }
}

impl HostRuntime for MemoryRuntime {
    fn module(&self, name: &str, requires: &[String]) -> Rc<dyn HostModule> {
        let module = Rc::new(MemoryModule::new(name, requires));
        self.modules
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&module));
        module
    }
}

/// Singleton-caching injector.
pub struct MemoryInjector {
    this: Weak<MemoryInjector>,
    recipes: HashMap<String, Recipe>,
    decorators: HashMap<String, Vec<Annotated>>,
    cache: RefCell<HashMap<String, Instance>>,
    resolving: RefCell<Vec<String>>,
    root_scope: Rc<MemoryScope>,
    parser: Rc<MemoryParser>,
}

impl MemoryInjector {
    fn new(
        recipes: HashMap<String, Recipe>,
        decorators: HashMap<String, Vec<Annotated>>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| MemoryInjector {
            this: this.clone(),
            recipes,
            decorators,
            cache: RefCell::new(HashMap::new()),
            resolving: RefCell::new(Vec::new()),
            root_scope: MemoryScope::root(),
            parser: Rc::new(MemoryParser),
        })
    }

    pub fn root_scope(&self) -> Rc<MemoryScope> {
        Rc::clone(&self.root_scope)
    }

    /// The definition registered for directive `name`.
    pub fn directive(&self, name: &str) -> Result<Rc<DirectiveDefinition>> {
        self.get_typed(&format!("{}{}", name, DIRECTIVE_SUFFIX), "directive definition")
    }

    pub fn filter(&self, name: &str) -> Result<Rc<FilterFn>> {
        self.get_typed(&format!("{}{}", name, FILTER_SUFFIX), "filter")
    }

    fn get_typed<T: 'static>(&self, name: &str, expected: &'static str) -> Result<Rc<T>> {
        self.get(name)?.downcast::<T>().map_err(|_| {
            HostError::UnexpectedInstance {
                name: name.to_string(),
                found: "value",
                expected,
            }
            .into()
        })
    }

    fn builtin(&self, name: &str) -> Option<Instance> {
        match name {
            INJECTOR => self
                .this
                .upgrade()
                .map(|injector| Rc::new(InjectorRef(injector)) as Instance),
            ROOT_SCOPE => Some(Rc::new(ScopeRef(self.root_scope())) as Instance),
            PARSE => Some(Rc::new(ParserRef(Rc::clone(&self.parser) as _)) as Instance),
            _ => None,
        }
    }

    fn create(&self, name: &str, recipe: &Recipe) -> Result<Instance> {
        let mut instance = match recipe {
            Recipe::Constant(value) | Recipe::Value(value) => Rc::clone(value),
            Recipe::Factory(factory) => self.invoke(factory, None, &Locals::new())?,
            Recipe::Service(constructor) => self.instantiate(constructor, &Locals::new())?,
            Recipe::Provider(constructor) => {
                let provider = self.instantiate(constructor, &Locals::new())?;
                let get = provider
                    .downcast_ref::<HostProvider>()
                    .map(|p| p.get.clone())
                    .ok_or_else(|| HostError::InvalidProvider(name.to_string()))?;
                self.invoke(&get, Some(&provider), &Locals::new())?
            }
        };

        for decorator in self.decorators.get(name).into_iter().flatten() {
            let mut locals = Locals::new();
            locals.insert(DELEGATE.to_string(), instance);
            instance = self.invoke(decorator, None, &locals)?;
        }
        Ok(instance)
    }

    fn arguments(&self, function: &Annotated, locals: &Locals) -> Result<Args> {
        let values = function
            .deps()
            .iter()
            .map(|dep| match dep {
                None => Ok(None),
                Some(name) => match locals.get(name) {
                    Some(local) => Ok(Some(Rc::clone(local))),
                    None => self.get(name).map(Some),
                },
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Args::new(function.name(), values))
    }

    /// Run the link step of directive `request.name` on one element.
    pub fn link(&self, request: LinkRequest) -> Result<LinkedController> {
        let definition = self.directive(&request.name)?;
        let LinkRequest {
            name,
            attrs,
            scope: parent,
            element,
            element_controllers,
            ancestor_controllers,
        } = request;

        let scope = if definition.isolate_scope {
            parent.isolate_child()
        } else {
            Rc::clone(&parent)
        };
        let attrs = Rc::new(attrs);
        let bindings = Rc::new(Bindings::new());
        let mut changes = Changes::new();

        for (property, spec) in &definition.bind_to_controller {
            let binding = BindingSpec::parse(property, spec);
            let Some(source) = attrs.get(&binding.attribute) else {
                continue;
            };
            match binding.mode {
                '<' => {
                    let value = ParsedExpression::parse(source)?
                        .evaluate_in(Some(&*parent), &ExprLocals::new())?;
                    changes.insert(
                        property.clone(),
                        SimpleChange::new(Value::Null, value.clone(), true),
                    );
                    bindings.set(property.clone(), BindingValue::Value(value));
                }
                '@' => {
                    let text = Value::String(source.to_string());
                    changes.insert(property.clone(), SimpleChange::new(Value::Null, text, true));
                    bindings.set(property.clone(), BindingValue::Text(source.to_string()));
                }
                _ => {
                    let expression = ParsedExpression::parse(source)?;
                    let target = Rc::clone(&parent);
                    bindings.set(
                        property.clone(),
                        BindingValue::Callback(Rc::new(move |locals: &ExprLocals| {
                            expression.evaluate_in(Some(&*target), locals)
                        })),
                    );
                }
            }
        }

        let element_ref = ElementRef(Rc::clone(&element) as Rc<dyn HostElement>);
        let instance = match &definition.controller {
            Some(controller) => {
                let mut locals = Locals::new();
                locals.insert("$scope".into(), Rc::new(ScopeRef(Rc::clone(&scope) as _)));
                locals.insert("$element".into(), Rc::new(element_ref.clone()));
                locals.insert("$attrs".into(), Rc::clone(&attrs) as Instance);
                locals.insert("$bindings".into(), Rc::clone(&bindings) as Instance);
                Some(self.instantiate(controller, &locals)?)
            }
            None => None,
        };

        let mut controllers = IndexMap::new();
        for (key, spec) in &definition.require {
            let require = RequireDecl::parse(key, Some(spec));
            let required_name = require.target_name();
            let on_element = || {
                if required_name == name {
                    instance.clone()
                } else {
                    element_controllers.get(&required_name).cloned()
                }
            };
            let on_ancestors = || ancestor_controllers.get(&required_name).cloned();
            let found = match require.relation {
                RequireRelation::SameElement => on_element(),
                RequireRelation::SelfOrAncestor => on_element().or_else(on_ancestors),
                RequireRelation::Ancestor => on_ancestors(),
            };
            if found.is_none() && !require.optional {
                return Err(HostError::MissingController {
                    name: required_name,
                    directive: name,
                }
                .into());
            }
            if definition.isolate_scope {
                bindings.set(key.clone(), BindingValue::Controller(found.clone()));
            }
            controllers.insert(key.clone(), found);
        }

        let lifecycle = definition
            .lifecycle
            .zip(instance.as_ref())
            .and_then(|(cast, instance)| cast(instance));
        if let Some(controller) = lifecycle {
            if !changes.is_empty() {
                controller.on_changes(&changes)?;
            }
            controller.on_init()?;
        }

        if let Some(compile) = &definition.compile {
            let link = compile(&element_ref, &attrs)?;
            if let Some(pre) = link.pre {
                pre(&LinkContext {
                    scope: Rc::new(ScopeRef(Rc::clone(&scope) as _)),
                    element: Rc::new(element_ref),
                    attrs: Rc::clone(&attrs),
                    bindings: Rc::clone(&bindings),
                    controllers,
                })?;
            }
        }
        debug!(directive = %name, "linked directive");

        Ok(LinkedController {
            definition,
            instance,
            bindings,
            scope,
            destroyed: Cell::new(false),
        })
    }
}

impl HostInjector for MemoryInjector {
    fn get(&self, name: &str) -> Result<Instance> {
        if let Some(instance) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(instance));
        }
        if let Some(instance) = self.builtin(name) {
            self.cache
                .borrow_mut()
                .insert(name.to_string(), Rc::clone(&instance));
            return Ok(instance);
        }

        let recipe = self
            .recipes
            .get(name)
            .ok_or_else(|| HostError::UnknownProvider(name.to_string()))?;

        if self.resolving.borrow().iter().any(|n| n == name) {
            let mut path = self.resolving.borrow().clone();
            path.push(name.to_string());
            path.reverse();
            return Err(HostError::CircularDependency(path.join(" <- ")).into());
        }

        self.resolving.borrow_mut().push(name.to_string());
        let created = self.create(name, recipe);
        self.resolving.borrow_mut().pop();
        let instance = created?;

        trace!(name, "instantiated");
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&instance));
        Ok(instance)
    }

    fn has(&self, name: &str) -> bool {
        matches!(name, INJECTOR | ROOT_SCOPE | PARSE) || self.recipes.contains_key(name)
    }

    fn instantiate(&self, constructor: &Annotated, locals: &Locals) -> Result<Instance> {
        let args = self.arguments(constructor, locals)?;
        constructor.target().call(None, &args)
    }

    fn invoke(
        &self,
        function: &Annotated,
        this: Option<&Instance>,
        locals: &Locals,
    ) -> Result<Instance> {
        let args = self.arguments(function, locals)?;
        function.target().call(this, &args)
    }
}

/// A `mode` `?` `attribute` binding string, e.g. `<?value`.
struct BindingSpec {
    mode: char,
    attribute: String,
}

impl BindingSpec {
    fn parse(property: &str, spec: &str) -> Self {
        let mode = spec.chars().next().unwrap_or('=');
        let attribute = spec
            .get(mode.len_utf8()..)
            .unwrap_or("")
            .trim_start_matches('?');
        Self {
            mode,
            attribute: if attribute.is_empty() {
                property.to_string()
            } else {
                attribute.to_string()
            },
        }
    }
}

/// The inputs to one link step.
pub struct LinkRequest {
    pub name: String,
    pub attrs: Attributes,
    /// The scope the element sits in; binding expressions evaluate here.
    pub scope: Rc<MemoryScope>,
    pub element: Rc<MemoryElement>,
    pub element_controllers: IndexMap<String, Instance>,
    pub ancestor_controllers: IndexMap<String, Instance>,
}

impl LinkRequest {
    pub fn new(name: impl Into<String>, scope: &Rc<MemoryScope>, element: &Rc<MemoryElement>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
            scope: Rc::clone(scope),
            element: Rc::clone(element),
            element_controllers: IndexMap::new(),
            ancestor_controllers: IndexMap::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs = self.attrs.with(name, value);
        self
    }

    /// A controller of another directive on the same element.
    pub fn sibling(mut self, name: impl Into<String>, controller: &Instance) -> Self {
        self.element_controllers
            .insert(name.into(), Rc::clone(controller));
        self
    }

    pub fn ancestor(mut self, name: impl Into<String>, controller: &Instance) -> Self {
        self.ancestor_controllers
            .insert(name.into(), Rc::clone(controller));
        self
    }
}

/// A linked directive instance.
pub struct LinkedController {
    definition: Rc<DirectiveDefinition>,
    instance: Option<Instance>,
    bindings: Rc<Bindings>,
    scope: Rc<MemoryScope>,
    destroyed: Cell<bool>,
}

impl LinkedController {
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    pub fn downcast<T: 'static>(&self) -> Option<Rc<T>> {
        self.instance
            .as_ref()
            .and_then(|instance| Rc::clone(instance).downcast::<T>().ok())
    }

    pub fn bindings(&self) -> &Rc<Bindings> {
        &self.bindings
    }

    pub fn scope(&self) -> &Rc<MemoryScope> {
        &self.scope
    }

    /// Push a new one-way value and notify the controller.
    pub fn update_binding(&self, property: &str, value: Value) -> Result<()> {
        let previous = self.bindings.value(property).unwrap_or(Value::Null);
        self.bindings
            .set(property, BindingValue::Value(value.clone()));

        if let Some(controller) = self.controller() {
            let mut changes = Changes::new();
            changes.insert(
                property.to_string(),
                SimpleChange::new(previous, value, false),
            );
            controller.on_changes(&changes)?;
        }
        Ok(())
    }

    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        if let Some(controller) = self.controller() {
            controller.on_destroy();
        }
    }

    fn controller(&self) -> Option<&dyn crate::controller::Controller> {
        let cast = self.definition.lifecycle?;
        cast(self.instance.as_ref()?)
    }
}

struct RootState {
    phase: Cell<Option<&'static str>>,
    digests: Cell<usize>,
}

/// A scope with JSON data and a digest counter shared with its root.
pub struct MemoryScope {
    root: Rc<RootState>,
    parent: Option<Rc<MemoryScope>>,
    data: RefCell<Map<String, Value>>,
}

impl MemoryScope {
    pub fn root() -> Rc<Self> {
        Rc::new(Self {
            root: Rc::new(RootState {
                phase: Cell::new(None),
                digests: Cell::new(0),
            }),
            parent: None,
            data: RefCell::new(Map::new()),
        })
    }

    /// A prototypally inheriting child.
    pub fn child(self: &Rc<Self>) -> Rc<Self> {
        Rc::new(Self {
            root: Rc::clone(&self.root),
            parent: Some(Rc::clone(self)),
            data: RefCell::new(Map::new()),
        })
    }

    /// A child that sees none of its parent's data.
    pub fn isolate_child(&self) -> Rc<Self> {
        Rc::new(Self {
            root: Rc::clone(&self.root),
            parent: None,
            data: RefCell::new(Map::new()),
        })
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.data.borrow().get(name) {
            Some(value) => Some(value.clone()),
            None => self.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.data.borrow_mut().insert(name.into(), value);
    }

    pub fn digest_count(&self) -> usize {
        self.root.digests.get()
    }

    pub fn digest(&self) -> Result<()> {
        if let Some(phase) = self.root.phase.get() {
            return Err(HostError::PhaseInProgress(phase).into());
        }
        self.root.phase.set(Some("$digest"));
        self.root.digests.set(self.root.digests.get() + 1);
        self.root.phase.set(None);
        Ok(())
    }
}

impl HostScope for MemoryScope {
    fn phase(&self) -> Option<&'static str> {
        self.root.phase.get()
    }

    fn apply(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        if let Some(phase) = self.root.phase.get() {
            return Err(HostError::PhaseInProgress(phase).into());
        }
        self.root.phase.set(Some("$apply"));
        let result = f();
        self.root.phase.set(None);
        self.digest()?;
        result
    }
}

impl EvalScope for MemoryScope {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn assign(&self, name: &str, value: Value) {
        self.set(name, value);
    }
}

/// An element with an event listener registry.
pub struct MemoryElement {
    name: String,
    listeners: RefCell<IndexMap<String, Vec<EventHandler>>>,
}

impl MemoryElement {
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            listeners: RefCell::new(IndexMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.borrow().get(event).map_or(0, Vec::len)
    }

    /// Dispatch `event`; object payload fields are merged into the event value.
    pub fn trigger(&self, event: &str, payload: Value) -> Result<()> {
        let mut value = json!({ "type": event });
        match payload {
            Value::Object(fields) => {
                if let Value::Object(map) = &mut value {
                    map.extend(fields);
                }
            }
            Value::Null => {}
            other => value["detail"] = other,
        }

        let handlers = self
            .listeners
            .borrow()
            .get(event)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(&value)?;
        }
        Ok(())
    }
}

impl HostElement for MemoryElement {
    fn on(&self, event: &str, handler: EventHandler) {
        self.listeners
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(handler);
    }
}
