//! Component synthesis tests
//!
//! Definitions are produced through module decoration and exercised with the
//! in-memory container's link step.

use std::cell::RefCell;
use std::rc::Rc;

use angular_facade::host::memory::{LinkRequest, MemoryElement, MemoryInjector, MemoryRuntime};
use angular_facade::host::{Bindings, HostScope, Restrict, Transclude};
use angular_facade::{
    Args, Changes, ComponentDecl, Controller, EventEmitter, Facade, FacadeConfig, FacadeError,
    FnRef, HostError, NgModule, Result,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

struct Empty;

impl Controller for Empty {}

struct Counter {
    change: EventEmitter,
}

impl Controller for Counter {}

struct Clicker {
    clicks: RefCell<Vec<Value>>,
}

impl Controller for Clicker {}

type Log = Rc<RefCell<Vec<String>>>;

struct Lifecycle {
    log: Log,
    bindings: Rc<Bindings>,
}

impl Controller for Lifecycle {
    fn on_init(&self) -> Result<()> {
        let value = self.bindings.value("value").unwrap_or(Value::Null);
        self.log.borrow_mut().push(format!("init {}", value));
        Ok(())
    }

    fn on_changes(&self, changes: &Changes) -> Result<()> {
        for (name, change) in changes {
            self.log.borrow_mut().push(format!(
                "change {} {} -> {} first={}",
                name, change.previous, change.current, change.first_change
            ));
        }
        Ok(())
    }

    fn on_destroy(&self) {
        self.log.borrow_mut().push("destroy".to_string());
    }
}

fn decorate(facade: &mut Facade, declarations: &[&FnRef]) -> Rc<MemoryInjector> {
    let runtime = MemoryRuntime::new();
    let app = FnRef::class("AppModule").construct(|_| Ok(()));
    let module = declarations
        .iter()
        .fold(NgModule::new("app"), |m, class| m.declaration(class));
    facade.ng_module(&runtime, &app, module).unwrap();
    runtime.bootstrap(&["app"]).unwrap()
}

fn pairs(map: &indexmap::IndexMap<String, String>) -> Vec<(&str, &str)> {
    map.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

fn counter_class(facade: &mut Facade, alias: Option<&str>) -> FnRef {
    let class = FnRef::class("Counter").construct(|_| {
        Ok(Counter {
            change: EventEmitter::new(),
        })
    });
    facade
        .output::<Counter, _>(&class, "change", alias, |c| &c.change)
        .unwrap();
    facade
        .component::<Counter>(&class, ComponentDecl::new("my-counter"))
        .unwrap();
    class
}

#[test]
fn test_component_without_bindings() {
    let mut facade = Facade::new();
    let class = FnRef::class("Empty").construct(|_| Ok(Empty));
    facade
        .component::<Empty>(&class, ComponentDecl::new("empty-comp"))
        .unwrap();

    let injector = decorate(&mut facade, &[&class]);
    let definition = injector.directive("emptyComp").unwrap();

    assert!(definition.bind_to_controller.is_empty());
    assert_eq!(pairs(&definition.require), vec![("$$self", "emptyComp")]);
    assert_eq!(definition.restrict, Restrict::ELEMENT);
    assert_eq!(definition.controller_as.as_deref(), Some("$ctrl"));
    assert!(definition.isolate_scope);
    assert!(definition.compile.is_none());
}

#[test]
fn test_binding_map() {
    let mut facade = Facade::new();
    let class = FnRef::class("Card").construct(|_| Ok(Empty));
    facade.input(&class, "x", None);
    facade.input(&class, "z", Some("y"));
    facade.input_string(&class, "title", None);
    facade.input_callback(&class, "onSelect", Some("select"));
    facade
        .component::<Empty>(&class, ComponentDecl::new("card"))
        .unwrap();

    let injector = decorate(&mut facade, &[&class]);
    let definition = injector.directive("card").unwrap();

    assert_eq!(
        pairs(&definition.bind_to_controller),
        vec![
            ("x", "<?"),
            ("z", "<?y"),
            ("title", "@?"),
            ("onSelect", "&?select"),
        ]
    );
}

#[test]
fn test_output_binds_prefixed_callback() {
    let mut facade = Facade::new();
    let class = counter_class(&mut facade, None);
    let injector = decorate(&mut facade, &[&class]);
    let definition = injector.directive("myCounter").unwrap();

    assert_eq!(
        pairs(&definition.bind_to_controller),
        vec![("__event_change", "&?change")]
    );
    assert!(definition.compile.is_some());
}

#[test]
fn test_output_alias() {
    let mut facade = Facade::new();
    let class = counter_class(&mut facade, Some("changed"));
    let injector = decorate(&mut facade, &[&class]);

    assert_eq!(
        pairs(&injector.directive("myCounter").unwrap().bind_to_controller),
        vec![("__event_change", "&?changed")]
    );
}

#[test]
fn test_emit_before_link_fails() {
    let mut facade = Facade::new();
    let class = counter_class(&mut facade, None);
    let host = decorate(&mut facade, &[&class]);
    let injector = facade.injector(host);

    let counter = injector
        .instantiate_as::<Counter>(&class, &Default::default())
        .unwrap();
    assert_eq!(counter.change.emit(1), Err(FacadeError::UninitializedEmitter));
    assert_eq!(
        FacadeError::UninitializedEmitter.to_string(),
        "Uninitialized EventEmitter"
    );
}

#[test]
fn test_emit_forwards_event_after_link() {
    let mut facade = Facade::new();
    let class = counter_class(&mut facade, None);
    let injector = decorate(&mut facade, &[&class]);
    let scope = injector.root_scope();
    let element = MemoryElement::new("my-counter");

    let linked = injector
        .link(LinkRequest::new("myCounter", &scope, &element).attr("change", "last = $event"))
        .unwrap();
    let counter = linked.downcast::<Counter>().unwrap();

    counter.change.emit(json!({ "n": 5 })).unwrap();
    assert_eq!(scope.get("last"), Some(json!({ "n": 5 })));
}

#[test]
fn test_emit_without_bound_expression_is_silent() {
    let mut facade = Facade::new();
    let class = counter_class(&mut facade, None);
    let injector = decorate(&mut facade, &[&class]);
    let scope = injector.root_scope();
    let element = MemoryElement::new("my-counter");

    let linked = injector
        .link(LinkRequest::new("myCounter", &scope, &element))
        .unwrap();
    assert!(linked.downcast::<Counter>().unwrap().change.emit(1).is_ok());
}

#[test]
fn test_two_components_do_not_share_bindings() {
    let mut facade = Facade::new();
    let a = FnRef::class("CompA").construct(|_| Ok(Empty));
    let b = FnRef::class("CompB").construct(|_| Ok(Empty));
    facade.input(&a, "first", None);
    facade.input(&b, "second", Some("other"));
    facade.component::<Empty>(&a, ComponentDecl::new("comp-a")).unwrap();
    facade.component::<Empty>(&b, ComponentDecl::new("comp-b")).unwrap();

    let injector = decorate(&mut facade, &[&a, &b]);
    let comp_a = injector.directive("compA").unwrap();
    let comp_b = injector.directive("compB").unwrap();

    assert_eq!(pairs(&comp_a.bind_to_controller), vec![("first", "<?")]);
    assert_eq!(pairs(&comp_b.bind_to_controller), vec![("second", "<?other")]);
    assert_eq!(pairs(&comp_a.require), vec![("$$self", "compA")]);
    assert_eq!(pairs(&comp_b.require), vec![("$$self", "compB")]);
}

#[test]
fn test_component_options() {
    let mut facade = Facade::with_config(FacadeConfig {
        controller_as: "vm".into(),
        ..FacadeConfig::default()
    });
    let plain = FnRef::class("Plain").construct(|_| Ok(Empty));
    let custom = FnRef::class("Custom").construct(|_| Ok(Empty));
    facade
        .component::<Empty>(&plain, ComponentDecl::new("plain-comp").template("<p></p>"))
        .unwrap();
    facade
        .component::<Empty>(
            &custom,
            ComponentDecl::new("custom-comp")
                .controller_as("custom")
                .transclude(Transclude::Enabled(true)),
        )
        .unwrap();

    let injector = decorate(&mut facade, &[&plain, &custom]);
    let plain = injector.directive("plainComp").unwrap();
    let custom = injector.directive("customComp").unwrap();

    assert_eq!(plain.controller_as.as_deref(), Some("vm"));
    assert_eq!(plain.template.as_deref(), Some("<p></p>"));
    assert_eq!(custom.controller_as.as_deref(), Some("custom"));
    assert_eq!(custom.transclude, Some(Transclude::Enabled(true)));
}

#[test]
fn test_component_type_is_checked() {
    let mut facade = Facade::new();
    let class = FnRef::class("Wrong").construct(|_| Ok(1u8));
    let err = facade
        .component::<Empty>(&class, ComponentDecl::new("wrong"))
        .unwrap_err();
    assert!(matches!(err, FacadeError::ControllerType { .. }));
}

#[test]
fn test_output_requires_emitter_owner() {
    let mut facade = Facade::new();
    let class = FnRef::class("Card").construct(|_| Ok(Empty));
    let err = facade
        .output::<Counter, _>(&class, "change", None, |c| &c.change)
        .unwrap_err();
    assert_eq!(err.to_string(), "Card.change type must be EventEmitter");
}

#[test]
fn test_host_listener_runs_inside_one_digest() {
    let mut facade = Facade::new();
    let class = FnRef::class("Clicker").construct(|_| {
        Ok(Clicker {
            clicks: RefCell::new(Vec::new()),
        })
    });
    facade
        .host_listener::<Clicker, _>(&class, "click", &["$event.x", "count"], "onClick", |c, args| {
            c.clicks.borrow_mut().push(Value::Array(args.to_vec()));
            Ok(())
        })
        .unwrap();
    facade
        .component::<Clicker>(&class, ComponentDecl::new("clicker"))
        .unwrap();

    let recorded = facade.host_listeners(&class);
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].event, "click");
    assert_eq!(recorded[0].args, vec!["$event.x", "count"]);
    assert_eq!(recorded[0].method, "onClick");

    let injector = decorate(&mut facade, &[&class]);
    let scope = injector.root_scope();
    scope.set("count", json!(3));
    let element = MemoryElement::new("clicker");
    let linked = injector
        .link(LinkRequest::new("clicker", &scope, &element))
        .unwrap();
    let clicker = linked.downcast::<Clicker>().unwrap();
    assert_eq!(element.listener_count("click"), 1);

    element.trigger("click", json!({ "x": 1 })).unwrap();
    assert_eq!(scope.digest_count(), 1);

    scope
        .apply(&mut || element.trigger("click", json!({ "x": 2 })))
        .unwrap();
    assert_eq!(scope.digest_count(), 2);
    assert_eq!(scope.phase(), None);

    assert_eq!(
        *clicker.clicks.borrow(),
        vec![json!([1, null]), json!([2, null])]
    );
}

#[test]
fn test_no_host_listeners_recorded() {
    let mut facade = Facade::new();
    let class = FnRef::class("Quiet").construct(|_| Ok(Empty));
    facade
        .component::<Empty>(&class, ComponentDecl::new("quiet"))
        .unwrap();
    assert!(facade.host_listeners(&class).is_empty());
}

#[test]
fn test_lifecycle_hooks() {
    let mut facade = Facade::new();
    let log: Log = Rc::default();
    let shared = Rc::clone(&log);
    let class = FnRef::class("Lifecycle")
        .inject(0, "$bindings")
        .construct(move |args: &Args| {
            Ok(Lifecycle {
                log: Rc::clone(&shared),
                bindings: args.get(0)?,
            })
        });
    facade.input(&class, "value", None);
    facade.input_string(&class, "label", None);
    facade
        .component::<Lifecycle>(&class, ComponentDecl::new("life-cycle"))
        .unwrap();

    let injector = decorate(&mut facade, &[&class]);
    let scope = injector.root_scope();
    let element = MemoryElement::new("life-cycle");
    let linked = injector
        .link(
            LinkRequest::new("lifeCycle", &scope, &element)
                .attr("value", "1 + 1")
                .attr("label", "Hello"),
        )
        .unwrap();

    linked.update_binding("value", json!(5)).unwrap();
    linked.destroy();
    linked.destroy();

    assert_eq!(
        *log.borrow(),
        vec![
            "change value null -> 2 first=true",
            "change label null -> \"Hello\" first=true",
            "init 2",
            "change value 2 -> 5 first=false",
            "destroy",
        ]
    );
}

#[test]
fn test_required_ancestor_controller() {
    let mut facade = Facade::new();
    let tabs = FnRef::class("TabSet").construct(|_| Ok(Empty));
    let pane = FnRef::class("TabPane").construct(|_| Ok(Empty));
    let loose = FnRef::class("LoosePane").construct(|_| Ok(Empty));
    facade.require(&pane, "tabs", Some("^^tab-set"));
    facade.require(&loose, "tabSet", Some("?^^"));
    facade.component::<Empty>(&tabs, ComponentDecl::new("tab-set")).unwrap();
    facade.component::<Empty>(&pane, ComponentDecl::new("tab-pane")).unwrap();
    facade.component::<Empty>(&loose, ComponentDecl::new("loose-pane")).unwrap();

    let injector = decorate(&mut facade, &[&tabs, &pane, &loose]);
    let definition = injector.directive("tabPane").unwrap();
    assert_eq!(
        pairs(&definition.require),
        vec![("$$self", "tabPane"), ("tabs", "^^tabSet")]
    );
    assert_eq!(
        injector.directive("loosePane").unwrap().require.get("tabSet").map(String::as_str),
        Some("^^?tabSet")
    );

    let scope = injector.root_scope();
    let parent = injector
        .link(LinkRequest::new("tabSet", &scope, &MemoryElement::new("tab-set")))
        .unwrap();
    let parent_ctrl = parent.instance().unwrap().clone();

    let child = injector
        .link(
            LinkRequest::new("tabPane", &scope, &MemoryElement::new("tab-pane"))
                .ancestor("tabSet", &parent_ctrl),
        )
        .unwrap();
    let found = child.bindings().controller("tabs").unwrap();
    assert!(Rc::ptr_eq(&found, &parent_ctrl));

    let orphan = injector
        .link(LinkRequest::new("tabPane", &scope, &MemoryElement::new("tab-pane")))
        .err();
    assert_eq!(
        orphan,
        Some(FacadeError::Host(HostError::MissingController {
            name: "tabSet".into(),
            directive: "tabPane".into(),
        }))
    );

    let optional = injector
        .link(LinkRequest::new("loosePane", &scope, &MemoryElement::new("loose-pane")))
        .unwrap();
    assert!(optional.bindings().controller("tabSet").is_none());
}
