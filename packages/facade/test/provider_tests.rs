//! Provider resolution tests

use std::rc::Rc;

use angular_facade::host::memory::MemoryRuntime;
use angular_facade::host::Locals;
use angular_facade::{
    unit, Args, Facade, FacadeConfig, FacadeError, FnRef, HostError, Instance, NgModule,
    Provider, TypedInjector, UnmarkedProviderPolicy,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

struct Foo;

struct Bar {
    foo: Rc<Foo>,
}

trait Logger {
    fn name(&self) -> &'static str;
}

struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn name(&self) -> &'static str {
        "console"
    }
}

fn bootstrap(facade: &mut Facade, module: NgModule) -> TypedInjector {
    let runtime = MemoryRuntime::new();
    let app = FnRef::class("AppModule").construct(|_| Ok(()));
    let id = module.id.clone();
    facade.ng_module(&runtime, &app, module).unwrap();
    facade.injector(runtime.bootstrap(&[id.as_str()]).unwrap())
}

fn foo_class(facade: &Facade) -> FnRef {
    let foo = FnRef::class("Foo").construct(|_| Ok(Foo));
    facade.injectable(&foo);
    foo
}

#[test]
fn test_injectable_class_provider() {
    let mut facade = Facade::new();
    let foo = foo_class(&facade);
    let injector = bootstrap(&mut facade, NgModule::new("m1").provider(&foo));

    let instance = injector.get(&foo).unwrap();
    assert!(instance.downcast_ref::<Foo>().is_some());
    assert!(Rc::ptr_eq(&instance, &injector.get(&foo).unwrap()));

    let first = injector.instantiate(&foo, &Locals::new()).unwrap();
    let second = injector.instantiate(&foo, &Locals::new()).unwrap();
    assert!(first.downcast_ref::<Foo>().is_some());
    assert!(!Rc::ptr_eq(&first, &second));
}

#[test]
fn test_declared_types_are_injected() {
    let mut facade = Facade::new();
    let foo = foo_class(&facade);
    let bar = FnRef::class("Bar")
        .param_types([Some(foo.clone())])
        .construct(|args: &Args| Ok(Bar { foo: args.get(0)? }));
    facade.injectable(&bar);

    let injector = bootstrap(
        &mut facade,
        NgModule::new("m").provider(&foo).provider(&bar),
    );

    let bar = injector.get_as::<Bar>(&bar).unwrap();
    let foo = injector.get_as::<Foo>(&foo).unwrap();
    assert!(Rc::ptr_eq(&bar.foo, &foo));
}

#[test]
fn test_value_provider_returns_value_unchanged() {
    let mut facade = Facade::new();
    let config: Instance = Rc::new(json!({ "debug": true }));
    let injector = bootstrap(
        &mut facade,
        NgModule::new("m").provider(Provider::value("config", Rc::clone(&config))),
    );

    let resolved = injector.get("config").unwrap();
    assert!(Rc::ptr_eq(&resolved, &config));
    assert_eq!(
        resolved.downcast_ref::<Value>(),
        Some(&json!({ "debug": true }))
    );
}

#[test]
fn test_class_substitution() {
    let mut facade = Facade::new();
    let logger = FnRef::class("Logger").construct(|_| Ok(()));
    let console = FnRef::class("ConsoleLogger")
        .construct(|_| Ok(Rc::new(ConsoleLogger) as Rc<dyn Logger>));
    facade.injectable(&console);

    let injector = bootstrap(
        &mut facade,
        NgModule::new("m").provider(Provider::class(&logger, &console)),
    );

    assert!(injector.has(&logger));
    let resolved = injector.get_as::<Rc<dyn Logger>>(&logger).unwrap();
    assert_eq!(resolved.name(), "console");
}

#[test]
fn test_alias_shares_singleton() {
    let mut facade = Facade::new();
    let foo = foo_class(&facade);
    let injector = bootstrap(
        &mut facade,
        NgModule::new("m")
            .provider(&foo)
            .provider(Provider::existing("fooAlias", &foo)),
    );

    let via_alias = injector.get("fooAlias").unwrap();
    let direct = injector.get(&foo).unwrap();
    assert!(Rc::ptr_eq(&via_alias, &direct));
}

#[test]
fn test_alias_of_missing_token_fails_on_use() {
    let mut facade = Facade::new();
    let injector = bootstrap(
        &mut facade,
        NgModule::new("m").provider(Provider::existing("alias", "missing")),
    );

    assert_eq!(
        injector.get("alias").unwrap_err(),
        FacadeError::Host(HostError::UnknownProvider("missing".into()))
    );
}

#[test]
fn test_factory_with_declared_types() {
    let mut facade = Facade::new();
    let foo = foo_class(&facade);
    let factory = FnRef::function("makeAnswer")
        .param_types([Some(foo.clone())])
        .returning(|_, args| {
            args.get::<Foo>(0)?;
            Ok(Rc::new(42u32) as Instance)
        });

    let injector = bootstrap(
        &mut facade,
        NgModule::new("m")
            .provider(&foo)
            .provider(Provider::factory("answer", &factory)),
    );

    assert_eq!(*injector.get_as::<u32>("answer").unwrap(), 42);
}

#[test]
fn test_factory_with_dependency_list() {
    let mut facade = Facade::new();
    let sum = FnRef::function("sum").returning(|_, args| {
        Ok(Rc::new(*args.get::<u32>(0)? + *args.get::<u32>(1)?) as Instance)
    });

    let injector = bootstrap(
        &mut facade,
        NgModule::new("m")
            .provider(Provider::value("a", Rc::new(2u32)))
            .provider(Provider::value("b", Rc::new(3u32)))
            .provider(Provider::factory_with_deps("sum", &sum, ["a", "b"])),
    );

    assert_eq!(*injector.get_as::<u32>("sum").unwrap(), 5);
}

#[test]
fn test_conflicting_factory_dependencies_rejected_eagerly() {
    let mut facade = Facade::new();
    let runtime = MemoryRuntime::new();
    let app = FnRef::class("AppModule").construct(|_| Ok(()));
    let factory = FnRef::function("make")
        .with_inject(["$q"])
        .returning(|_, _| Ok(unit()));

    let err = facade
        .ng_module(
            &runtime,
            &app,
            NgModule::new("m").provider(Provider::factory_with_deps("thing", &factory, ["$log"])),
        )
        .err()
        .unwrap();

    assert_eq!(
        err,
        FacadeError::ConflictingDependencies {
            token: "thing".into(),
            factory: "make".into(),
        }
    );
    assert!(runtime.get_module("m").is_none());
}

#[test]
fn test_unmarked_class_rejected_by_default() {
    let mut facade = Facade::new();
    let runtime = MemoryRuntime::new();
    let app = FnRef::class("AppModule").construct(|_| Ok(()));
    let plain = FnRef::class("Plain").construct(|_| Ok(Foo));

    let err = facade
        .ng_module(&runtime, &app, NgModule::new("m").provider(&plain))
        .err()
        .unwrap();
    assert_eq!(err, FacadeError::NotInjectable("Plain".into()));
}

#[test]
fn test_unmarked_class_tolerated_when_configured() {
    let mut facade = Facade::with_config(
        FacadeConfig::default().with_unmarked_providers(UnmarkedProviderPolicy::Tolerate),
    );
    let foo = foo_class(&facade);
    let plain = FnRef::class("Plain")
        .param_types([Some(foo.clone())])
        .construct(|args: &Args| {
            assert!(args.raw(0).is_none());
            Ok(Bar { foo: Rc::new(Foo) })
        });

    let injector = bootstrap(
        &mut facade,
        NgModule::new("m").provider(&foo).provider(&plain),
    );

    assert!(injector.get_as::<Bar>(&plain).is_ok());
    assert!(injector.has(&plain));
    assert!(facade.tokens().is_marked(&plain));
}
