//! Typed injector tests
//!
//! The wrapped injector accepts class references for every lookup and
//! invocation entry point and delegates to the host unchanged.

use std::rc::Rc;

use angular_facade::host::memory::MemoryRuntime;
use angular_facade::host::{HostInjector, InjectorRef, Locals};
use angular_facade::{
    unit, Annotated, Facade, FacadeError, FnRef, HostError, Injectable, Instance, NgModule, Token,
    TypedInjector,
};
use pretty_assertions::assert_eq;

struct Store {
    items: Vec<&'static str>,
}

#[derive(Debug)]
struct Session {
    user: String,
}

fn setup() -> (Facade, TypedInjector, FnRef) {
    let mut facade = Facade::new();
    let runtime = MemoryRuntime::new();
    let app = FnRef::class("AppModule").construct(|_| Ok(()));
    let store = FnRef::class("Store").construct(|_| {
        Ok(Store {
            items: vec!["a", "b"],
        })
    });
    facade.injectable(&store);

    facade
        .ng_module(&runtime, &app, NgModule::new("app").provider(&store))
        .unwrap();
    let injector = facade.injector(runtime.bootstrap(&["app"]).unwrap());
    (facade, injector, store)
}

#[test]
fn test_get_by_class_and_by_token() {
    let (facade, injector, store) = setup();
    let by_class = injector.get(&store).unwrap();
    let by_name = injector.get(facade.resolve(&store)).unwrap();

    assert!(Rc::ptr_eq(&by_class, &by_name));
    assert_eq!(injector.get_as::<Store>(&store).unwrap().items, vec!["a", "b"]);
}

#[test]
fn test_get_as_reports_wrong_type() {
    let (_facade, injector, store) = setup();
    let err = injector.get_as::<Session>(&store).unwrap_err();
    assert!(matches!(err, FacadeError::InstanceType { .. }));
}

#[test]
fn test_unknown_class_error_passes_through() {
    let (facade, injector, _store) = setup();
    let stranger = FnRef::class("Stranger").construct(|_| Ok(()));
    let err = injector.get(&stranger).unwrap_err();
    assert_eq!(
        err,
        FacadeError::Host(HostError::UnknownProvider(facade.resolve(&stranger)))
    );
}

#[test]
fn test_instantiate_with_locals() {
    let (_facade, injector, store) = setup();
    let session = FnRef::class("Session")
        .param_types([Some(store)])
        .inject(1, "user")
        .construct(|args| {
            let store = args.get::<Store>(0)?;
            let user = args.get::<String>(1)?;
            Ok(Session {
                user: format!("{}:{}", user, store.items.len()),
            })
        });

    let mut locals = Locals::new();
    locals.insert("user".into(), Rc::new("ada".to_string()));
    let session = injector.instantiate_as::<Session>(&session, &locals).unwrap();
    assert_eq!(session.user, "ada:2");
}

#[test]
fn test_invoke_array_form_with_context() {
    let (_facade, injector, store) = setup();
    let this: Instance = Rc::new("ctx".to_string());
    let function = FnRef::function("describe").returning(|this, args| {
        let this = this
            .and_then(|t| t.downcast_ref::<String>())
            .cloned()
            .unwrap_or_default();
        let store = args.get::<Store>(0)?;
        Ok(Rc::new(format!("{}:{}", this, store.items.join(""))) as Instance)
    });

    let result = injector
        .invoke(
            Injectable::Array(vec![Token::from(&store)], function),
            Some(&this),
            &Locals::new(),
        )
        .unwrap();
    assert_eq!(result.downcast_ref::<String>().unwrap(), "ctx:ab");
}

#[test]
fn test_injector_is_injectable() {
    let (_facade, injector, store) = setup();
    let lookup = FnRef::function("lookup").returning(|_, args| {
        let host = args.get::<InjectorRef>(0)?;
        Ok(Rc::new(host.has("Store_0")) as Instance)
    });

    let result = injector
        .invoke(
            Annotated::named(["$injector"], lookup),
            None,
            &Locals::new(),
        )
        .unwrap();
    assert_eq!(result.downcast_ref::<bool>(), Some(&true));
    assert!(injector.has(&store));
}

#[test]
fn test_wrapper_still_speaks_host_interface() {
    let (facade, injector, store) = setup();
    let host: &dyn HostInjector = &injector;

    assert!(host.has(&facade.resolve(&store)));
    assert!(HostInjector::get(&injector, "$rootScope").is_ok());
    let noop = Annotated::new([], FnRef::function("noop").returning(|_, _| Ok(unit())));
    assert!(host.invoke(&noop, None, &Locals::new()).is_ok());
}
