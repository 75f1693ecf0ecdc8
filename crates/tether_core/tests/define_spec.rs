use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{json, Value};
use tether_core::{
    channel, Definition, Loader, LoaderConfig, MemoryTransport, Payload, RequestLog, Status,
};

const CWD: &str = "http://h/app/";

type Captured = Rc<RefCell<Option<Vec<Option<Value>>>>>;

fn loader(setup: impl FnOnce(MemoryTransport) -> MemoryTransport) -> (Loader, RequestLog) {
    let (sender, receiver) = channel();
    let transport = setup(MemoryTransport::new(sender));
    let log = transport.log();
    (Loader::new(LoaderConfig::new(CWD), transport, receiver), log)
}

fn capture() -> (Captured, impl FnOnce(&mut Loader, Vec<Option<Value>>) + 'static) {
    let slot: Captured = Rc::default();
    let sink = slot.clone();
    (slot, move |_: &mut Loader, exports: Vec<Option<Value>>| {
        *sink.borrow_mut() = Some(exports);
    })
}

fn url(name: &str) -> String {
    format!("{CWD}{name}.js")
}

#[test]
fn test_text_payload_dependencies_are_extracted() {
    let source = "var b = require('./b');\nmodule.exports = b + 1;";
    let (mut loader, log) = loader(|t| {
        t.with(url("a"), Payload::Text(source.to_string()))
            .with(url("b"), Payload::Json(json!(41)))
    });

    let (result, callback) = capture();
    loader.request(["./a"], callback);
    loader.pump();

    assert_eq!(result.borrow().clone(), Some(vec![Some(json!(source))]));
    assert_eq!(log.locations(), vec![url("a"), url("b")]);

    let a = loader.module(&url("a")).unwrap();
    assert_eq!(a.dependencies(), ["./b".to_string()]);
    assert_eq!(a.edge("./b"), loader.registry().find(&url("b")));
    assert_eq!(loader.module(&url("b")).unwrap().status(), Status::Loaded);
}

#[test]
fn test_explicit_dependencies_win_over_source() {
    let (mut loader, log) = loader(|t| {
        t.with(
            url("a"),
            Payload::define(
                Definition::value(json!("a"))
                    .with_dependencies(["./c"])
                    .with_source("require('./b')"),
            ),
        )
        .with(url("c"), Payload::empty())
    });

    let (result, callback) = capture();
    loader.request(["./a"], callback);
    loader.pump();

    assert_eq!(result.borrow().clone(), Some(vec![Some(json!("a"))]));
    assert_eq!(log.locations(), vec![url("a"), url("c")]);
}

#[test]
fn test_custom_extractor() {
    let (sender, receiver) = channel();
    let transport = MemoryTransport::new(sender)
        .with(url("a"), Payload::Text("ignored".into()))
        .with(url("z"), Payload::Json(json!(null)));
    let log = transport.log();
    let mut loader = Loader::new(LoaderConfig::new(CWD), transport, receiver)
        .with_extractor(|_: &str| vec!["./z".to_string()]);

    loader.request(["./a"], |_, _| {});
    loader.pump();
    assert_eq!(log.locations(), vec![url("a"), url("z")]);
}

#[test]
fn test_anonymous_definition_goes_to_first_waiter() {
    let (mut loader, _) = loader(|t| {
        t.with(
            url("a"),
            Payload::define(Definition::function(|scope| {
                Ok(Some(json!({ "me": scope.location() })))
            })),
        )
    });

    let (result, callback) = capture();
    loader.request(["./a"], callback);
    loader.pump();

    assert_eq!(result.borrow().clone(), Some(vec![Some(json!({ "me": url("a") }))]));
}

#[test]
fn test_empty_payload_leaves_a_placeholder() {
    let (mut loader, _) = loader(|t| t.with(url("a"), Payload::empty()));

    let (result, callback) = capture();
    loader.request(["./a"], callback);
    loader.pump();

    assert_eq!(result.borrow().clone(), Some(vec![None]));
    let a = loader.module(&url("a")).unwrap();
    assert!(a.is_placeholder());
    assert!(!a.has_factory());
}

#[test]
fn test_factory_value_and_exports_container() {
    let (mut loader, _) = loader(|t| t);
    loader.define(
        Definition::function(|scope| {
            scope.exports()["answer"] = json!(42);
            Ok(None)
        })
        .with_id("container"),
    );
    loader.define(Definition::function(|_| Ok(Some(json!([1, 2])))).with_id("returned"));

    let (result, callback) = capture();
    loader.request(["container", "returned"], callback);
    assert_eq!(
        result.borrow().clone(),
        Some(vec![Some(json!({ "answer": 42 })), Some(json!([1, 2]))])
    );
}

#[test]
fn test_factory_resolves_relative_to_itself() {
    let (mut loader, _) = loader(|t| t);
    loader.define(
        Definition::function(|scope| Ok(Some(json!(scope.resolve("../up")))))
            .with_id("./nested/deep"),
    );

    let (result, callback) = capture();
    loader.request(["./nested/deep"], callback);
    assert_eq!(result.borrow().clone(), Some(vec![Some(json!(url("up")))]));
}
