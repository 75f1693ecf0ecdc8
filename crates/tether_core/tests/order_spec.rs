use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{json, Value};
use tether_core::{
    channel, Completion, Definition, FetchError, FetchRequest, Loader, LoaderConfig, LoaderError,
    Payload, Status, Transport,
};

const CWD: &str = "http://h/app/";

type Fired = Rc<RefCell<Vec<Vec<Option<Value>>>>>;

fn url(name: &str) -> String {
    format!("{CWD}{name}.js")
}

// Holds every request until the test delivers it.
struct Deferred(Rc<RefCell<Vec<String>>>);

impl Transport for Deferred {
    fn request(&mut self, request: FetchRequest) {
        self.0.borrow_mut().push(request.request_location);
    }
}

// A loader whose fetches complete only when `deliver` is called, in whatever
// order the test picks.
struct Harness {
    loader: Loader,
    pending: Rc<RefCell<Vec<String>>>,
    graph: HashMap<String, (Value, Vec<&'static str>)>,
    fetched: Vec<String>,
}

impl Harness {
    fn new(modules: &[(&str, &[&'static str])]) -> Self {
        let (_, receiver) = channel();
        let pending = Rc::new(RefCell::new(Vec::new()));
        let loader = Loader::new(
            LoaderConfig::new(CWD),
            Deferred(pending.clone()),
            receiver,
        );
        let graph = modules
            .iter()
            .map(|(name, deps)| (url(name), (json!(name), deps.to_vec())))
            .collect();
        Self {
            loader,
            pending,
            graph,
            fetched: Vec::new(),
        }
    }

    fn request(&mut self, ids: &[&str]) -> Fired {
        let fired: Fired = Rc::default();
        let sink = fired.clone();
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.loader.request(ids, move |_, exports| sink.borrow_mut().push(exports));
        fired
    }

    fn pending(&self) -> Vec<String> {
        self.pending.borrow().clone()
    }

    fn deliver(&mut self, name: &str) {
        let location = url(name);
        let index = self
            .pending
            .borrow()
            .iter()
            .position(|pending| *pending == location)
            .unwrap_or_else(|| panic!("{location} was never requested"));
        self.deliver_nth(index);
    }

    fn deliver_nth(&mut self, index: usize) {
        let location = self.pending.borrow_mut().remove(index);
        self.fetched.push(location.clone());
        let completion = match self.graph.get(&location) {
            Some((value, deps)) => Completion::ok(
                location,
                Payload::define(Definition::value(value.clone()).with_dependencies(deps.clone())),
            ),
            None => Completion::failed(location.clone(), FetchError::NotFound { location }),
        };
        self.loader.complete(completion);
    }

    fn status(&self, name: &str) -> Status {
        self.loader.module(&url(name)).unwrap().status()
    }
}

#[test]
fn test_loaded_dependent_waits_for_fetching_dependency() {
    let mut h = Harness::new(&[("a", &["./b"]), ("b", &[])]);

    let first = h.request(&["./b", "./a"]);
    h.deliver("a");

    // a has arrived but b has not, so neither request may fire
    let second = h.request(&["./a"]);
    assert!(first.borrow().is_empty());
    assert!(second.borrow().is_empty());
    assert_eq!(h.status("b"), Status::Fetching);
    assert_eq!(h.pending(), vec![url("b")]);

    h.deliver("b");

    assert_eq!(*first.borrow(), vec![vec![Some(json!("b")), Some(json!("a"))]]);
    assert_eq!(*second.borrow(), vec![vec![Some(json!("a"))]]);

    let b = h.loader.module(&url("b")).unwrap();
    assert_eq!(b.status(), Status::Executed);
    assert!(!b.is_placeholder());
    assert_eq!(h.loader.pending_entries(), 0);
}

#[test]
fn test_diamond_completes_out_of_order() {
    let mut h = Harness::new(&[
        ("a", &["./b", "./c"]),
        ("b", &["./d"]),
        ("c", &["./d"]),
        ("d", &[]),
    ]);

    let whole = h.request(&["./a"]);
    h.deliver("a");
    h.deliver("c");
    assert_eq!(h.pending(), vec![url("b"), url("d")]);

    // overlaps the first request while b and d are in flight
    let left = h.request(&["./b"]);
    let right = h.request(&["./c"]);

    h.deliver("d");
    assert!(whole.borrow().is_empty());
    assert!(left.borrow().is_empty());
    assert_eq!(*right.borrow(), vec![vec![Some(json!("c"))]]);

    h.deliver("b");
    assert_eq!(*whole.borrow(), vec![vec![Some(json!("a"))]]);
    assert_eq!(*left.borrow(), vec![vec![Some(json!("b"))]]);

    let mut fetched = h.fetched.clone();
    fetched.sort();
    assert_eq!(fetched, vec![url("a"), url("b"), url("c"), url("d")]);
    assert!(h.pending().is_empty());
}

#[test]
fn test_every_completion_order() {
    const MODULES: &[(&str, &[&str])] = &[
        ("main", &["./x", "./y"]),
        ("x", &["./z"]),
        ("y", &["./z", "./x"]),
        ("z", &[]),
    ];

    // Each run replays `choices` as indices into the pending list, then
    // branches on every request still pending.
    fn explore(choices: &mut Vec<usize>, runs: &mut usize) {
        let mut h = Harness::new(MODULES);
        let seen: Rc<RefCell<Vec<(&str, bool)>>> = Rc::default();
        for (id, closure) in [
            ("./main", &["main", "x", "y", "z"][..]),
            ("./y", &["y", "x", "z"][..]),
        ] {
            let sink = seen.clone();
            h.loader.request([id], move |loader, exports| {
                let arrived = closure.iter().all(|name| {
                    let status = loader.module(&url(name)).unwrap().status();
                    status >= Status::Loaded && status != Status::Error
                });
                assert!(exports[0].is_some(), "{id} fired without exports");
                sink.borrow_mut().push((id, arrived));
            });
        }

        for &choice in choices.iter() {
            h.deliver_nth(choice);
        }

        let pending = h.pending().len();
        if pending == 0 {
            let mut seen = seen.borrow().clone();
            seen.sort();
            assert_eq!(seen, vec![("./main", true), ("./y", true)], "order {choices:?}");
            assert_eq!(h.loader.pending_entries(), 0);
            *runs += 1;
            return;
        }

        // nothing fires while part of its closure is still in flight
        assert!(seen.borrow().iter().all(|(_, arrived)| *arrived));
        for choice in 0..pending {
            choices.push(choice);
            explore(choices, runs);
            choices.pop();
        }
    }

    let mut runs = 0;
    explore(&mut Vec::new(), &mut runs);
    assert!(runs > 1);
}

#[test]
fn test_require_before_arrival_is_not_loaded() {
    let mut h = Harness::new(&[("b", &[])]);
    let fired = h.request(&["./b"]);

    match h.loader.require_sync("./b") {
        Err(LoaderError::NotLoaded { location }) => assert_eq!(location, url("b")),
        other => panic!("expected an unloaded module, got {other:?}"),
    }

    h.loader.define(
        Definition::function(|scope| Ok(scope.require("./b")?)).with_id("eager"),
    );
    assert!(matches!(
        h.loader.require_sync("eager"),
        Err(LoaderError::Factory { .. })
    ));

    let b = h.loader.module(&url("b")).unwrap();
    assert_eq!(b.status(), Status::Fetching);
    assert!(!b.is_placeholder());

    h.deliver("b");
    assert_eq!(*fired.borrow(), vec![vec![Some(json!("b"))]]);
    assert_eq!(h.loader.require_sync("./b").unwrap(), Some(json!("b")));
}

#[test]
fn test_failed_fetch_keeps_an_earlier_definition() {
    let mut h = Harness::new(&[]);
    let fired = h.request(&["./a"]);

    // a arrives by name while its own fetch is still out
    h.loader
        .define(Definition::value(json!("inline")).with_id("./a"));
    assert_eq!(h.loader.require_sync("./a").unwrap(), Some(json!("inline")));
    assert_eq!(*fired.borrow(), vec![vec![Some(json!("inline"))]]);

    h.deliver("a");
    assert_eq!(h.status("a"), Status::Executed);
    assert_eq!(fired.borrow().len(), 1);
}
