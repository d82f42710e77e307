//! Integration tests for the process-wide API with annotation enabled.

use std::sync::{Arc, OnceLock};
use std::thread;

use nvmark::prelude::*;
use nvmark::recording::{Record, RecordingBackend};
use nvmark::{Config, DomainHandle, Message};

/// Recorder behind the process-wide runtime; initializes it on first use.
fn backend() -> &'static Arc<RecordingBackend> {
    static BACKEND: OnceLock<Arc<RecordingBackend>> = OnceLock::new();
    BACKEND.get_or_init(|| {
        let backend = Arc::new(RecordingBackend::new());
        nvmark::init(Config::new().with_backend(backend.clone())).expect("runtime not yet initialized");
        backend
    })
}

fn handle(domain: &str) -> DomainHandle {
    nvmark::domain(Some(domain)).expect("annotation enabled").handle()
}

fn pops_in(domain: &str) -> Vec<Option<String>> {
    backend()
        .records_in(handle(domain))
        .into_iter()
        .filter_map(|r| match r {
            Record::Pop { message, .. } => Some(message),
            _ => None,
        })
        .collect()
}

fn pushes_in(domain: &str) -> Vec<Option<String>> {
    backend()
        .records_in(handle(domain))
        .into_iter()
        .filter_map(|r| match r {
            Record::Push { attributes, .. } => Some(attributes.message_text().map(str::to_string)),
            _ => None,
        })
        .collect()
}

/// Test that annotation is enabled and init cannot run twice.
#[test]
fn test_runtime_initialized_once() {
    backend();
    assert!(nvmark::enabled());
    assert_eq!(nvmark::init(Config::new()), Err(Error::AlreadyInitialized));
}

/// Test push/pop nesting order and underflow.
#[test]
fn test_nesting_is_lifo() {
    backend();
    nvmark::push_range(Annotation::new().message("A").domain("nesting")).unwrap();
    nvmark::push_range(Annotation::new().message("B").domain("nesting")).unwrap();
    nvmark::pop_range(Some("nesting")).unwrap();
    nvmark::pop_range(Some("nesting")).unwrap();

    assert_eq!(pops_in("nesting"), vec![Some("B".to_string()), Some("A".to_string())]);

    let err = nvmark::pop_range(Some("nesting")).unwrap_err();
    assert_eq!(
        err,
        Error::RangeStackUnderflow {
            domain: "nesting".to_string()
        }
    );
    assert_eq!(pops_in("nesting").len(), 2);
}

/// Test that each thread has its own stack.
#[test]
fn test_threads_have_independent_stacks() {
    backend();
    let workers: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let message = format!("worker-{i}");
                nvmark::push_range(Annotation::new().message(message.as_str()).domain("workers"))?;
                nvmark::push_range(Annotation::new().message("inner").domain("workers"))?;
                nvmark::pop_range(Some("workers"))?;
                nvmark::pop_range(Some("workers"))?;
                nvmark::pop_range(Some("workers")).map(|_| ())
            })
        })
        .collect();

    for worker in workers {
        let result = worker.join().unwrap();
        assert!(matches!(result, Err(Error::RangeStackUnderflow { .. })));
    }
    assert_eq!(pushes_in("workers").len(), 8);
    assert_eq!(pops_in("workers").len(), 8);
}

/// Test start/end ranges succeed exactly once.
#[test]
fn test_start_end_exactly_once() {
    backend();
    let id = nvmark::start_range(Annotation::new().message("transfer").domain("async")).unwrap();
    assert!(!id.is_null());

    let ender = thread::spawn(move || nvmark::end_range(id));
    ender.join().unwrap().unwrap();

    assert_eq!(nvmark::end_range(id), Err(Error::UnknownRangeId(id)));

    let ends: Vec<Record> = backend()
        .records_in(handle("async"))
        .into_iter()
        .filter(|r| matches!(r, Record::End { .. }))
        .collect();
    assert_eq!(
        ends,
        vec![Record::End {
            id,
            message: Some("transfer".to_string())
        }]
    );
}

/// Test overlapping start/end ranges ended out of order.
#[test]
fn test_overlapping_ranges() {
    backend();
    let a = nvmark::start_range(Annotation::new().message("a").domain("overlap")).unwrap();
    let b = nvmark::start_range(Annotation::new().message("b").domain("overlap")).unwrap();
    nvmark::end_range(a).unwrap();
    nvmark::end_range(b).unwrap();
}

/// Test marks carry fully resolved attributes.
#[test]
fn test_mark_attributes() {
    backend();
    nvmark::mark(
        Annotation::new()
            .message("checkpoint")
            .color("#112233")
            .domain("marks")
            .category("phase")
            .payload(0.5f32),
    )
    .unwrap();
    nvmark::mark(Annotation::new().domain("marks").category("phase")).unwrap();

    let marks: Vec<_> = backend()
        .records_in(handle("marks"))
        .into_iter()
        .filter_map(|r| match r {
            Record::Mark { attributes, .. } => Some(attributes),
            _ => None,
        })
        .collect();
    assert_eq!(marks.len(), 2);
    assert_eq!(marks[0].message_text(), Some("checkpoint"));
    assert_eq!(marks[0].color(), 0xFF11_2233);
    assert_eq!(marks[0].category(), Some(1));
    assert!(marks[0].payload().is_some_and(|p| p.is_floating()));

    assert_eq!(marks[1].message(), None);
    assert_eq!(marks[1].color(), nvmark::color::DEFAULT_COLOR);
    assert_eq!(marks[1].category(), Some(1));
}

/// Test an invalid color surfaces without reaching the backend.
#[test]
fn test_invalid_color() {
    backend();
    let err = nvmark::push_range(Annotation::new().color("ultraviolet").domain("colors")).unwrap_err();
    assert_eq!(err, Error::InvalidColor("ultraviolet".to_string()));
    assert!(pushes_in("colors").is_empty());
    assert!(nvmark::pop_range(Some("colors")).is_err());
}

/// Test the default domain and the empty-named domain are distinct.
#[test]
fn test_default_and_empty_domains() {
    backend();
    let default = nvmark::domain(None).unwrap();
    let empty = nvmark::domain(Some("")).unwrap();
    assert_ne!(default.handle(), empty.handle());
    assert_eq!(default.display_name(), "NVTX");
    assert!(Arc::ptr_eq(&default, &nvmark::domain(None).unwrap()));
}

/// Test registered strings reach the backend as registered messages.
#[test]
fn test_registered_strings() {
    backend();
    let domain = nvmark::domain(Some("registered")).unwrap();
    let frame = domain.register_string("frame");
    nvmark::mark(Annotation::new().registered(frame.clone()).domain("registered")).unwrap();

    let marks: Vec<_> = backend()
        .records_in(domain.handle())
        .into_iter()
        .filter_map(|r| match r {
            Record::Mark { attributes, .. } => Some(attributes),
            _ => None,
        })
        .collect();
    assert_eq!(marks[0].message(), Some(&Message::Registered(frame)));
}

/// Test thread naming is forwarded.
#[test]
fn test_name_thread() {
    backend();
    thread::Builder::new()
        .name("loader".to_string())
        .spawn(|| nvmark::name_thread("loader"))
        .unwrap()
        .join()
        .unwrap();
    assert!(backend()
        .records()
        .iter()
        .any(|r| matches!(r, Record::ThreadNamed { name, .. } if name == "loader")));
}

/// Test Annotate as a scope guard and as a function wrapper.
#[test]
fn test_annotate_both_modes() {
    backend();
    let region = Annotate::new(Annotation::new().message("scoped").domain("annotate")).unwrap();
    {
        let _guard = region.enter();
        nvmark::mark(Annotation::new().message("inside").domain("annotate")).unwrap();
    }

    fn compute() -> u64 {
        6 * 7
    }
    let traced = Annotate::new(Annotation::new().domain("annotate")).unwrap();
    let mut compute = traced.wrap(compute);
    assert_eq!(compute(), 42);
    assert_eq!(traced.message(), Some("compute"));

    assert_eq!(
        pushes_in("annotate"),
        vec![Some("scoped".to_string()), Some("compute".to_string())]
    );
    assert_eq!(pops_in("annotate").len(), 2);
}

/// Test a wrapped failure still pops and propagates.
#[test]
fn test_annotate_propagates_failure() {
    backend();
    let region = Annotate::new(Annotation::new().message("parse").domain("failures")).unwrap();
    let mut parse = region.wrap(|| "x".parse::<u32>());
    assert!(parse().is_err());
    assert_eq!(pops_in("failures"), vec![Some("parse".to_string())]);

    let unwound = std::panic::catch_unwind(|| {
        let region = Annotate::new(Annotation::new().message("panics").domain("failures")).unwrap();
        region.call(|| panic!("inside range"))
    });
    assert!(unwound.is_err());
    assert_eq!(pops_in("failures").len(), 2);
}

/// Test the serialized Annotate round trip.
#[test]
fn test_annotate_round_trip() {
    backend();
    let original = Annotate::new(
        Annotation::new()
            .message("foo")
            .color("blue")
            .domain("test")
            .category("lost"),
    )
    .unwrap();

    let json = serde_json::to_string(&original).unwrap();
    let restored: Annotate = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.message(), Some("foo"));
    assert_eq!(restored.color(), Some(&Color::from("blue")));
    assert_eq!(restored.domain(), Some("test"));
    assert_eq!(restored.attributes().and_then(|a| a.category()), None);
}
