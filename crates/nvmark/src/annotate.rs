//! Reusable range annotation for scopes and functions.
//!
//! An [`Annotate`] resolves its domain, color and category once, at
//! construction. After that, entering it is a push and leaving it is a pop.
//! It can be used two ways over the same state:
//!
//! - scoped: [`Annotate::enter`] returns an [`AnnotateGuard`] that pops on
//!   drop, including while a panic unwinds; [`Annotate::call`] brackets a
//!   closure the same way
//! - as a wrapper: [`Annotate::wrap`] returns a new closure that pushes,
//!   calls the original, pops, and hands back the original result
//!
//! When no message was given, the first wrap fills it in from the wrapped
//! callable's name. The fill happens once per instance and is shared by all
//! clones.
//!
//! # Example
//!
//! ```ignore
//! use nvmark::{Annotate, Annotation};
//!
//! let region = Annotate::new(Annotation::new().message("solve").color("green"))?;
//! {
//!     let _guard = region.enter();
//!     // ... annotated work ...
//! }
//!
//! fn step(n: u32) -> u32 { n + 1 }
//! let traced = Annotate::new(Annotation::new().domain("sim"))?;
//! let mut step = traced.wrap_with(step);
//! assert_eq!(step(1), 2);
//! assert_eq!(traced.message(), Some("step"));
//! ```
//!
//! # Serialization
//!
//! An `Annotate` serializes as `{message, color, domain}`. Category and
//! payload are not part of the serialized form, so they are lost on a
//! round trip. Deserializing builds the instance against the process-wide
//! runtime.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::annotation::Annotation;
use crate::attributes::{EventAttributes, Message};
use crate::color::Color;
use crate::domain::Domain;
use crate::emitter::Emitter;
use crate::error::{Error, Result};
use crate::runtime;

/// Last path segment of a type name, ignoring closure and generic suffixes.
///
/// `my_crate::io::load` becomes `load`, `my_crate::run::{{closure}}` becomes
/// `run`, and `my_crate::decode<u8>` becomes `decode`.
pub(crate) fn short_type_name(full: &str) -> &str {
    let mut name = full;
    while let Some(stripped) = name.strip_suffix("::{{closure}}") {
        name = stripped;
    }

    let mut depth = 0usize;
    let mut start = 0;
    let mut end = name.len();
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                if depth == 0 {
                    end = i;
                }
                depth += 1;
            }
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                start = i + 2;
                end = name.len();
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    &name[start..end.max(start)]
}

/// Serialized form of an [`Annotate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AnnotateSpec {
    message: Option<String>,
    color: Option<Color>,
    domain: Option<String>,
}

impl AnnotateSpec {
    fn into_annotation(self) -> Annotation<'static> {
        let mut annotation = Annotation::new();
        if let Some(message) = self.message {
            annotation = annotation.message(message);
        }
        if let Some(color) = self.color {
            annotation = annotation.color(color);
        }
        if let Some(domain) = self.domain {
            annotation = annotation.domain(domain);
        }
        annotation
    }
}

/// State needed to emit; absent when annotation is disabled.
struct Active {
    emitter: Emitter,
    domain: Arc<Domain>,
    base: EventAttributes,
    /// `base` with the lazily filled message.
    named: OnceLock<EventAttributes>,
}

impl Active {
    fn attributes(&self) -> &EventAttributes {
        self.named.get().unwrap_or(&self.base)
    }
}

struct Inner {
    message: Option<String>,
    color: Option<Color>,
    domain: Option<String>,
    filled: OnceLock<String>,
    active: Option<Active>,
}

/// Pre-resolved range usable as a scope guard or a function wrapper.
///
/// Cloning shares the resolved state.
#[derive(Clone, Serialize, Deserialize)]
#[serde(into = "AnnotateSpec", try_from = "AnnotateSpec")]
pub struct Annotate {
    inner: Arc<Inner>,
}

impl Annotate {
    /// Build against the process-wide runtime.
    ///
    /// Fails with [`Error::InvalidColor`] when the color does not resolve.
    /// When annotation is disabled this never fails and the instance is
    /// inert.
    pub fn new<'a>(annotation: impl Into<Annotation<'a>>) -> Result<Self> {
        let annotation = annotation.into();
        match runtime::emitter() {
            Some(emitter) => Self::active(emitter.clone(), annotation),
            None => Ok(Self::inert(annotation)),
        }
    }

    /// Build against a specific emitter.
    pub(crate) fn active(emitter: Emitter, annotation: Annotation<'_>) -> Result<Self> {
        let domain = emitter.domain(annotation.domain_name());
        let base = emitter.attributes(&annotation, &domain)?;
        tracing::debug!(
            domain = domain.display_name(),
            text = base.message_text().unwrap_or_default(),
            "annotate resolved"
        );
        Ok(Self::from_parts(
            &annotation,
            Some(Active {
                emitter,
                domain,
                base,
                named: OnceLock::new(),
            }),
        ))
    }

    fn inert(annotation: Annotation<'_>) -> Self {
        Self::from_parts(&annotation, None)
    }

    fn from_parts(annotation: &Annotation<'_>, active: Option<Active>) -> Self {
        Self {
            inner: Arc::new(Inner {
                message: annotation.message_arg().map(|m| m.as_str().to_string()),
                color: annotation.color_arg().cloned(),
                domain: annotation.domain_name().map(str::to_string),
                filled: OnceLock::new(),
                active,
            }),
        }
    }

    /// Message given at construction, or filled in by the first wrap.
    pub fn message(&self) -> Option<&str> {
        self.inner
            .message
            .as_deref()
            .or_else(|| self.inner.filled.get().map(String::as_str))
    }

    /// Color as given at construction.
    pub fn color(&self) -> Option<&Color> {
        self.inner.color.as_ref()
    }

    /// Domain name as given at construction.
    pub fn domain(&self) -> Option<&str> {
        self.inner.domain.as_deref()
    }

    /// Whether entering this annotation emits anything.
    pub fn is_enabled(&self) -> bool {
        self.inner.active.is_some()
    }

    /// Attributes pushed on entry; `None` when disabled.
    pub fn attributes(&self) -> Option<&EventAttributes> {
        self.inner.active.as_ref().map(Active::attributes)
    }

    /// Push the range; the returned guard pops it.
    pub fn enter(&self) -> AnnotateGuard<'_> {
        if let Some(active) = &self.inner.active {
            active.emitter.push_resolved(&active.domain, active.attributes());
        }
        AnnotateGuard {
            annotate: self,
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside the range.
    pub fn call<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }

    /// Wrap a callable so that every invocation runs inside the range.
    pub fn wrap<F, R>(&self, mut f: F) -> impl FnMut() -> R
    where
        F: FnMut() -> R,
    {
        self.fill(short_type_name(type_name::<F>()));
        let annotate = self.clone();
        move || annotate.call(&mut f)
    }

    /// [`Annotate::wrap`] for a single-argument callable.
    pub fn wrap_with<F, A, R>(&self, mut f: F) -> impl FnMut(A) -> R
    where
        F: FnMut(A) -> R,
    {
        self.fill(short_type_name(type_name::<F>()));
        let annotate = self.clone();
        move |arg: A| annotate.call(|| f(arg))
    }

    /// [`Annotate::wrap`] with an explicit name for the lazy message.
    pub fn wrap_named<F, R>(&self, name: &str, mut f: F) -> impl FnMut() -> R
    where
        F: FnMut() -> R,
    {
        self.fill(name);
        let annotate = self.clone();
        move || annotate.call(&mut f)
    }

    fn fill(&self, name: &str) {
        if self.inner.message.is_some() {
            return;
        }
        let filled = self.inner.filled.get_or_init(|| name.to_string());
        if let Some(active) = &self.inner.active {
            active
                .named
                .get_or_init(|| active.base.with_message(Message::Text(Arc::from(filled.as_str()))));
        }
    }
}

impl fmt::Debug for Annotate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Annotate")
            .field("message", &self.message())
            .field("color", &self.inner.color)
            .field("domain", &self.inner.domain)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl From<Annotate> for AnnotateSpec {
    fn from(annotate: Annotate) -> Self {
        AnnotateSpec {
            message: annotate.message().map(str::to_string),
            color: annotate.inner.color.clone(),
            domain: annotate.inner.domain.clone(),
        }
    }
}

impl TryFrom<AnnotateSpec> for Annotate {
    type Error = Error;

    fn try_from(spec: AnnotateSpec) -> Result<Self> {
        Annotate::new(spec.into_annotation())
    }
}

/// Open range of an [`Annotate`]; pops on drop.
///
/// Must be dropped on the thread that created it.
#[must_use = "the range is popped as soon as the guard is dropped"]
pub struct AnnotateGuard<'a> {
    annotate: &'a Annotate,
    _not_send: PhantomData<*const ()>,
}

impl Drop for AnnotateGuard<'_> {
    fn drop(&mut self) {
        if let Some(active) = &self.annotate.inner.active {
            if let Err(e) = active.emitter.pop_resolved(&active.domain) {
                tracing::warn!(error = %e, "annotate guard pop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Record, RecordingBackend};
    use std::panic::{self, AssertUnwindSafe};

    fn setup() -> (Arc<RecordingBackend>, Emitter) {
        let backend = Arc::new(RecordingBackend::new());
        let emitter = Emitter::new(backend.clone());
        (backend, emitter)
    }

    fn count(backend: &RecordingBackend, push: bool) -> usize {
        backend
            .records()
            .iter()
            .filter(|r| {
                if push {
                    matches!(r, Record::Push { .. })
                } else {
                    matches!(r, Record::Pop { .. })
                }
            })
            .count()
    }

    fn foo() -> i32 {
        42
    }

    fn bar() -> i32 {
        7
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("my_crate::io::load"), "load");
        assert_eq!(short_type_name("load"), "load");
        assert_eq!(short_type_name("my_crate::run::{{closure}}"), "run");
        assert_eq!(short_type_name("my_crate::run::{{closure}}::{{closure}}"), "run");
        assert_eq!(short_type_name("my_crate::decode<alloc::string::String>"), "decode");
    }

    #[test]
    fn test_scoped_push_pop() {
        let (backend, emitter) = setup();
        let region = emitter.annotate(Annotation::new().message("region").domain("scoped")).unwrap();
        {
            let _guard = region.enter();
            assert_eq!(emitter.depth(&emitter.domain(Some("scoped"))), 1);
        }
        assert_eq!(emitter.depth(&emitter.domain(Some("scoped"))), 0);

        let domain = emitter.domain(Some("scoped"));
        let pops: Vec<Option<String>> = backend
            .records_in(domain.handle())
            .into_iter()
            .filter_map(|r| match r {
                Record::Pop { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(pops, vec![Some("region".to_string())]);
    }

    #[test]
    fn test_category_resolved_at_construction() {
        let (_, emitter) = setup();
        let region = emitter
            .annotate(Annotation::new().domain("cats").category("hot"))
            .unwrap();
        let domain = emitter.domain(Some("cats"));
        assert_eq!(domain.category_count(), 1);

        for _ in 0..3 {
            region.call(|| ());
        }
        assert_eq!(domain.category_count(), 1);
        assert_eq!(region.attributes().and_then(EventAttributes::category), Some(1));
    }

    #[test]
    fn test_invalid_color_fails_construction() {
        let (_, emitter) = setup();
        let err = emitter.annotate(Annotation::new().color("no-such-color")).unwrap_err();
        assert_eq!(err, Error::InvalidColor("no-such-color".to_string()));
    }

    #[test]
    fn test_lazy_fill() {
        let (backend, emitter) = setup();
        let traced = emitter.annotate(Annotation::new()).unwrap();
        assert_eq!(traced.message(), None);

        let mut wrapped = traced.wrap(foo);
        assert_eq!(traced.message(), Some("foo"));
        assert_eq!(wrapped(), 42);
        assert_eq!(wrapped(), 42);

        // A second wrap does not rename.
        let mut other = traced.wrap(bar);
        assert_eq!(other(), 7);
        assert_eq!(traced.message(), Some("foo"));

        let pushed: Vec<Option<String>> = backend
            .records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Push { attributes, .. } => Some(attributes.message_text().map(str::to_string)),
                _ => None,
            })
            .collect();
        assert_eq!(pushed, vec![Some("foo".to_string()); 3]);
    }

    #[test]
    fn test_explicit_message_not_replaced() {
        let (_, emitter) = setup();
        let traced = emitter.annotate("explicit").unwrap();
        let mut wrapped = traced.wrap(foo);
        wrapped();
        assert_eq!(traced.message(), Some("explicit"));
    }

    #[test]
    fn test_wrap_named_and_with() {
        let (_, emitter) = setup();
        let named = emitter.annotate(Annotation::new()).unwrap();
        let mut f = named.wrap_named("custom", || 1);
        assert_eq!(f(), 1);
        assert_eq!(named.message(), Some("custom"));

        let with_arg = emitter.annotate(Annotation::new()).unwrap();
        let mut double = with_arg.wrap_with(|n: u32| n * 2);
        assert_eq!(double(21), 42);
        assert_eq!(with_arg.message(), Some("test_wrap_named_and_with"));
    }

    #[test]
    fn test_panic_still_pops() {
        let (backend, emitter) = setup();
        let region = emitter.annotate(Annotation::new().message("boom").domain("panics")).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| region.call(|| panic!("boom"))));
        assert!(result.is_err());

        let domain = emitter.domain(Some("panics"));
        assert_eq!(emitter.depth(&domain), 0);
        assert_eq!(count(&backend, true), 1);
        assert_eq!(count(&backend, false), 1);
    }

    #[test]
    fn test_err_still_pops_and_propagates() {
        let (backend, emitter) = setup();
        let region = emitter.annotate("fallible").unwrap();
        let mut fails = region.wrap(|| -> std::result::Result<(), String> { Err("bad input".to_string()) });

        assert_eq!(fails(), Err("bad input".to_string()));
        assert_eq!(count(&backend, true), 1);
        assert_eq!(count(&backend, false), 1);
    }

    #[test]
    fn test_nested_enter() {
        let (backend, emitter) = setup();
        let outer = emitter.annotate("outer").unwrap();
        let inner = emitter.annotate("inner").unwrap();
        outer.call(|| inner.call(|| ()));

        let pops: Vec<Option<String>> = backend
            .records()
            .into_iter()
            .filter_map(|r| match r {
                Record::Pop { message, .. } => Some(message),
                _ => None,
            })
            .collect();
        assert_eq!(pops, vec![Some("inner".to_string()), Some("outer".to_string())]);
    }

    #[test]
    fn test_serialized_form() {
        let (_, emitter) = setup();
        let annotate = emitter
            .annotate(
                Annotation::new()
                    .message("foo")
                    .color("blue")
                    .domain("test")
                    .category("dropped"),
            )
            .unwrap();

        let json = serde_json::to_value(&annotate).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"message": "foo", "color": "blue", "domain": "test"})
        );
    }

    #[test]
    fn test_round_trip() {
        let original = Annotate::new(Annotation::new().message("foo").color("blue").domain("test")).unwrap();
        let json = serde_json::to_string(&original).unwrap();
        let restored: Annotate = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.message(), original.message());
        assert_eq!(restored.color(), original.color());
        assert_eq!(restored.domain(), original.domain());
    }

    #[test]
    fn test_deserialize_invalid_color() {
        let (backend, emitter) = setup();
        let spec: AnnotateSpec =
            serde_json::from_str(r#"{"message": "x", "color": "not-a-color", "domain": "restored"}"#).unwrap();

        let err = Annotate::active(emitter, spec.into_annotation()).unwrap_err();
        assert_eq!(err, Error::InvalidColor("not-a-color".to_string()));
        assert!(backend.records().iter().all(|r| !matches!(r, Record::Push { .. })));
    }

    #[test]
    fn test_spec_restores_fields() {
        let (_, emitter) = setup();
        let spec: AnnotateSpec =
            serde_json::from_str(r#"{"message": "foo", "color": 255, "domain": null}"#).unwrap();

        let restored = Annotate::active(emitter, spec.into_annotation()).unwrap();
        assert_eq!(restored.message(), Some("foo"));
        assert_eq!(restored.color(), Some(&Color::Argb(255)));
        assert_eq!(restored.domain(), None);
        assert_eq!(restored.attributes().map(EventAttributes::color), Some(255));
    }

    #[test]
    fn test_inert_annotate() {
        let region = Annotate::inert(Annotation::new().color("not-a-color"));
        assert!(!region.is_enabled());
        assert!(region.attributes().is_none());
        assert_eq!(region.call(|| 5), 5);

        let mut wrapped = region.wrap(foo);
        assert_eq!(wrapped(), 42);
        assert_eq!(region.message(), Some("foo"));
    }
}
