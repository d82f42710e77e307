//! # nvmark
//!
//! Named, colored, nested range and marker annotations for external
//! profiling tools.
//!
//! Code is annotated with ranges (intervals with a start and an end) and
//! marks (instants). Each annotation carries a message, a color, a domain
//! that isolates one subsystem's annotations from another's, an optional
//! category within that domain, and an optional numeric payload. A
//! [`Backend`] receives the fully resolved records.
//!
//! ## Features
//!
//! - Push/pop ranges that nest per thread and domain
//! - Start/end ranges that may cross threads and overlap
//! - Marks for instantaneous events
//! - [`Annotate`]: a pre-resolved range usable as a scope guard or a
//!   function wrapper
//! - [`profiler`]: one range per instrumented function call
//! - A process-wide on/off switch that turns every operation into a no-op
//!
//! ## Example
//!
//! ```ignore
//! use nvmark::{Annotate, Annotation};
//!
//! nvmark::push_range(Annotation::new().message("load").color("green").domain("io"))?;
//! nvmark::mark("opened")?;
//! nvmark::pop_range(Some("io"))?;
//!
//! let id = nvmark::start_range("prefetch")?;
//! // ... possibly on another thread ...
//! nvmark::end_range(id)?;
//!
//! let region = Annotate::new("solve")?;
//! region.call(|| solve());
//! ```
//!
//! ## Configuration
//!
//! Without an explicit [`init`], the first annotation reads the
//! environment (see [`runtime`]). Setting `NVMARK_DISABLE` makes every
//! operation a no-op that never fails.

#![warn(missing_docs)]

pub mod annotate;
pub mod annotation;
pub mod attributes;
pub mod backend;
pub mod color;
pub mod domain;
pub mod emitter;
pub mod error;
pub mod profiler;
pub mod recording;
pub mod runtime;

pub use annotate::{Annotate, AnnotateGuard};
pub use annotation::{Annotation, MessageArg};
pub use attributes::{Category, EventAttributes, Message, Payload, RegisteredString};
pub use backend::{Backend, DomainHandle, LogBackend, NullBackend, RangeId};
pub use color::{Color, ColorResolver, NamedColors};
pub use domain::{Domain, DomainRegistry};
pub use emitter::Emitter;
pub use error::{Error, Result};
pub use runtime::{enabled, init, Annotator, BackendKind, Config, Inert};

/// Push a range on the calling thread's stack for the annotation's domain.
pub fn push_range<'a>(annotation: impl Into<Annotation<'a>>) -> Result<()> {
    runtime::annotator().push_range(&annotation.into())
}

/// Pop the calling thread's innermost range in `domain`.
///
/// Fails with [`Error::RangeStackUnderflow`] when this thread has no open
/// range in that domain.
pub fn pop_range(domain: Option<&str>) -> Result<()> {
    runtime::annotator().pop_range(domain)
}

/// Start a range that may be ended from any thread, in any order.
pub fn start_range<'a>(annotation: impl Into<Annotation<'a>>) -> Result<RangeId> {
    runtime::annotator().start_range(&annotation.into())
}

/// End a range returned by [`start_range`].
///
/// Fails with [`Error::UnknownRangeId`] when the id is not outstanding.
pub fn end_range(id: RangeId) -> Result<()> {
    runtime::annotator().end_range(id)
}

/// Emit an instantaneous marker.
pub fn mark<'a>(annotation: impl Into<Annotation<'a>>) -> Result<()> {
    runtime::annotator().mark(&annotation.into())
}

/// Name the calling thread in the profiling tool.
pub fn name_thread(name: &str) {
    runtime::annotator().name_thread(name)
}

/// Get or create a domain in the process-wide registry.
///
/// `None` when annotation is disabled.
pub fn domain(name: Option<&str>) -> Option<std::sync::Arc<Domain>> {
    runtime::emitter().map(|emitter| emitter.domain(name))
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::annotate::{Annotate, AnnotateGuard};
    pub use crate::annotation::Annotation;
    pub use crate::attributes::{Category, Payload};
    pub use crate::backend::RangeId;
    pub use crate::color::Color;
    pub use crate::error::{Error, Result};
    pub use crate::profile_scope;
    pub use crate::profiler::{ProfilerConfig, ProfilerHandle};
    pub use crate::runtime::Annotator;
}
