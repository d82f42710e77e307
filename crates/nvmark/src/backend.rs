//! Backend sinks that receive resolved annotation records.
//!
//! The backend is the single point of contact with the profiling tool. It
//! receives fully resolved [`EventAttributes`] and opaque domain handles,
//! and hands out range ids for start/end ranges. Push/pop stacks are keyed
//! by the calling thread on the backend side; this crate guarantees that a
//! thread never pops a range it did not push.
//!
//! Sinks shipped here:
//!
//! - [`NullBackend`] discards everything (no tool attached)
//! - [`LogBackend`] forwards every record to `tracing`
//! - [`RecordingBackend`](crate::recording::RecordingBackend) keeps records
//!   in memory

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::attributes::EventAttributes;

/// Opaque backend handle for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainHandle(pub u64);

/// Opaque identifier of a start/end range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeId(pub u64);

impl RangeId {
    /// Id returned when annotation is disabled.
    pub const NULL: Self = Self(0);

    /// Whether this is the null id.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marker-emission sink.
///
/// Implement this trait to connect annotations to a specific profiling
/// tool. Methods are called synchronously on the annotating thread.
pub trait Backend: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Acquire the handle for a domain. `None` is the default domain.
    ///
    /// Called at most once per distinct name by the domain registry.
    fn create_domain(&self, name: Option<&str>) -> DomainHandle;

    /// Announce the name of a category id within a domain.
    fn name_category(&self, _domain: DomainHandle, _id: u32, _name: &str) {}

    /// Register a message string in a domain, returning a backend handle.
    fn register_string(&self, _domain: DomainHandle, _text: &str) -> u64 {
        0
    }

    /// Name the calling OS thread.
    fn name_thread(&self, _name: &str) {}

    /// Push a range on the calling thread's stack for `domain`.
    fn push_range(&self, domain: DomainHandle, attributes: &EventAttributes);

    /// Pop the top range of the calling thread's stack for `domain`.
    fn pop_range(&self, domain: DomainHandle);

    /// Start a range not tied to stack discipline.
    fn start_range(&self, domain: DomainHandle, attributes: &EventAttributes) -> RangeId;

    /// End a range returned by [`Backend::start_range`].
    fn end_range(&self, id: RangeId);

    /// Emit an instantaneous marker.
    fn mark(&self, domain: DomainHandle, attributes: &EventAttributes);
}

/// Monotonic handle source shared by the in-crate backends.
#[derive(Debug)]
pub(crate) struct HandleCounter(AtomicU64);

impl HandleCounter {
    pub(crate) const fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub(crate) fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Backend that discards every record.
#[derive(Debug)]
pub struct NullBackend {
    handles: HandleCounter,
}

impl NullBackend {
    /// Create a new null backend.
    pub fn new() -> Self {
        Self {
            handles: HandleCounter::new(),
        }
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn create_domain(&self, _name: Option<&str>) -> DomainHandle {
        DomainHandle(self.handles.next())
    }

    fn push_range(&self, _domain: DomainHandle, _attributes: &EventAttributes) {}

    fn pop_range(&self, _domain: DomainHandle) {}

    fn start_range(&self, _domain: DomainHandle, _attributes: &EventAttributes) -> RangeId {
        RangeId(self.handles.next())
    }

    fn end_range(&self, _id: RangeId) {}

    fn mark(&self, _domain: DomainHandle, _attributes: &EventAttributes) {}
}

/// Backend that emits every record as a `tracing` event.
///
/// Ranges and marks go out at `trace`, domain and category naming at
/// `debug`, all under the `nvmark::backend` target.
#[derive(Debug)]
pub struct LogBackend {
    handles: HandleCounter,
    /// Display names by handle.
    domains: RwLock<HashMap<DomainHandle, String>>,
}

impl LogBackend {
    /// Create a new log backend.
    pub fn new() -> Self {
        Self {
            handles: HandleCounter::new(),
            domains: RwLock::new(HashMap::new()),
        }
    }

    fn domain_name(&self, domain: DomainHandle) -> String {
        self.domains
            .read()
            .get(&domain)
            .cloned()
            .unwrap_or_else(|| format!("#{}", domain.0))
    }
}

impl Default for LogBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for LogBackend {
    fn name(&self) -> &'static str {
        "log"
    }

    fn create_domain(&self, name: Option<&str>) -> DomainHandle {
        let handle = DomainHandle(self.handles.next());
        let shown = crate::domain::display_name(name).to_string();
        tracing::debug!(target: "nvmark::backend", domain = %shown, handle = handle.0, "domain created");
        self.domains.write().insert(handle, shown);
        handle
    }

    fn name_category(&self, domain: DomainHandle, id: u32, name: &str) {
        tracing::debug!(
            target: "nvmark::backend",
            domain = %self.domain_name(domain),
            id,
            name,
            "category named"
        );
    }

    fn register_string(&self, domain: DomainHandle, text: &str) -> u64 {
        let handle = self.handles.next();
        tracing::debug!(
            target: "nvmark::backend",
            domain = %self.domain_name(domain),
            handle,
            text,
            "string registered"
        );
        handle
    }

    fn name_thread(&self, name: &str) {
        tracing::debug!(target: "nvmark::backend", name, "thread named");
    }

    fn push_range(&self, domain: DomainHandle, attributes: &EventAttributes) {
        tracing::trace!(
            target: "nvmark::backend",
            domain = %self.domain_name(domain),
            text = attributes.message_text().unwrap_or_default(),
            color = attributes.color(),
            category = attributes.category_id(),
            payload = ?attributes.payload(),
            "push"
        );
    }

    fn pop_range(&self, domain: DomainHandle) {
        tracing::trace!(target: "nvmark::backend", domain = %self.domain_name(domain), "pop");
    }

    fn start_range(&self, domain: DomainHandle, attributes: &EventAttributes) -> RangeId {
        let id = RangeId(self.handles.next());
        tracing::trace!(
            target: "nvmark::backend",
            domain = %self.domain_name(domain),
            id = id.0,
            text = attributes.message_text().unwrap_or_default(),
            color = attributes.color(),
            category = attributes.category_id(),
            payload = ?attributes.payload(),
            "start"
        );
        id
    }

    fn end_range(&self, id: RangeId) {
        tracing::trace!(target: "nvmark::backend", id = id.0, "end");
    }

    fn mark(&self, domain: DomainHandle, attributes: &EventAttributes) {
        tracing::trace!(
            target: "nvmark::backend",
            domain = %self.domain_name(domain),
            text = attributes.message_text().unwrap_or_default(),
            color = attributes.color(),
            category = attributes.category_id(),
            payload = ?attributes.payload(),
            "mark"
        );
    }
}
