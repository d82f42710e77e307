//! Range and mark emission over an explicit backend.
//!
//! [`Emitter`] is the active annotation strategy: each operation resolves
//! the domain through the registry and the attributes through the color
//! resolver and category table, then makes exactly one backend call. Only
//! the sub-resolutions are cached; nothing per call is.
//!
//! The emitter enforces the caller-visible contract the backend cannot
//! report on its own: a pop with nothing pushed by the calling thread in
//! that domain is an underflow, and ending a range id that is not
//! outstanding is an error.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nvmark::{Annotation, Annotator, Emitter, recording::RecordingBackend};
//!
//! let emitter = Emitter::new(Arc::new(RecordingBackend::new()));
//! emitter.push_range(&Annotation::new().message("outer").domain("demo"))?;
//! let id = emitter.start_range(&"async-io".into())?;
//! emitter.pop_range(Some("demo"))?;
//! emitter.end_range(id)?;
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::annotate::Annotate;
use crate::annotation::{Annotation, MessageArg};
use crate::attributes::{EventAttributes, Message};
use crate::backend::{Backend, RangeId};
use crate::color::{Color, ColorResolver};
use crate::domain::{Domain, DomainRegistry};
use crate::error::{Error, Result};
use crate::runtime::Annotator;

thread_local! {
    /// Open push/pop ranges of the current thread, by domain key.
    static DEPTHS: RefCell<HashMap<u64, usize>> = RefCell::new(HashMap::new());
}

struct EmitterInner {
    backend: Arc<dyn Backend>,
    domains: DomainRegistry,
    colors: ColorResolver,
    /// Outstanding start/end ranges.
    open: Mutex<HashSet<RangeId>>,
}

/// Active annotation strategy over one backend.
///
/// Cloning is cheap and clones share the registry, caches and open-range
/// set.
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

impl Emitter {
    /// Create an emitter with the default color resolver.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self::with_colors(backend, ColorResolver::new())
    }

    /// Create an emitter with a specific color resolver.
    pub fn with_colors(backend: Arc<dyn Backend>, colors: ColorResolver) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                domains: DomainRegistry::new(backend.clone()),
                backend,
                colors,
                open: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// The backend sink.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// The color resolver.
    pub fn colors(&self) -> &ColorResolver {
        &self.inner.colors
    }

    /// Get or create the domain for `name`.
    pub fn domain(&self, name: Option<&str>) -> Arc<Domain> {
        self.inner.domains.get_or_create(name)
    }

    /// The domain registry.
    pub fn domains(&self) -> &DomainRegistry {
        &self.inner.domains
    }

    /// Resolve an annotation into backend attributes for `domain`.
    pub fn attributes(&self, annotation: &Annotation<'_>, domain: &Domain) -> Result<EventAttributes> {
        let color = self.inner.colors.resolve(annotation.color.as_ref())?;
        let category = domain.resolve_category(annotation.category.as_ref());
        let message = annotation.message.as_ref().map(|message| match message {
            MessageArg::Registered(registered) if domain.owns(registered) => {
                Message::Registered(registered.clone())
            }
            other => Message::Text(Arc::from(other.as_str())),
        });
        Ok(EventAttributes::new(message, color, category).with_payload(annotation.payload))
    }

    fn resolve(&self, annotation: &Annotation<'_>) -> Result<(Arc<Domain>, EventAttributes)> {
        let domain = self.domain(annotation.domain_name());
        let attributes = self.attributes(annotation, &domain)?;
        Ok((domain, attributes))
    }

    /// Push already-resolved attributes.
    pub fn push_resolved(&self, domain: &Domain, attributes: &EventAttributes) {
        DEPTHS.with(|depths| *depths.borrow_mut().entry(domain.key()).or_insert(0) += 1);
        self.inner.backend.push_range(domain.handle(), attributes);
    }

    /// Pop the calling thread's innermost range in `domain`.
    pub fn pop_resolved(&self, domain: &Domain) -> Result<()> {
        let popped = DEPTHS.with(|depths| match depths.borrow_mut().get_mut(&domain.key()) {
            Some(depth) if *depth > 0 => {
                *depth -= 1;
                true
            }
            _ => false,
        });
        if !popped {
            return Err(Error::RangeStackUnderflow {
                domain: domain.display_name().to_string(),
            });
        }
        self.inner.backend.pop_range(domain.handle());
        Ok(())
    }

    /// Open push/pop ranges of the calling thread in `domain`.
    pub fn depth(&self, domain: &Domain) -> usize {
        DEPTHS.with(|depths| depths.borrow().get(&domain.key()).copied().unwrap_or(0))
    }

    /// Number of outstanding start/end ranges.
    pub fn open_ranges(&self) -> usize {
        self.inner.open.lock().len()
    }

    /// Build a reusable [`Annotate`] bound to this emitter.
    pub fn annotate<'a>(&self, annotation: impl Into<Annotation<'a>>) -> Result<Annotate> {
        Annotate::active(self.clone(), annotation.into())
    }
}

impl Annotator for Emitter {
    fn is_enabled(&self) -> bool {
        true
    }

    fn push_range(&self, annotation: &Annotation<'_>) -> Result<()> {
        let (domain, attributes) = self.resolve(annotation)?;
        self.push_resolved(&domain, &attributes);
        Ok(())
    }

    fn pop_range(&self, domain: Option<&str>) -> Result<()> {
        self.pop_resolved(&self.domain(domain))
    }

    fn start_range(&self, annotation: &Annotation<'_>) -> Result<RangeId> {
        let (domain, attributes) = self.resolve(annotation)?;
        let id = self.inner.backend.start_range(domain.handle(), &attributes);
        self.inner.open.lock().insert(id);
        Ok(id)
    }

    fn end_range(&self, id: RangeId) -> Result<()> {
        if !self.inner.open.lock().remove(&id) {
            return Err(Error::UnknownRangeId(id));
        }
        self.inner.backend.end_range(id);
        Ok(())
    }

    fn mark(&self, annotation: &Annotation<'_>) -> Result<()> {
        let (domain, attributes) = self.resolve(annotation)?;
        self.inner.backend.mark(domain.handle(), &attributes);
        Ok(())
    }

    fn name_thread(&self, name: &str) {
        self.inner.backend.name_thread(name);
    }

    fn resolve_color(&self, color: Option<&Color>) -> Result<u32> {
        self.inner.colors.resolve(color)
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("backend", &self.inner.backend.name())
            .field("domains", &self.inner.domains.len())
            .field("open_ranges", &self.open_ranges())
            .finish()
    }
}
