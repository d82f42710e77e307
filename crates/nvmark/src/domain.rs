//! Domain registry: one shared domain per distinct name.
//!
//! Domains are interned. Asking the registry for the same name twice yields
//! the same [`Domain`] (same backend handle, same category table). Entries
//! are never removed; a registry lives as long as the emitter that owns it,
//! which for the process-wide emitter is the whole process.
//!
//! The default domain (`None`) and the empty-named domain (`Some("")`) are
//! distinct entries.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nvmark::{backend::NullBackend, domain::DomainRegistry};
//!
//! let registry = DomainRegistry::new(Arc::new(NullBackend::new()));
//! let a = registry.get_or_create(Some("io"));
//! let b = registry.get_or_create(Some("io"));
//! assert!(Arc::ptr_eq(&a, &b));
//!
//! let disk = a.get_category_id("disk");
//! assert_eq!(disk, 1);
//! assert_eq!(b.get_category_id("disk"), disk);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::attributes::{Category, RegisteredString, NO_CATEGORY};
use crate::backend::{Backend, DomainHandle};

/// Display name of the default domain.
pub const DEFAULT_DOMAIN_NAME: &str = "NVTX";

/// Display name for a requested domain name.
pub fn display_name(name: Option<&str>) -> &str {
    name.unwrap_or(DEFAULT_DOMAIN_NAME)
}

/// Process-unique domain keys, independent of backend handles.
static NEXT_DOMAIN_KEY: AtomicU64 = AtomicU64::new(1);

/// Category name table of one domain.
#[derive(Debug)]
struct CategoryTable {
    ids: HashMap<String, u32>,
    next: u32,
}

/// A namespace for ranges, marks and categories.
pub struct Domain {
    /// Process-unique key.
    key: u64,
    /// Requested name; `None` for the default domain.
    name: Option<String>,
    /// Backend handle.
    handle: DomainHandle,
    /// Backend that issued the handle.
    backend: Arc<dyn Backend>,
    /// Category name to id, append-only.
    categories: RwLock<CategoryTable>,
    /// Registered strings by text.
    strings: RwLock<HashMap<String, RegisteredString>>,
}

impl Domain {
    fn new(name: Option<&str>, backend: Arc<dyn Backend>) -> Self {
        let handle = backend.create_domain(name);
        tracing::debug!(domain = display_name(name), handle = handle.0, "domain created");
        Self {
            key: NEXT_DOMAIN_KEY.fetch_add(1, Ordering::Relaxed),
            name: name.map(str::to_string),
            handle,
            backend,
            categories: RwLock::new(CategoryTable {
                ids: HashMap::new(),
                next: 1,
            }),
            strings: RwLock::new(HashMap::new()),
        }
    }

    /// Requested name; `None` for the default domain.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> &str {
        display_name(self.name())
    }

    /// Backend handle.
    pub fn handle(&self) -> DomainHandle {
        self.handle
    }

    /// Process-unique key.
    pub(crate) fn key(&self) -> u64 {
        self.key
    }

    /// Stable id for a category name, assigned on first sight.
    ///
    /// Ids start at 1 and increase by one per new name. A name keeps its id
    /// for the lifetime of the domain.
    pub fn get_category_id(&self, name: &str) -> u32 {
        if let Some(id) = self.categories.read().ids.get(name) {
            return *id;
        }

        let mut table = self.categories.write();
        if let Some(id) = table.ids.get(name) {
            return *id;
        }
        let id = table.next;
        table.next += 1;
        table.ids.insert(name.to_string(), id);
        self.backend.name_category(self.handle, id, name);
        tracing::debug!(domain = self.display_name(), category = name, id, "category assigned");
        id
    }

    /// Number of named categories.
    pub fn category_count(&self) -> usize {
        self.categories.read().ids.len()
    }

    /// Map a caller category to an id.
    pub(crate) fn resolve_category(&self, category: Option<&Category<'_>>) -> u32 {
        match category {
            None => NO_CATEGORY,
            Some(Category::Id(id)) => *id,
            Some(Category::Name(name)) => self.get_category_id(name),
        }
    }

    /// Register a message string with the backend, once per text.
    pub fn register_string(&self, text: &str) -> RegisteredString {
        if let Some(registered) = self.strings.read().get(text) {
            return registered.clone();
        }

        let mut strings = self.strings.write();
        strings
            .entry(text.to_string())
            .or_insert_with(|| RegisteredString {
                handle: self.backend.register_string(self.handle, text),
                domain_key: self.key,
                text: Arc::from(text),
            })
            .clone()
    }

    /// Whether `registered` belongs to this domain.
    pub fn owns(&self, registered: &RegisteredString) -> bool {
        registered.domain_key == self.key
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

/// Interning registry of domains.
pub struct DomainRegistry {
    backend: Arc<dyn Backend>,
    default: OnceLock<Arc<Domain>>,
    named: RwLock<HashMap<String, Arc<Domain>>>,
}

impl DomainRegistry {
    /// Create an empty registry over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            default: OnceLock::new(),
            named: RwLock::new(HashMap::new()),
        }
    }

    /// Get the domain for `name`, creating it on first reference.
    ///
    /// Concurrent first lookups of one name converge on a single domain;
    /// the backend handle is acquired exactly once per name.
    pub fn get_or_create(&self, name: Option<&str>) -> Arc<Domain> {
        let Some(name) = name else {
            return self
                .default
                .get_or_init(|| Arc::new(Domain::new(None, self.backend.clone())))
                .clone();
        };

        if let Some(domain) = self.named.read().get(name) {
            return domain.clone();
        }

        self.named
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Domain::new(Some(name), self.backend.clone())))
            .clone()
    }

    /// Number of domains created.
    pub fn len(&self) -> usize {
        self.named.read().len() + usize::from(self.default.get().is_some())
    }

    /// Whether no domain has been created.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Record, RecordingBackend};
    use std::thread;

    fn registry() -> (Arc<RecordingBackend>, DomainRegistry) {
        let backend = Arc::new(RecordingBackend::new());
        let registry = DomainRegistry::new(backend.clone());
        (backend, registry)
    }

    #[test]
    fn test_domain_reuse() {
        let (_, registry) = registry();
        let a = registry.get_or_create(Some("x"));
        let b = registry.get_or_create(Some("x"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.handle(), b.handle());

        let c = registry.get_or_create(Some("y"));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_ne!(a.handle(), c.handle());
    }

    #[test]
    fn test_default_and_empty_are_distinct() {
        let (_, registry) = registry();
        let default = registry.get_or_create(None);
        let empty = registry.get_or_create(Some(""));
        assert!(!Arc::ptr_eq(&default, &empty));
        assert!(Arc::ptr_eq(&default, &registry.get_or_create(None)));
        assert!(Arc::ptr_eq(&empty, &registry.get_or_create(Some(""))));
        assert_eq!(default.display_name(), DEFAULT_DOMAIN_NAME);
        assert_eq!(empty.display_name(), "");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_category_id() {
        let (_, registry) = registry();
        let dom = registry.get_or_create(Some("foo"));
        let id1 = dom.get_category_id("bar");
        let id2 = dom.get_category_id("bar");
        assert_eq!(id1, id2);
        assert_eq!(id1, 1);
        let id3 = dom.get_category_id("baz");
        assert_ne!(id2, id3);
        assert_eq!(id3, 2);
        assert_eq!(dom.category_count(), 2);
    }

    #[test]
    fn test_categories_are_per_domain() {
        let (_, registry) = registry();
        let a = registry.get_or_create(Some("a"));
        let b = registry.get_or_create(Some("b"));
        a.get_category_id("first");
        assert_eq!(a.get_category_id("second"), 2);
        assert_eq!(b.get_category_id("second"), 1);
    }

    #[test]
    fn test_category_named_once() {
        let (backend, registry) = registry();
        let dom = registry.get_or_create(Some("named"));
        dom.get_category_id("disk");
        dom.get_category_id("disk");

        let named: Vec<Record> = backend
            .records_in(dom.handle())
            .into_iter()
            .filter(|r| matches!(r, Record::CategoryNamed { .. }))
            .collect();
        assert_eq!(
            named,
            vec![Record::CategoryNamed {
                domain: dom.handle(),
                id: 1,
                name: "disk".to_string()
            }]
        );
    }

    #[test]
    fn test_resolve_category() {
        let (_, registry) = registry();
        let dom = registry.get_or_create(Some("cat"));
        assert_eq!(dom.resolve_category(None), NO_CATEGORY);
        assert_eq!(dom.resolve_category(Some(&Category::Id(7))), 7);
        assert_eq!(dom.resolve_category(Some(&Category::from("net"))), 1);
        assert_eq!(dom.resolve_category(Some(&Category::from("net"))), 1);
    }

    #[test]
    fn test_register_string_interned() {
        let (backend, registry) = registry();
        let dom = registry.get_or_create(Some("strings"));
        let a = dom.register_string("hot loop");
        let b = dom.register_string("hot loop");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "hot loop");
        assert!(dom.owns(&a));

        let other = registry.get_or_create(Some("other"));
        assert!(!other.owns(&a));

        let registrations = backend
            .records()
            .into_iter()
            .filter(|r| matches!(r, Record::StringRegistered { .. }))
            .count();
        assert_eq!(registrations, 1);
    }

    #[test]
    fn test_concurrent_creation_converges() {
        let (backend, registry) = registry();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    let domain = registry.get_or_create(Some("shared"));
                    let id = domain.get_category_id("contended");
                    (domain.handle(), id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));

        let created = backend
            .records()
            .into_iter()
            .filter(|r| matches!(r, Record::DomainCreated { .. }))
            .count();
        assert_eq!(created, 1);
    }
}
