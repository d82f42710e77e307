//! In-memory backend that records every annotation.
//!
//! Useful for tests and for embedders that post-process annotations
//! themselves. The recorder mirrors backend bookkeeping: push/pop stacks per
//! thread and domain, and the set of open start/end ranges, so a pop record
//! names the range it closed.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::attributes::EventAttributes;
use crate::backend::{Backend, DomainHandle, HandleCounter, RangeId};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A domain handle was acquired.
    DomainCreated {
        /// New handle.
        domain: DomainHandle,
        /// Requested name.
        name: Option<String>,
    },
    /// A category id was named.
    CategoryNamed {
        /// Owning domain.
        domain: DomainHandle,
        /// Category id.
        id: u32,
        /// Category name.
        name: String,
    },
    /// A string was registered.
    StringRegistered {
        /// Owning domain.
        domain: DomainHandle,
        /// Handle returned.
        handle: u64,
        /// Registered text.
        text: String,
    },
    /// A thread was named.
    ThreadNamed {
        /// Named thread.
        thread: ThreadId,
        /// Thread name.
        name: String,
    },
    /// A push/pop range was pushed.
    Push {
        /// Domain.
        domain: DomainHandle,
        /// Pushing thread.
        thread: ThreadId,
        /// Attributes.
        attributes: EventAttributes,
    },
    /// A push/pop range was popped.
    Pop {
        /// Domain.
        domain: DomainHandle,
        /// Popping thread.
        thread: ThreadId,
        /// Message of the range that was closed.
        message: Option<String>,
    },
    /// A start/end range was started.
    Start {
        /// Domain.
        domain: DomainHandle,
        /// Id handed out.
        id: RangeId,
        /// Attributes.
        attributes: EventAttributes,
    },
    /// A start/end range was ended.
    End {
        /// Id ended.
        id: RangeId,
        /// Message of the range that was closed.
        message: Option<String>,
    },
    /// A marker was emitted.
    Mark {
        /// Domain.
        domain: DomainHandle,
        /// Emitting thread.
        thread: ThreadId,
        /// Attributes.
        attributes: EventAttributes,
    },
}

impl Record {
    /// Domain the record belongs to, if it has one.
    pub fn domain(&self) -> Option<DomainHandle> {
        match self {
            Record::DomainCreated { domain, .. }
            | Record::CategoryNamed { domain, .. }
            | Record::StringRegistered { domain, .. }
            | Record::Push { domain, .. }
            | Record::Pop { domain, .. }
            | Record::Start { domain, .. }
            | Record::Mark { domain, .. } => Some(*domain),
            Record::ThreadNamed { .. } | Record::End { .. } => None,
        }
    }
}

/// Backend that keeps every call in memory.
#[derive(Debug)]
pub struct RecordingBackend {
    handles: HandleCounter,
    records: Mutex<Vec<Record>>,
    /// Open push/pop ranges per thread and domain.
    stacks: Mutex<HashMap<(ThreadId, DomainHandle), Vec<Option<String>>>>,
    /// Open start/end ranges.
    open: Mutex<HashMap<RangeId, (DomainHandle, Option<String>)>>,
}

impl RecordingBackend {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            handles: HandleCounter::new(),
            records: Mutex::new(Vec::new()),
            stacks: Mutex::new(HashMap::new()),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Snapshot of all records.
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Snapshot of the records belonging to `domain`, plus the `End`
    /// records of ranges started in it.
    pub fn records_in(&self, domain: DomainHandle) -> Vec<Record> {
        let records = self.records.lock();
        let started: Vec<RangeId> = records
            .iter()
            .filter_map(|r| match r {
                Record::Start { domain: d, id, .. } if *d == domain => Some(*id),
                _ => None,
            })
            .collect();
        records
            .iter()
            .filter(|r| match r {
                Record::End { id, .. } => started.contains(id),
                other => other.domain() == Some(domain),
            })
            .cloned()
            .collect()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Depth of the calling thread's stack in `domain`.
    pub fn depth(&self, domain: DomainHandle) -> usize {
        self.stacks
            .lock()
            .get(&(thread::current().id(), domain))
            .map_or(0, Vec::len)
    }

    /// Number of start/end ranges not yet ended.
    pub fn open_ranges(&self) -> usize {
        self.open.lock().len()
    }

    /// Drop all records and open state.
    pub fn clear(&self) {
        self.records.lock().clear();
        self.stacks.lock().clear();
        self.open.lock().clear();
    }

    fn record(&self, record: Record) {
        self.records.lock().push(record);
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn owned_message(attributes: &EventAttributes) -> Option<String> {
    attributes.message_text().map(str::to_string)
}

impl Backend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn create_domain(&self, name: Option<&str>) -> DomainHandle {
        let domain = DomainHandle(self.handles.next());
        self.record(Record::DomainCreated {
            domain,
            name: name.map(str::to_string),
        });
        domain
    }

    fn name_category(&self, domain: DomainHandle, id: u32, name: &str) {
        self.record(Record::CategoryNamed {
            domain,
            id,
            name: name.to_string(),
        });
    }

    fn register_string(&self, domain: DomainHandle, text: &str) -> u64 {
        let handle = self.handles.next();
        self.record(Record::StringRegistered {
            domain,
            handle,
            text: text.to_string(),
        });
        handle
    }

    fn name_thread(&self, name: &str) {
        self.record(Record::ThreadNamed {
            thread: thread::current().id(),
            name: name.to_string(),
        });
    }

    fn push_range(&self, domain: DomainHandle, attributes: &EventAttributes) {
        let thread = thread::current().id();
        self.stacks
            .lock()
            .entry((thread, domain))
            .or_default()
            .push(owned_message(attributes));
        self.record(Record::Push {
            domain,
            thread,
            attributes: attributes.clone(),
        });
    }

    fn pop_range(&self, domain: DomainHandle) {
        let thread = thread::current().id();
        let message = self
            .stacks
            .lock()
            .get_mut(&(thread, domain))
            .and_then(Vec::pop)
            .flatten();
        self.record(Record::Pop {
            domain,
            thread,
            message,
        });
    }

    fn start_range(&self, domain: DomainHandle, attributes: &EventAttributes) -> RangeId {
        let id = RangeId(self.handles.next());
        self.open
            .lock()
            .insert(id, (domain, owned_message(attributes)));
        self.record(Record::Start {
            domain,
            id,
            attributes: attributes.clone(),
        });
        id
    }

    fn end_range(&self, id: RangeId) {
        let message = self.open.lock().remove(&id).and_then(|(_, m)| m);
        self.record(Record::End { id, message });
    }

    fn mark(&self, domain: DomainHandle, attributes: &EventAttributes) {
        self.record(Record::Mark {
            domain,
            thread: thread::current().id(),
            attributes: attributes.clone(),
        });
    }
}
