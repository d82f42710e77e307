//! Call-stack profiler: one range per instrumented function call.
//!
//! The profiler is a process-wide hook. While it is installed, every call
//! event pushes a range named after the callee and every return event pops
//! it. Call sites report events with [`profile_scope!`](crate::profile_scope),
//! which brackets the enclosing function, or with [`native`], which brackets
//! a call into foreign or builtin code when
//! [`ProfilerConfig::trace_native`] is set. Events sent while no hook is
//! installed cost one atomic load.
//!
//! At most one installation is active. Installing again replaces the
//! current hook; the older [`ProfilerHandle`] then no longer controls
//! anything. Dropping the active handle restores the no-hook state. A scope
//! that entered before the change still closes its range through the
//! profiler that opened it, so neither replacing nor uninstalling pops a
//! range the profiler did not push.
//!
//! # Example
//!
//! ```ignore
//! use nvmark::profiler::{self, ProfilerConfig};
//!
//! fn load() {
//!     nvmark::profile_scope!();
//!     let bytes = profiler::native("read", || std::fs::read("data.bin"));
//! }
//!
//! let _profiling = profiler::install(ProfilerConfig::new().include_source(true))?;
//! load(); // pushes "load (main.rs:4)", then "read", pops both
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

use crate::annotate::short_type_name;
use crate::annotation::Annotation;
use crate::color::Color;
use crate::error::Result;
use crate::runtime::{self, Annotator};

// ============================================================================
// Configuration
// ============================================================================

/// Profiler options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfilerConfig {
    /// Append `(file:line)` to each function name.
    pub include_source: bool,
    /// Also bracket [`native`] calls.
    pub trace_native: bool,
    /// Domain for all profiler ranges; `None` is the default domain.
    pub domain: Option<String>,
    /// Color for all profiler ranges; `None` is the default color.
    pub color: Option<Color>,
}

impl ProfilerConfig {
    /// Function names only, no native calls, default domain and color.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append source location to messages.
    pub fn include_source(mut self, include: bool) -> Self {
        self.include_source = include;
        self
    }

    /// Bracket native calls too.
    pub fn trace_native(mut self, trace: bool) -> Self {
        self.trace_native = trace;
        self
    }

    /// Emit into a named domain.
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Use a fixed color.
    pub fn color(mut self, color: impl Into<Color>) -> Self {
        self.color = Some(color.into());
        self
    }
}

// ============================================================================
// Events
// ============================================================================

/// Identity of an instrumented function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Function name.
    pub function: &'a str,
    /// Source file path.
    pub file: &'a str,
    /// Line number.
    pub line: u32,
}

impl<'a> Frame<'a> {
    /// Create a frame.
    pub const fn new(function: &'a str, file: &'a str, line: u32) -> Self {
        Self { function, file, line }
    }

    /// Range message for this frame.
    ///
    /// With `include_source`, the message is `function (file:line)` using
    /// the file's base name.
    pub fn message(&self, include_source: bool) -> String {
        if include_source {
            let file = Path::new(self.file)
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or(self.file);
            format!("{} ({}:{})", self.function, file, self.line)
        } else {
            self.function.to_string()
        }
    }
}

/// Event reported to the profiler hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileEvent<'a> {
    /// An instrumented function was entered.
    Call(Frame<'a>),
    /// An instrumented function returned.
    Return,
    /// A native function is about to be called.
    NativeCall(&'a str),
    /// A native function returned.
    NativeReturn,
    /// A native function failed instead of returning.
    NativeException,
}

// ============================================================================
// Profiler
// ============================================================================

enum Target {
    /// Process-wide strategy.
    Global,
    /// Explicit annotator.
    Custom(Arc<dyn Annotator>),
}

/// Translates profile events into push/pop operations.
pub struct CallProfiler {
    config: ProfilerConfig,
    target: Target,
    /// Configured color, resolved once.
    color: Option<u32>,
}

impl CallProfiler {
    /// Profiler that emits through the process-wide strategy.
    ///
    /// Fails with [`Error::InvalidColor`](crate::Error::InvalidColor) when the
    /// configured color does not resolve.
    pub fn new(config: ProfilerConfig) -> Result<Self> {
        Self::build(config, Target::Global)
    }

    /// Profiler that emits through `annotator`.
    pub fn with_annotator(config: ProfilerConfig, annotator: Arc<dyn Annotator>) -> Result<Self> {
        Self::build(config, Target::Custom(annotator))
    }

    fn build(config: ProfilerConfig, target: Target) -> Result<Self> {
        let mut profiler = Self {
            config,
            target,
            color: None,
        };
        if let Some(color) = &profiler.config.color {
            profiler.color = Some(profiler.annotator().resolve_color(Some(color))?);
        }
        Ok(profiler)
    }

    /// Configuration.
    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    fn annotator(&self) -> &dyn Annotator {
        match &self.target {
            Target::Global => runtime::annotator(),
            Target::Custom(annotator) => annotator.as_ref(),
        }
    }

    fn push(&self, message: String) -> Result<bool> {
        let mut annotation = Annotation::new().message(message);
        if let Some(argb) = self.color {
            annotation = annotation.color(Color::Argb(argb));
        }
        if let Some(domain) = &self.config.domain {
            annotation = annotation.domain(domain.as_str());
        }
        self.annotator().push_range(&annotation)?;
        Ok(true)
    }

    fn pop(&self) -> Result<bool> {
        self.annotator().pop_range(self.config.domain.as_deref())?;
        Ok(true)
    }

    /// Handle one event.
    ///
    /// Returns whether a range was pushed or popped; native events are
    /// ignored unless [`ProfilerConfig::trace_native`] is set.
    pub fn handle(&self, event: &ProfileEvent<'_>) -> Result<bool> {
        match event {
            ProfileEvent::Call(frame) => self.push(frame.message(self.config.include_source)),
            ProfileEvent::Return => self.pop(),
            ProfileEvent::NativeCall(name) if self.config.trace_native => self.push(name.to_string()),
            ProfileEvent::NativeReturn | ProfileEvent::NativeException if self.config.trace_native => {
                self.pop()
            }
            _ => Ok(false),
        }
    }
}

impl fmt::Debug for CallProfiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallProfiler")
            .field("config", &self.config)
            .field("color", &self.color)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Hook
// ============================================================================

struct Installed {
    generation: u64,
    profiler: Arc<CallProfiler>,
}

static HOOK: RwLock<Option<Installed>> = parking_lot::const_rwlock(None);
static ACTIVE: AtomicBool = AtomicBool::new(false);
static GENERATION: AtomicU64 = AtomicU64::new(1);

/// Install a profiler over the process-wide strategy.
///
/// The configured color is resolved here; an invalid one is an error and
/// leaves any current installation in place.
pub fn install(config: ProfilerConfig) -> Result<ProfilerHandle> {
    Ok(install_profiler(CallProfiler::new(config)?))
}

/// Install a profiler over an explicit annotator.
pub fn install_with(config: ProfilerConfig, annotator: Arc<dyn Annotator>) -> Result<ProfilerHandle> {
    Ok(install_profiler(CallProfiler::with_annotator(config, annotator)?))
}

fn install_profiler(profiler: CallProfiler) -> ProfilerHandle {
    let generation = GENERATION.fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        generation,
        include_source = profiler.config.include_source,
        trace_native = profiler.config.trace_native,
        "profiler installed"
    );

    let previous = HOOK.write().replace(Installed {
        generation,
        profiler: Arc::new(profiler),
    });
    ACTIVE.store(true, Ordering::Release);

    if let Some(previous) = previous {
        tracing::warn!(
            replaced = previous.generation,
            generation,
            "profiler already installed; replacing it"
        );
    }
    ProfilerHandle { generation }
}

/// Whether a profiler is installed.
pub fn is_installed() -> bool {
    ACTIVE.load(Ordering::Acquire)
}

fn current() -> Option<Arc<CallProfiler>> {
    if !ACTIVE.load(Ordering::Acquire) {
        return None;
    }
    HOOK.read().as_ref().map(|installed| installed.profiler.clone())
}

/// Report an event to the installed profiler, if any.
///
/// Returns the profiler that handled the event when it pushed or popped a
/// range. The matching return must go to that same profiler, which is what
/// [`CallScope`] and [`NativeScope`] do. Errors from the profiler (for
/// example a return with no matching call because the hook was installed
/// mid-stack) are logged and dropped.
pub fn dispatch(event: ProfileEvent<'_>) -> Option<Arc<CallProfiler>> {
    let profiler = current()?;
    match profiler.handle(&event) {
        Ok(true) => Some(profiler),
        Ok(false) => None,
        Err(e) => {
            tracing::debug!(error = %e, ?event, "profiler event dropped");
            None
        }
    }
}

/// Keeps a profiler installed; uninstalls it on drop.
#[derive(Debug)]
#[must_use = "the profiler is uninstalled as soon as the handle is dropped"]
pub struct ProfilerHandle {
    generation: u64,
}

impl ProfilerHandle {
    /// Whether this handle's profiler is still the installed one.
    pub fn is_current(&self) -> bool {
        HOOK.read()
            .as_ref()
            .is_some_and(|installed| installed.generation == self.generation)
    }

    /// Uninstall now.
    pub fn uninstall(self) {
        drop(self);
    }
}

impl Drop for ProfilerHandle {
    fn drop(&mut self) {
        let mut hook = HOOK.write();
        if hook.as_ref().map(|installed| installed.generation) == Some(self.generation) {
            *hook = None;
            ACTIVE.store(false, Ordering::Release);
            tracing::info!(generation = self.generation, "profiler uninstalled");
        }
    }
}

// ============================================================================
// Scopes
// ============================================================================

fn close(profiler: &CallProfiler, event: ProfileEvent<'_>) {
    if let Err(e) = profiler.handle(&event) {
        tracing::warn!(error = %e, ?event, "profiler range not closed");
    }
}

/// Reports a call on creation and a return on drop.
///
/// The return goes to the profiler that pushed the call, and only if the
/// push succeeded. Created by [`profile_scope!`](crate::profile_scope).
#[must_use = "the call returns as soon as the scope is dropped"]
pub struct CallScope {
    profiler: Option<Arc<CallProfiler>>,
    _not_send: PhantomData<*const ()>,
}

impl CallScope {
    /// Report a call to `frame`.
    pub fn enter(frame: Frame<'_>) -> Self {
        Self {
            profiler: dispatch(ProfileEvent::Call(frame)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for CallScope {
    fn drop(&mut self) {
        if let Some(profiler) = self.profiler.take() {
            close(&profiler, ProfileEvent::Return);
        }
    }
}

/// Reports a native call on creation, and a native return or exception on
/// drop depending on whether the thread is panicking.
#[must_use = "the native call returns as soon as the scope is dropped"]
pub struct NativeScope {
    profiler: Option<Arc<CallProfiler>>,
    _not_send: PhantomData<*const ()>,
}

impl NativeScope {
    /// Report a call into native function `name`.
    pub fn enter(name: &str) -> Self {
        Self {
            profiler: dispatch(ProfileEvent::NativeCall(name)),
            _not_send: PhantomData,
        }
    }
}

impl Drop for NativeScope {
    fn drop(&mut self) {
        let Some(profiler) = self.profiler.take() else {
            return;
        };
        if thread::panicking() {
            close(&profiler, ProfileEvent::NativeException);
        } else {
            close(&profiler, ProfileEvent::NativeReturn);
        }
    }
}

/// Run `f` as native call `name`.
pub fn native<R>(name: &str, f: impl FnOnce() -> R) -> R {
    let _scope = NativeScope::enter(name);
    f()
}

#[doc(hidden)]
pub fn __enclosing_function(marker: &'static str) -> &'static str {
    short_type_name(marker.strip_suffix("::__nvmark_here").unwrap_or(marker))
}

/// Report the enclosing function to the profiler until the end of the
/// current block.
///
/// ```ignore
/// fn decode(buf: &[u8]) {
///     nvmark::profile_scope!();
///     // ...
/// }
///
/// fn step() {
///     nvmark::profile_scope!("physics step");
/// }
/// ```
#[macro_export]
macro_rules! profile_scope {
    () => {
        let _nvmark_scope = $crate::profiler::CallScope::enter($crate::profiler::Frame::new(
            {
                fn __nvmark_here() {}
                fn __type_name_of<T>(_: T) -> &'static str {
                    ::std::any::type_name::<T>()
                }
                $crate::profiler::__enclosing_function(__type_name_of(__nvmark_here))
            },
            file!(),
            line!(),
        ));
    };
    ($name:expr) => {
        let _nvmark_scope =
            $crate::profiler::CallScope::enter($crate::profiler::Frame::new($name, file!(), line!()));
    };
}
