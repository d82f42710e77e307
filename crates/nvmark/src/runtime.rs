//! Process-wide annotation strategy.
//!
//! The free functions of this crate route through one [`Annotator`] chosen
//! once per process. When annotation is enabled it is an [`Emitter`] over
//! the configured backend; when disabled it is [`Inert`], which keeps every
//! call signature and return type but does nothing and never fails.
//!
//! The choice is made either explicitly with [`init`] or implicitly from the
//! environment on first use, and is never revisited.
//!
//! # Environment
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `NVMARK_DISABLE` | any non-empty value selects the inert strategy |
//! | `NVMARK_BACKEND` | `null` (default) or `log` |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use nvmark::{Config, recording::RecordingBackend};
//!
//! nvmark::init(Config::new().with_backend(Arc::new(RecordingBackend::new())))?;
//! assert!(nvmark::enabled());
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use crate::annotation::Annotation;
use crate::backend::{Backend, LogBackend, NullBackend, RangeId};
use crate::color::{Color, ColorResolver, DEFAULT_COLOR};
use crate::emitter::Emitter;
use crate::error::{Error, Result};

/// Environment variable that disables annotation when non-empty.
pub const DISABLE_ENV: &str = "NVMARK_DISABLE";

/// Environment variable that selects the built-in backend.
pub const BACKEND_ENV: &str = "NVMARK_BACKEND";

// ============================================================================
// Strategy
// ============================================================================

/// The operation set shared by the active and inert strategies.
pub trait Annotator: Send + Sync {
    /// Whether calls have any effect.
    fn is_enabled(&self) -> bool;

    /// Push a range on the calling thread's stack for the annotation's domain.
    fn push_range(&self, annotation: &Annotation<'_>) -> Result<()>;

    /// Pop the calling thread's innermost range in `domain`.
    fn pop_range(&self, domain: Option<&str>) -> Result<()>;

    /// Start a range not tied to stack discipline.
    fn start_range(&self, annotation: &Annotation<'_>) -> Result<RangeId>;

    /// End a range returned by [`Annotator::start_range`].
    fn end_range(&self, id: RangeId) -> Result<()>;

    /// Emit an instantaneous marker.
    fn mark(&self, annotation: &Annotation<'_>) -> Result<()>;

    /// Name the calling thread in the profiling tool.
    fn name_thread(&self, name: &str);

    /// Resolve a color the way range and mark operations would.
    fn resolve_color(&self, color: Option<&Color>) -> Result<u32>;
}

/// Strategy used when annotation is disabled.
///
/// Accepts everything, including input that would be an error when enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inert;

impl Annotator for Inert {
    fn is_enabled(&self) -> bool {
        false
    }

    fn push_range(&self, _annotation: &Annotation<'_>) -> Result<()> {
        Ok(())
    }

    fn pop_range(&self, _domain: Option<&str>) -> Result<()> {
        Ok(())
    }

    fn start_range(&self, _annotation: &Annotation<'_>) -> Result<RangeId> {
        Ok(RangeId::NULL)
    }

    fn end_range(&self, _id: RangeId) -> Result<()> {
        Ok(())
    }

    fn mark(&self, _annotation: &Annotation<'_>) -> Result<()> {
        Ok(())
    }

    fn name_thread(&self, _name: &str) {}

    fn resolve_color(&self, _color: Option<&Color>) -> Result<u32> {
        Ok(DEFAULT_COLOR)
    }
}

static INERT: Inert = Inert;

// ============================================================================
// Configuration
// ============================================================================

/// Built-in backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Discard everything.
    #[default]
    Null,
    /// Forward to `tracing`.
    Log,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "null" | "none" => Ok(BackendKind::Null),
            "log" | "tracing" => Ok(BackendKind::Log),
            other => Err(Error::Config(format!("unknown backend {other:?}"))),
        }
    }
}

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Whether annotation is enabled.
    pub enabled: bool,
    /// Built-in backend, used when no explicit backend is set.
    pub backend: BackendKind,
    /// Accept `#RRGGBB` and `#RRGGBBAA` color literals.
    pub hex_colors: bool,
    /// Explicit backend instance.
    sink: Option<Arc<dyn Backend>>,
}

impl Config {
    /// Enabled, null backend, hex colors on.
    pub fn new() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::Null,
            hex_colors: true,
            sink: None,
        }
    }

    /// Disabled configuration.
    pub fn disabled() -> Self {
        Self::new().with_enabled(false)
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through a variable lookup.
    ///
    /// An unknown backend name is logged and falls back to the null backend.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup(DISABLE_ENV).map_or(true, |value| value.is_empty());
        let backend = match lookup(BACKEND_ENV) {
            None => BackendKind::Null,
            Some(value) => value.parse().unwrap_or_else(|e: Error| {
                tracing::warn!(error = %e, "ignoring {BACKEND_ENV}");
                BackendKind::Null
            }),
        };
        Self::new().with_enabled(enabled).with_backend_kind(backend)
    }

    /// Enable or disable annotation.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Select a built-in backend.
    pub fn with_backend_kind(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Use an explicit backend instance.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.sink = Some(backend);
        self
    }

    /// Toggle hex color literals.
    pub fn with_hex_colors(mut self, hex_colors: bool) -> Self {
        self.hex_colors = hex_colors;
        self
    }

    /// Build the emitter this configuration describes, or `None` when
    /// disabled.
    pub fn build(self) -> Option<Emitter> {
        if !self.enabled {
            return None;
        }
        let backend = self.sink.unwrap_or_else(|| match self.backend {
            BackendKind::Null => Arc::new(NullBackend::new()) as Arc<dyn Backend>,
            BackendKind::Log => Arc::new(LogBackend::new()),
        });
        let colors = if self.hex_colors {
            ColorResolver::new()
        } else {
            ColorResolver::palette_only()
        };
        Some(Emitter::with_colors(backend, colors))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("enabled", &self.enabled)
            .field("backend", &self.backend)
            .field("hex_colors", &self.hex_colors)
            .field("sink", &self.sink.as_ref().map(|b| b.name()))
            .finish()
    }
}

// ============================================================================
// Process-wide state
// ============================================================================

struct Runtime {
    emitter: Option<Emitter>,
}

impl Runtime {
    fn from_config(config: Config) -> Self {
        let emitter = config.build();
        match &emitter {
            Some(emitter) => tracing::info!(backend = emitter.backend().name(), "annotation enabled"),
            None => tracing::info!("annotation disabled"),
        }
        Self { emitter }
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| Runtime::from_config(Config::from_env()))
}

/// Configure the process-wide strategy.
///
/// Fails with [`Error::AlreadyInitialized`] once the strategy exists, which
/// includes implicit initialization by an earlier annotation call.
pub fn init(config: Config) -> Result<()> {
    let mut installed = false;
    RUNTIME.get_or_init(|| {
        installed = true;
        Runtime::from_config(config)
    });
    if installed {
        Ok(())
    } else {
        Err(Error::AlreadyInitialized)
    }
}

/// The process-wide strategy.
pub fn annotator() -> &'static dyn Annotator {
    match &runtime().emitter {
        Some(emitter) => emitter as &dyn Annotator,
        None => &INERT,
    }
}

/// The process-wide emitter, when annotation is enabled.
pub fn emitter() -> Option<&'static Emitter> {
    runtime().emitter.as_ref()
}

/// Whether annotation is enabled for this process.
pub fn enabled() -> bool {
    runtime().emitter.is_some()
}
