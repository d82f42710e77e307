//! Color resolution for annotation attributes.
//!
//! Every color reaching a backend is a canonical 32-bit ARGB value with
//! alpha in the most significant byte. Callers may supply a raw ARGB
//! integer, a name from the fixed palette, or any string understood by a
//! registered [`NamedColors`] resolver.
//!
//! # Example
//!
//! ```ignore
//! use nvmark::color::{Color, ColorResolver};
//!
//! let colors = ColorResolver::new();
//! assert_eq!(colors.resolve(Some(&Color::from("red")))?, 0xFFFF_0000);
//! assert_eq!(colors.resolve(Some(&Color::from("#00ff0080")))?, 0x8000_FF00);
//! assert_eq!(colors.resolve(None)?, nvmark::color::DEFAULT_COLOR);
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Color used when none is given (opaque blue).
pub const DEFAULT_COLOR: u32 = 0xFF00_00FF;

/// Built-in palette. Values are opaque ARGB.
const PALETTE: [(&str, u32); 10] = [
    ("green", 0xFF00_8000),
    ("blue", 0xFF00_00FF),
    ("yellow", 0xFFFF_FF00),
    ("purple", 0xFF80_0080),
    ("rapids", 0xFF74_00FF),
    ("cyan", 0xFF00_FFFF),
    ("red", 0xFFFF_0000),
    ("white", 0xFFFF_FFFF),
    ("darkgreen", 0xFF00_6400),
    ("orange", 0xFFFF_A500),
];

/// Look up a name in the built-in palette.
pub fn palette(name: &str) -> Option<u32> {
    PALETTE
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, argb)| *argb)
}

/// Color as supplied by the caller, before resolution.
///
/// Serializes as a bare integer or a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    /// Raw ARGB value, passed through unchanged.
    Argb(u32),
    /// Palette name or a name for an external resolver.
    Named(Cow<'static, str>),
}

impl From<u32> for Color {
    fn from(argb: u32) -> Self {
        Color::Argb(argb)
    }
}

impl From<&'static str> for Color {
    fn from(name: &'static str) -> Self {
        Color::Named(Cow::Borrowed(name))
    }
}

impl From<String> for Color {
    fn from(name: String) -> Self {
        Color::Named(Cow::Owned(name))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Argb(argb) => write!(f, "0x{:08X}", argb),
            Color::Named(name) => f.write_str(name),
        }
    }
}

/// Resolver for color names outside the built-in palette.
pub trait NamedColors: Send + Sync {
    /// Return the ARGB value for `name`, or `None` if unrecognized.
    fn lookup(&self, name: &str) -> Option<u32>;

    /// Whether names resolved here are kept in the resolver's cache.
    ///
    /// Resolvers that parse their input rather than look it up should
    /// return `false`, so the cache does not grow with every distinct
    /// literal.
    fn cacheable(&self) -> bool {
        true
    }
}

/// Hex literal colors: `#RRGGBB` (opaque) or `#RRGGBBAA`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexColors;

impl NamedColors for HexColors {
    fn lookup(&self, name: &str) -> Option<u32> {
        let digits = name.strip_prefix('#')?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        match digits.len() {
            6 => Some(0xFF00_0000 | value),
            // RGBA on the way in, ARGB on the way out
            8 => Some((value >> 8) | ((value & 0xFF) << 24)),
            _ => None,
        }
    }

    fn cacheable(&self) -> bool {
        false
    }
}

/// Memoizing color resolver.
///
/// Resolution order: raw integer, cache, palette, external resolvers in
/// registration order. Failed lookups are not cached, and neither are names
/// from resolvers that opt out through [`NamedColors::cacheable`].
pub struct ColorResolver {
    /// External resolvers consulted after the palette.
    external: Vec<Arc<dyn NamedColors>>,
    /// Resolved names.
    cache: RwLock<HashMap<String, u32>>,
}

impl ColorResolver {
    /// Create a resolver with hex literal support.
    pub fn new() -> Self {
        Self::palette_only().with_resolver(Arc::new(HexColors))
    }

    /// Create a resolver that knows only the built-in palette.
    pub fn palette_only() -> Self {
        Self {
            external: Vec::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Register an additional external resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn NamedColors>) -> Self {
        self.external.push(resolver);
        self
    }

    /// Resolve a color to canonical ARGB.
    pub fn resolve(&self, color: Option<&Color>) -> Result<u32> {
        match color {
            None => Ok(DEFAULT_COLOR),
            Some(Color::Argb(argb)) => Ok(*argb),
            Some(Color::Named(name)) => self.resolve_name(name),
        }
    }

    fn resolve_name(&self, name: &str) -> Result<u32> {
        if let Some(argb) = self.cache.read().get(name) {
            return Ok(*argb);
        }

        let (argb, cacheable) = palette(name)
            .map(|argb| (argb, true))
            .or_else(|| {
                self.external
                    .iter()
                    .find_map(|r| r.lookup(name).map(|argb| (argb, r.cacheable())))
            })
            .ok_or_else(|| Error::InvalidColor(name.to_string()))?;

        if cacheable {
            // A racing thread may have inserted the same value; both agree.
            self.cache.write().entry(name.to_string()).or_insert(argb);
        }
        Ok(argb)
    }

    /// Number of cached names.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }
}

impl Default for ColorResolver {
    fn default() -> Self {
        Self::new()
    }
}
