//! Event attribute records handed to the backend.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Category id meaning "no category".
pub const NO_CATEGORY: u32 = 0;

/// Numeric payload attached to a range or mark.
///
/// The backend record distinguishes integer from floating-point payloads,
/// so the kind travels with the value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 32-bit unsigned integer.
    U32(u32),
    /// 64-bit unsigned integer.
    U64(u64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
}

impl Payload {
    /// Whether this is a floating-point payload.
    pub fn is_floating(&self) -> bool {
        matches!(self, Payload::F32(_) | Payload::F64(_))
    }

    /// Whether this is an integer payload.
    pub fn is_integer(&self) -> bool {
        !self.is_floating()
    }
}

macro_rules! payload_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    Payload::$variant(value)
                }
            }
        )*
    };
}

payload_from!(i32 => I32, i64 => I64, u32 => U32, u64 => U64, f32 => F32, f64 => F64);

/// Category as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Category<'a> {
    /// Numeric id, used as-is.
    Id(u32),
    /// Name, mapped to an id within the owning domain.
    Name(Cow<'a, str>),
}

impl From<u32> for Category<'static> {
    fn from(id: u32) -> Self {
        Category::Id(id)
    }
}

impl<'a> From<&'a str> for Category<'a> {
    fn from(name: &'a str) -> Self {
        Category::Name(Cow::Borrowed(name))
    }
}

impl From<String> for Category<'static> {
    fn from(name: String) -> Self {
        Category::Name(Cow::Owned(name))
    }
}

/// A message string interned in a domain through the backend.
///
/// Obtained from [`Domain::register_string`](crate::domain::Domain::register_string).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegisteredString {
    /// Backend handle.
    pub(crate) handle: u64,
    /// Key of the owning domain.
    pub(crate) domain_key: u64,
    /// Interned text.
    pub(crate) text: Arc<str>,
}

impl RegisteredString {
    /// Backend handle for this string.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// The registered text.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Message of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Message {
    /// Plain text.
    Text(Arc<str>),
    /// Text registered with the backend in advance.
    Registered(RegisteredString),
}

impl Message {
    /// The message text.
    pub fn as_str(&self) -> &str {
        match self {
            Message::Text(text) => text,
            Message::Registered(registered) => registered.as_str(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of one range or mark occasion.
///
/// Colors are already resolved and categories already mapped to ids; a
/// backend never sees a color name or a category name here. An absent
/// message is distinct from an empty one.
#[derive(Debug, Clone, PartialEq)]
pub struct EventAttributes {
    message: Option<Message>,
    color: u32,
    category: u32,
    payload: Option<Payload>,
}

impl EventAttributes {
    /// Create attributes from resolved parts.
    pub fn new(message: Option<Message>, color: u32, category: u32) -> Self {
        Self {
            message,
            color,
            category,
            payload: None,
        }
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: Option<Payload>) -> Self {
        self.payload = payload;
        self
    }

    /// Copy of these attributes with a different message.
    pub(crate) fn with_message(&self, message: Message) -> Self {
        Self {
            message: Some(message),
            ..self.clone()
        }
    }

    /// Message, if any.
    pub fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    /// Message text, if any.
    pub fn message_text(&self) -> Option<&str> {
        self.message.as_ref().map(Message::as_str)
    }

    /// Resolved ARGB color.
    pub fn color(&self) -> u32 {
        self.color
    }

    /// Raw category id; [`NO_CATEGORY`] when unset.
    pub fn category_id(&self) -> u32 {
        self.category
    }

    /// Category id, or `None` when unset.
    pub fn category(&self) -> Option<u32> {
        (self.category != NO_CATEGORY).then_some(self.category)
    }

    /// Payload, if any.
    pub fn payload(&self) -> Option<Payload> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_kind() {
        assert!(Payload::from(1.5f64).is_floating());
        assert!(Payload::from(1.5f32).is_floating());
        assert!(Payload::from(7i32).is_integer());
        assert!(Payload::from(7u64).is_integer());
        assert_eq!(Payload::from(-3i64), Payload::I64(-3));
    }

    #[test]
    fn test_absent_message_differs_from_empty() {
        let none = EventAttributes::new(None, 0, NO_CATEGORY);
        let empty = EventAttributes::new(Some(Message::Text("".into())), 0, NO_CATEGORY);
        assert_eq!(none.message_text(), None);
        assert_eq!(empty.message_text(), Some(""));
        assert_ne!(none, empty);
    }

    #[test]
    fn test_category_zero_is_none() {
        let attrs = EventAttributes::new(None, 0, NO_CATEGORY);
        assert_eq!(attrs.category(), None);
        let attrs = EventAttributes::new(None, 0, 3);
        assert_eq!(attrs.category(), Some(3));
        assert_eq!(attrs.category_id(), 3);
    }

    #[test]
    fn test_with_message_keeps_other_fields() {
        let attrs = EventAttributes::new(None, 0xFF00_FF00, 2).with_payload(Some(Payload::U32(9)));
        let named = attrs.with_message(Message::Text("foo".into()));
        assert_eq!(named.message_text(), Some("foo"));
        assert_eq!(named.color(), 0xFF00_FF00);
        assert_eq!(named.category(), Some(2));
        assert_eq!(named.payload(), Some(Payload::U32(9)));
        assert_eq!(attrs.message_text(), None);
    }

    #[test]
    fn test_category_conversions() {
        assert_eq!(Category::from(4u32), Category::Id(4));
        assert_eq!(Category::from("io"), Category::Name(Cow::Borrowed("io")));
        assert_eq!(
            Category::from(String::from("io")),
            Category::Name(Cow::Owned("io".to_string()))
        );
    }
}
