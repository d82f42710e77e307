//! Caller-facing description of a range or mark, before resolution.

use std::borrow::Cow;

use crate::attributes::{Category, Payload, RegisteredString};
use crate::color::Color;

/// Message as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageArg<'a> {
    /// Plain text.
    Text(Cow<'a, str>),
    /// A string registered in a domain.
    Registered(RegisteredString),
}

impl MessageArg<'_> {
    /// The message text.
    pub fn as_str(&self) -> &str {
        match self {
            MessageArg::Text(text) => text,
            MessageArg::Registered(registered) => registered.as_str(),
        }
    }

    fn into_owned(self) -> MessageArg<'static> {
        match self {
            MessageArg::Text(text) => MessageArg::Text(Cow::Owned(text.into_owned())),
            MessageArg::Registered(registered) => MessageArg::Registered(registered),
        }
    }
}

/// Builder for the parameters of one annotation.
///
/// Every field is optional: no message, default color (blue), default
/// domain, no category, no payload.
///
/// # Example
///
/// ```ignore
/// use nvmark::Annotation;
///
/// nvmark::push_range(
///     Annotation::new()
///         .message("decode")
///         .color("orange")
///         .domain("codec")
///         .category("video")
///         .payload(1920u32),
/// )?;
/// nvmark::pop_range(Some("codec"))?;
///
/// // Message-only shorthand
/// nvmark::mark("checkpoint")?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation<'a> {
    pub(crate) message: Option<MessageArg<'a>>,
    pub(crate) color: Option<Color>,
    pub(crate) domain: Option<Cow<'a, str>>,
    pub(crate) category: Option<Category<'a>>,
    pub(crate) payload: Option<Payload>,
}

impl<'a> Annotation<'a> {
    /// Create an empty annotation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message text.
    pub fn message(mut self, message: impl Into<Cow<'a, str>>) -> Self {
        self.message = Some(MessageArg::Text(message.into()));
        self
    }

    /// Use a registered string as the message.
    pub fn registered(mut self, message: RegisteredString) -> Self {
        self.message = Some(MessageArg::Registered(message));
        self
    }

    /// Set the color.
    pub fn color(mut self, color: impl Into<Color>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Set the domain name.
    pub fn domain(mut self, domain: impl Into<Cow<'a, str>>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set the category.
    pub fn category(mut self, category: impl Into<Category<'a>>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Attach a numeric payload.
    pub fn payload(mut self, payload: impl Into<Payload>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Message argument, if set.
    pub fn message_arg(&self) -> Option<&MessageArg<'a>> {
        self.message.as_ref()
    }

    /// Color, if set.
    pub fn color_arg(&self) -> Option<&Color> {
        self.color.as_ref()
    }

    /// Domain name, if set.
    pub fn domain_name(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Detach from borrowed data.
    pub fn into_owned(self) -> Annotation<'static> {
        Annotation {
            message: self.message.map(MessageArg::into_owned),
            color: self.color,
            domain: self.domain.map(|d| Cow::Owned(d.into_owned())),
            category: self.category.map(|c| match c {
                Category::Id(id) => Category::Id(id),
                Category::Name(name) => Category::Name(Cow::Owned(name.into_owned())),
            }),
            payload: self.payload,
        }
    }
}

impl<'a> From<&'a str> for Annotation<'a> {
    fn from(message: &'a str) -> Self {
        Annotation::new().message(message)
    }
}

impl From<String> for Annotation<'static> {
    fn from(message: String) -> Self {
        Annotation::new().message(message)
    }
}

impl From<RegisteredString> for Annotation<'static> {
    fn from(message: RegisteredString) -> Self {
        Annotation::new().registered(message)
    }
}
