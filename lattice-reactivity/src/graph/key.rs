//! Field Keys and Operation Kinds
//!
//! A subscription is scoped by a (source, key) pair. Keys are opaque to the
//! graph apart from three synthetic markers (whole-container iteration,
//! key-only iteration, sequence length) that the trigger fan-out rules treat
//! specially.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

/// Identifies a field within a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum FieldKey {
    /// A named property, or a key of an associative container.
    Name(Arc<str>),

    /// A numeric index into a sequence.
    Index(usize),

    /// Whole-container iteration (values or entries).
    Iterate,

    /// Key-only iteration of an associative container.
    MapKeyIterate,

    /// The length of a sequence.
    Length,
}

impl FieldKey {
    /// The numeric index, if this is an index key.
    pub fn index(&self) -> Option<usize> {
        match self {
            FieldKey::Index(index) => Some(*index),
            _ => None,
        }
    }
}

impl From<&str> for FieldKey {
    fn from(name: &str) -> Self {
        FieldKey::Name(Arc::from(name))
    }
}

impl From<String> for FieldKey {
    fn from(name: String) -> Self {
        FieldKey::Name(Arc::from(name))
    }
}

impl From<usize> for FieldKey {
    fn from(index: usize) -> Self {
        FieldKey::Index(index)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Name(name) => write!(f, "{name}"),
            FieldKey::Index(index) => write!(f, "[{index}]"),
            FieldKey::Iterate => f.write_str("<iterate>"),
            FieldKey::MapKeyIterate => f.write_str("<map-key-iterate>"),
            FieldKey::Length => f.write_str("length"),
        }
    }
}

/// How a field was read. Informational only; it never changes graph shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackOpType {
    Get,
    Has,
    Iterate,
}

impl fmt::Display for TrackOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrackOpType::Get => "get",
            TrackOpType::Has => "has",
            TrackOpType::Iterate => "iterate",
        })
    }
}

/// How a source was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOpType {
    Set,
    Add,
    Delete,
    Clear,
}

impl fmt::Display for TriggerOpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerOpType::Set => "set",
            TriggerOpType::Add => "add",
            TriggerOpType::Delete => "delete",
            TriggerOpType::Clear => "clear",
        })
    }
}

/// Describes one mutation passed to [`Runtime::trigger`](crate::reactive::Runtime::trigger).
///
/// The value references are only rendered when an `on_trigger` debug hook
/// fires; they never influence which effects run.
///
/// # Example
///
/// ```rust,ignore
/// runtime.trigger(&source, Mutation::set("count").with_new_value(&2).with_old_value(&1));
/// runtime.trigger(&list, Mutation::truncate(3));
/// runtime.trigger(&map, Mutation::clear().with_old_target(&snapshot));
/// ```
#[derive(Debug, Clone)]
pub struct Mutation<'a> {
    op: TriggerOpType,
    key: Option<FieldKey>,
    new_length: Option<usize>,
    new_value: Option<&'a dyn fmt::Debug>,
    old_value: Option<&'a dyn fmt::Debug>,
    old_target: Option<&'a dyn fmt::Debug>,
}

impl<'a> Mutation<'a> {
    fn new(op: TriggerOpType, key: Option<FieldKey>) -> Self {
        Self {
            op,
            key,
            new_length: None,
            new_value: None,
            old_value: None,
            old_target: None,
        }
    }

    /// An existing field was overwritten.
    pub fn set(key: impl Into<FieldKey>) -> Self {
        Self::new(TriggerOpType::Set, Some(key.into()))
    }

    /// A new field was added.
    pub fn add(key: impl Into<FieldKey>) -> Self {
        Self::new(TriggerOpType::Add, Some(key.into()))
    }

    /// A field was removed.
    pub fn delete(key: impl Into<FieldKey>) -> Self {
        Self::new(TriggerOpType::Delete, Some(key.into()))
    }

    /// Every field was removed.
    pub fn clear() -> Self {
        Self::new(TriggerOpType::Clear, None)
    }

    /// The length of a sequence was set to `new_length`.
    ///
    /// Readers of the length and of every index at or past the new length
    /// are notified.
    pub fn truncate(new_length: usize) -> Self {
        let mut mutation = Self::new(TriggerOpType::Set, Some(FieldKey::Length));
        mutation.new_length = Some(new_length);
        mutation
    }

    pub fn with_new_value(mut self, value: &'a dyn fmt::Debug) -> Self {
        self.new_value = Some(value);
        self
    }

    pub fn with_old_value(mut self, value: &'a dyn fmt::Debug) -> Self {
        self.old_value = Some(value);
        self
    }

    /// Snapshot of the container before a clear.
    pub fn with_old_target(mut self, target: &'a dyn fmt::Debug) -> Self {
        self.old_target = Some(target);
        self
    }

    pub fn op(&self) -> TriggerOpType {
        self.op
    }

    pub fn key(&self) -> Option<&FieldKey> {
        self.key.as_ref()
    }

    pub fn new_length(&self) -> Option<usize> {
        self.new_length
    }

    pub(crate) fn render_new_value(&self) -> Option<String> {
        match (self.new_value, self.new_length) {
            (Some(value), _) => Some(format!("{value:?}")),
            (None, Some(length)) => Some(length.to_string()),
            (None, None) => None,
        }
    }

    pub(crate) fn render_old_value(&self) -> Option<String> {
        self.old_value.map(|value| format!("{value:?}"))
    }

    pub(crate) fn render_old_target(&self) -> Option<String> {
        self.old_target.map(|target| format!("{target:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_convert_from_names_and_indices() {
        assert_eq!(FieldKey::from("a"), FieldKey::Name(Arc::from("a")));
        assert_eq!(FieldKey::from(String::from("a")), FieldKey::from("a"));
        assert_eq!(FieldKey::from(3usize).index(), Some(3));
        assert_eq!(FieldKey::Length.index(), None);
    }

    #[test]
    fn length_is_distinct_from_a_field_named_length() {
        assert_ne!(FieldKey::from("length"), FieldKey::Length);
    }

    #[test]
    fn truncate_carries_new_length() {
        let mutation = Mutation::truncate(2);
        assert_eq!(mutation.op(), TriggerOpType::Set);
        assert_eq!(mutation.key(), Some(&FieldKey::Length));
        assert_eq!(mutation.new_length(), Some(2));
        assert_eq!(mutation.render_new_value().as_deref(), Some("2"));
    }

    #[test]
    fn values_render_only_when_present() {
        let old = vec![1, 2];
        let mutation = Mutation::set("items").with_old_value(&old);
        assert_eq!(mutation.render_new_value(), None);
        assert_eq!(mutation.render_old_value().as_deref(), Some("[1, 2]"));
        assert!(Mutation::clear().key().is_none());
    }

    #[test]
    fn operation_kinds_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&TriggerOpType::Delete).unwrap(), "\"delete\"");
        assert_eq!(serde_json::to_string(&TrackOpType::Has).unwrap(), "\"has\"");
    }
}
