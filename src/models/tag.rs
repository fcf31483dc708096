use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A tag derived from the notes that reference it.
///
/// Tags are never stored on their own: a tag exists exactly as long as at
/// least one note carries it. `first_seen` is the creation time of the
/// oldest note that carries the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    name: String,
    usage_count: usize,
    #[serde(with = "time::serde::rfc3339")]
    first_seen: OffsetDateTime,
}

impl Tag {
    /// Creates a derived tag entry.
    ///
    /// # Examples
    ///
    /// ```
    /// use notekeep::Tag;
    /// use time::OffsetDateTime;
    ///
    /// let tag = Tag::new("rust", 3, OffsetDateTime::UNIX_EPOCH);
    /// assert_eq!(tag.name(), "rust");
    /// assert_eq!(tag.usage_count(), 3);
    /// ```
    pub fn new(name: impl Into<String>, usage_count: usize, first_seen: OffsetDateTime) -> Self {
        Self {
            name: name.into(),
            usage_count,
            first_seen,
        }
    }

    /// Returns the tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns how many notes carry this tag.
    pub fn usage_count(&self) -> usize {
        self.usage_count
    }

    /// Returns the creation time of the oldest note carrying this tag.
    pub fn first_seen(&self) -> OffsetDateTime {
        self.first_seen
    }
}
