//! Query engine: filtering, ordering and tag derivation over a record set.
//!
//! Everything here is a pure function over notes a backend already loaded.
//! Backends never filter or rank; the store never does either itself.

use std::cmp::Ordering;
use std::collections::HashMap;

use time::OffsetDateTime;

use crate::codec::DECRYPTION_PLACEHOLDER;
use crate::models::{Folder, FolderId, Note, NoteId, Tag};

/// Filter for listing notes.
///
/// Every supplied field must match (logical AND). Within `tags` a note
/// matches if it carries ANY of the listed names.
///
/// # Examples
///
/// ```
/// use notekeep::NoteFilter;
///
/// // Everything, newest first
/// let all = NoteFilter::default();
///
/// // Pinned notes tagged either "work" or "home"
/// let filter = NoteFilter {
///     pinned: Some(true),
///     tags: Some(vec!["work".to_string(), "home".to_string()]),
///     ..Default::default()
/// };
/// # let _ = (all, filter);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteFilter {
    /// Case-insensitive substring matched against title OR content.
    /// The placeholder shown for an unreadable encrypted body is not
    /// searched.
    pub query: Option<String>,

    /// Exact match on the pinned flag.
    pub pinned: Option<bool>,

    /// Exact tag names; a note matches if it has any of them.
    /// An empty list disables tag filtering.
    pub tags: Option<Vec<String>>,

    /// Exact match on folder reference.
    pub folder_id: Option<FolderId>,

    /// Maximum number of notes to return, applied after sorting.
    pub limit: Option<usize>,
}

impl NoteFilter {
    /// Returns true if `note` satisfies every active field.
    pub fn matches(&self, note: &Note) -> bool {
        self.matches_query(note)
            && self.pinned.is_none_or(|pinned| note.pinned() == pinned)
            && self.matches_tags(note)
            && self
                .folder_id
                .is_none_or(|folder| note.folder_id() == Some(folder))
    }

    fn matches_query(&self, note: &Note) -> bool {
        let Some(query) = self.query.as_deref() else {
            return true;
        };
        if query.is_empty() {
            return true;
        }
        let needle = query.to_lowercase();
        note.title().to_lowercase().contains(&needle)
            || (has_readable_body(note) && note.content().to_lowercase().contains(&needle))
    }

    fn matches_tags(&self, note: &Note) -> bool {
        match self.tags.as_deref() {
            None | Some([]) => true,
            Some(wanted) => wanted.iter().any(|tag| note.has_tag(tag)),
        }
    }
}

fn has_readable_body(note: &Note) -> bool {
    !(note.encrypted() && note.content() == DECRYPTION_PLACEHOLDER)
}

/// Returns the notes matching `filter`, sorted and truncated to its limit.
pub fn filter_notes(notes: Vec<Note>, filter: &NoteFilter) -> Vec<Note> {
    let mut matching: Vec<Note> = notes.into_iter().filter(|n| filter.matches(n)).collect();
    sort_notes(&mut matching);
    if let Some(limit) = filter.limit {
        matching.truncate(limit);
    }
    matching
}

/// Sorts notes pinned first, then by `updated_at` descending.
///
/// The sort is stable, so notes with equal keys keep their input order.
pub fn sort_notes(notes: &mut [Note]) {
    notes.sort_by(listing_order);
}

fn listing_order(a: &Note, b: &Note) -> Ordering {
    b.pinned()
        .cmp(&a.pinned())
        .then_with(|| b.updated_at().cmp(&a.updated_at()))
}

/// Builds the ranked tag index over every note's tag set.
///
/// One entry per distinct tag name, ranked by usage count descending, then
/// by the creation time of the oldest note carrying it (note id breaks
/// ties), then by name.
pub fn derive_tags(notes: &[Note]) -> Vec<Tag> {
    struct Tally<'a> {
        name: &'a str,
        count: usize,
        first_seen: (OffsetDateTime, NoteId),
    }

    let mut tallies: HashMap<&str, Tally<'_>> = HashMap::new();
    for note in notes {
        let seen = (note.created_at(), note.id());
        for tag in note.tags() {
            let tally = tallies.entry(tag.as_str()).or_insert(Tally {
                name: tag,
                count: 0,
                first_seen: seen,
            });
            tally.count += 1;
            tally.first_seen = tally.first_seen.min(seen);
        }
    }

    let mut ranked: Vec<Tally<'_>> = tallies.into_values().collect();
    ranked.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.first_seen.cmp(&b.first_seen))
            .then_with(|| a.name.cmp(b.name))
    });

    ranked
        .into_iter()
        .map(|t| Tag::new(t.name, t.count, t.first_seen.0))
        .collect()
}

/// Sorts folders by name, then id for equal names.
pub fn sort_folders(folders: &mut [Folder]) {
    folders.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(&b.id())));
}
