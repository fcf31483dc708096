mod folder;
mod ids;
mod note;
mod tag;

pub use folder::{Folder, FolderUpdate, NewFolder};
pub use ids::{FolderId, NoteId};
pub use note::{NewNote, Note, NoteBuilder, NoteUpdate, normalize_tags};
pub use tag::Tag;
