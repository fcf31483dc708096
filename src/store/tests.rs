use super::*;
use crate::codec::looks_encrypted;
use crate::error::CodecError;
use crate::NoteBuilder;
use tempfile::tempdir;
use time::macros::datetime;

fn keyed_store() -> NoteStore {
    let mut store = NoteStore::in_memory();
    store.set_key("session-key").expect("failed to set key");
    store
}

#[test]
fn plain_note_round_trips() {
    let mut store = NoteStore::in_memory();
    let created = store
        .create_note(NewNote::new("Title", "Body text").with_tags(["x"]))
        .expect("failed to create note");

    let fetched = store
        .get_note(created.id())
        .expect("failed to get note")
        .expect("note should exist");

    assert_eq!(fetched, created);
    assert_eq!(fetched.content(), "Body text");
}

#[test]
fn encrypted_note_is_ciphertext_at_rest() {
    let mut store = keyed_store();
    let created = store
        .create_note(NewNote::new("Secret", "launch codes").encrypted(true))
        .expect("failed to create note");
    assert_eq!(created.content(), "launch codes");

    let raw = store
        .backend()
        .get_note(created.id())
        .expect("failed to read backend")
        .expect("note should exist");
    assert_ne!(raw.content(), "launch codes");
    assert!(looks_encrypted(raw.content()));

    let fetched = store.get_note(created.id()).unwrap().unwrap();
    assert_eq!(fetched.content(), "launch codes");
}

#[test]
fn encrypted_create_without_key_writes_nothing() {
    let mut store = NoteStore::in_memory();
    let err = store
        .create_note(NewNote::new("Secret", "body").encrypted(true))
        .unwrap_err();

    assert!(matches!(err, StoreError::MissingKey { id: None }));
    assert!(store.list_notes(&NoteFilter::default()).unwrap().is_empty());
}

#[test]
fn wrong_key_yields_placeholder() {
    let mut store = keyed_store();
    let created = store
        .create_note(NewNote::new("Secret", "body").encrypted(true))
        .unwrap();

    store.set_key("another-key").unwrap();
    let fetched = store.get_note(created.id()).unwrap().unwrap();
    assert_eq!(fetched.content(), DECRYPTION_PLACEHOLDER);
    assert_eq!(fetched.title(), "Secret");

    store.clear_key();
    assert!(!store.has_key());
    let fetched = store.get_note(created.id()).unwrap().unwrap();
    assert_eq!(fetched.content(), DECRYPTION_PLACEHOLDER);
}

#[test]
fn empty_key_is_rejected() {
    let mut store = NoteStore::in_memory();
    let err = store.set_key("").unwrap_err();
    assert!(matches!(err, StoreError::Codec(CodecError::EmptyKey)));
    assert!(!store.has_key());
}

#[test]
fn pin_only_update_keeps_other_fields() {
    let mut store = NoteStore::in_memory();
    let created = store
        .create_note(NewNote::new("Title", "Body").with_tags(["a", "b"]))
        .unwrap();

    let updated = store
        .update_note(created.id(), NoteUpdate::default().pinned(true))
        .unwrap()
        .expect("note should exist");

    assert!(updated.pinned());
    assert_eq!(updated.title(), created.title());
    assert_eq!(updated.content(), created.content());
    assert_eq!(updated.tags(), created.tags());
    assert_eq!(updated.created_at(), created.created_at());
    assert!(updated.updated_at() > created.updated_at());
}

#[test]
fn update_missing_note_returns_none() {
    let mut store = NoteStore::in_memory();
    let result = store
        .update_note(NoteId::new(42), NoteUpdate::default().title("x"))
        .unwrap();
    assert!(result.is_none());
    assert!(!store.delete_note(NoteId::new(42)).unwrap());
}

#[test]
fn new_content_for_encrypted_note_is_sealed() {
    let mut store = keyed_store();
    let created = store
        .create_note(NewNote::new("Secret", "v1").encrypted(true))
        .unwrap();

    let updated = store
        .update_note(created.id(), NoteUpdate::default().content("v2"))
        .unwrap()
        .unwrap();
    assert_eq!(updated.content(), "v2");

    let raw = store.backend().get_note(created.id()).unwrap().unwrap();
    assert!(looks_encrypted(raw.content()));
}

#[test]
fn editing_encrypted_note_without_key_fails_and_keeps_note() {
    let mut store = keyed_store();
    let created = store
        .create_note(NewNote::new("Secret", "v1").encrypted(true))
        .unwrap();
    store.clear_key();

    let err = store
        .update_note(created.id(), NoteUpdate::default().content("v2"))
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingKey { .. }));

    store.set_key("session-key").unwrap();
    let fetched = store.get_note(created.id()).unwrap().unwrap();
    assert_eq!(fetched.content(), "v1");
}

#[test]
fn metadata_update_of_encrypted_note_needs_no_key() {
    let mut store = keyed_store();
    let created = store
        .create_note(NewNote::new("Secret", "v1").encrypted(true))
        .unwrap();
    store.clear_key();

    let updated = store
        .update_note(created.id(), NoteUpdate::default().title("Renamed"))
        .unwrap()
        .unwrap();
    assert_eq!(updated.title(), "Renamed");

    store.set_key("session-key").unwrap();
    assert_eq!(store.get_note(created.id()).unwrap().unwrap().content(), "v1");
}

#[test]
fn turning_encryption_on_seals_existing_body() {
    let mut store = keyed_store();
    let created = store.create_note(NewNote::new("Later", "body")).unwrap();

    let updated = store
        .update_note(created.id(), NoteUpdate::default().encrypted(true))
        .unwrap()
        .unwrap();
    assert!(updated.encrypted());
    assert_eq!(updated.content(), "body");

    let raw = store.backend().get_note(created.id()).unwrap().unwrap();
    assert!(looks_encrypted(raw.content()));
}

#[test]
fn turning_encryption_off_restores_plaintext() {
    let mut store = keyed_store();
    let created = store
        .create_note(NewNote::new("Secret", "body").encrypted(true))
        .unwrap();

    store
        .update_note(created.id(), NoteUpdate::default().encrypted(false))
        .unwrap();

    let raw = store.backend().get_note(created.id()).unwrap().unwrap();
    assert!(!raw.encrypted());
    assert_eq!(raw.content(), "body");
}

#[test]
fn turning_encryption_off_with_wrong_key_fails() {
    let mut store = keyed_store();
    let created = store
        .create_note(NewNote::new("Secret", "body").encrypted(true))
        .unwrap();
    store.set_key("wrong").unwrap();

    let err = store
        .update_note(created.id(), NoteUpdate::default().encrypted(false))
        .unwrap_err();
    assert!(matches!(err, StoreError::Codec(CodecError::Decryption)));

    let raw = store.backend().get_note(created.id()).unwrap().unwrap();
    assert!(raw.encrypted());
}

#[test]
fn list_filters_on_decrypted_content() {
    let mut store = keyed_store();
    store
        .create_note(NewNote::new("One", "needle inside").encrypted(true))
        .unwrap();
    store.create_note(NewNote::new("Two", "haystack")).unwrap();

    let filter = NoteFilter {
        query: Some("NEEDLE".to_string()),
        ..Default::default()
    };
    let notes = store.list_notes(&filter).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title(), "One");
}

#[test]
fn folders_list_by_name_and_survive_deletion_of_referenced_folder() {
    let mut store = NoteStore::in_memory();
    let work = store.create_folder(NewFolder::new("Work")).unwrap();
    store.create_folder(NewFolder::new("Archive")).unwrap();
    let note = store
        .create_note(NewNote::new("t", "c").in_folder(work.id()))
        .unwrap();

    let names: Vec<String> = store
        .list_folders()
        .unwrap()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    assert_eq!(names, vec!["Archive", "Work"]);

    assert!(store.delete_folder(work.id()).unwrap());
    let fetched = store.get_note(note.id()).unwrap();
    assert!(fetched.is_some());
}

#[test]
fn folder_names_must_not_be_blank() {
    let mut store = NoteStore::in_memory();
    assert!(matches!(
        store.create_folder(NewFolder::new("  ")),
        Err(StoreError::Validation(_))
    ));

    let folder = store.create_folder(NewFolder::new("Ok")).unwrap();
    let update = FolderUpdate {
        name: Some(String::new()),
        color: None,
    };
    assert!(store.update_folder(folder.id(), update).is_err());
}

#[test]
fn update_folder_changes_color() {
    let mut store = NoteStore::in_memory();
    let folder = store.create_folder(NewFolder::new("Work")).unwrap();

    let updated = store
        .update_folder(
            folder.id(),
            FolderUpdate {
                name: None,
                color: Some(Some("#00ff00".to_string())),
            },
        )
        .unwrap()
        .unwrap();

    assert_eq!(updated.color(), Some("#00ff00"));
    assert!(updated.updated_at() > folder.updated_at());
}

#[test]
fn tags_are_derived_from_notes() {
    let mut store = NoteStore::in_memory();
    store.create_note(NewNote::new("1", "").with_tags(["a"])).unwrap();
    store.create_note(NewNote::new("2", "").with_tags(["a"])).unwrap();
    let third = store.create_note(NewNote::new("3", "").with_tags(["b"])).unwrap();

    let tags = store.tags().unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!((tags[0].name(), tags[0].usage_count()), ("a", 2));
    assert_eq!((tags[1].name(), tags[1].usage_count()), ("b", 1));

    store.delete_note(third.id()).unwrap();
    let names: Vec<String> = store.tags().unwrap().iter().map(|t| t.name().to_string()).collect();
    assert_eq!(names, vec!["a"]);
}

#[test]
fn import_keeps_timestamps_and_assigns_fresh_ids() {
    let mut store = keyed_store();
    store.create_note(NewNote::new("existing", "")).unwrap();

    let record = NoteBuilder::new()
        .id(NoteId::new(1))
        .title("From markdown")
        .content("# heading")
        .tags(["imported"])
        .encrypted(true)
        .created_at(datetime!(2022-03-04 05:06:07 UTC))
        .updated_at(datetime!(2022-03-05 00:00:00 UTC))
        .build();

    let imported = store.import_notes(vec![record]).unwrap();
    assert_eq!(imported.len(), 1);
    let note = &imported[0];
    assert_ne!(note.id(), NoteId::new(1));
    assert_eq!(note.content(), "# heading");
    assert_eq!(note.created_at(), datetime!(2022-03-04 05:06:07 UTC));
    assert_eq!(note.updated_at(), datetime!(2022-03-05 00:00:00 UTC));

    let raw = store.backend().get_note(note.id()).unwrap().unwrap();
    assert!(looks_encrypted(raw.content()));
}

#[test]
fn export_returns_plaintext_in_listing_order() {
    let mut store = keyed_store();
    store.create_note(NewNote::new("old", "a")).unwrap();
    store
        .create_note(NewNote::new("pinned", "b").pinned(true).encrypted(true))
        .unwrap();
    store.create_note(NewNote::new("new", "c")).unwrap();

    let exported = store.export_notes().unwrap();
    let titles: Vec<&str> = exported.iter().map(|n| n.title()).collect();
    assert_eq!(titles, vec!["pinned", "new", "old"]);
    assert_eq!(exported[0].content(), "b");
}

#[test]
fn export_keeps_unreadable_bodies_sealed() {
    let mut store = keyed_store();
    let secret = store
        .create_note(NewNote::new("Secret", "original body").encrypted(true))
        .unwrap();
    let sealed = store.backend().get_note(secret.id()).unwrap().unwrap();

    store.set_key("wrong-key").unwrap();
    let exported = store.export_notes().unwrap();
    assert_eq!(exported.len(), 1);
    assert!(exported[0].encrypted());
    assert_eq!(exported[0].content(), sealed.content());

    let mut target = keyed_store();
    let imported = target.import_notes(exported).unwrap();
    assert_eq!(imported[0].content(), "original body");
}

#[test]
fn import_rejects_placeholder_bodies() {
    let mut store = keyed_store();
    let record = NoteBuilder::new()
        .id(NoteId::new(3))
        .title("Lost")
        .content(DECRYPTION_PLACEHOLDER)
        .encrypted(true)
        .build();

    let err = store.import_notes(vec![record]).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(err.is_user_error());
    assert!(store.export_notes().unwrap().is_empty());
}

#[test]
fn search_without_key_ignores_placeholder_text() {
    let mut store = keyed_store();
    store
        .create_note(NewNote::new("Vault", "needle").encrypted(true))
        .unwrap();
    store.create_note(NewNote::new("Plain", "nothing")).unwrap();
    store.clear_key();

    for query in ["decrypt", "encrypted", "needle"] {
        let filter = NoteFilter {
            query: Some(query.to_string()),
            ..Default::default()
        };
        assert!(store.list_notes(&filter).unwrap().is_empty(), "{query}");
    }

    let by_title = NoteFilter {
        query: Some("vault".to_string()),
        ..Default::default()
    };
    let notes = store.list_notes(&by_title).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].content(), DECRYPTION_PLACEHOLDER);
}

#[test]
fn open_creates_each_backend_under_data_dir() {
    for kind in [BackendKind::KeyValue, BackendKind::FileTree, BackendKind::Relational] {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(kind, dir.path().join("nested"));

        let mut store = NoteStore::open(&config).unwrap();
        let note = store.create_note(NewNote::new("persisted", "body")).unwrap();
        store.close().unwrap();

        let store = NoteStore::open(&config).unwrap();
        let fetched = store.get_note(note.id()).unwrap();
        assert_eq!(fetched.map(|n| n.content().to_string()), Some("body".to_string()));
    }
}
