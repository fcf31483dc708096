use anyhow::Result;
use notekeep::{
    BackendKind, DECRYPTION_PLACEHOLDER, FileTreeBackend, KeyValueBackend, NewFolder, NewNote,
    Note, NoteBuilder, NoteFilter, NoteId, NoteStore, NoteUpdate, RelationalBackend, StoreConfig,
};
use tempfile::{TempDir, tempdir};
use time::macros::datetime;

fn stores() -> Result<(TempDir, Vec<NoteStore>)> {
    let dir = tempdir()?;
    let stores = vec![
        NoteStore::in_memory(),
        NoteStore::with_backend(Box::new(FileTreeBackend::open(dir.path().join("tree"))?)),
        NoteStore::with_backend(Box::new(RelationalBackend::in_memory()?)),
    ];
    Ok((dir, stores))
}

/// A converter-shaped record with fixed timestamps.
fn record(title: &str, tags: &[&str], pinned: bool, updated_day: u8) -> Note {
    let created = datetime!(2024-01-01 00:00:00 UTC);
    let updated = created + time::Duration::days(i64::from(updated_day));
    NoteBuilder::new()
        .id(NoteId::new(0))
        .title(title)
        .tags(tags.iter().copied())
        .pinned(pinned)
        .created_at(created)
        .updated_at(updated)
        .build()
}

fn titles(notes: &[Note]) -> Vec<String> {
    notes.iter().map(|n| n.title().to_string()).collect()
}

#[test]
fn plain_content_round_trips_on_every_backend() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut store in stores {
        let body = "line one\nline two \u{1F600}";
        let created = store.create_note(NewNote::new("t", body))?;
        let fetched = store.get_note(created.id())?.expect("note should exist");
        assert_eq!(fetched.content(), body);
        store.close()?;
    }
    Ok(())
}

#[test]
fn encrypted_content_round_trips_and_degrades_with_wrong_key() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut store in stores {
        store.set_key("right")?;
        let created = store.create_note(NewNote::new("t", "classified").encrypted(true))?;
        assert_eq!(
            store.get_note(created.id())?.map(|n| n.content().to_string()),
            Some("classified".to_string())
        );

        store.set_key("wrong")?;
        let fetched = store.get_note(created.id())?.expect("note should exist");
        assert_eq!(fetched.content(), DECRYPTION_PLACEHOLDER);
        assert_ne!(fetched.content(), "classified");
    }
    Ok(())
}

#[test]
fn filter_is_and_across_fields_and_or_across_tags() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut store in stores {
        store.import_notes(vec![
            record("N1", &["a"], false, 1),
            record("N2", &["b"], false, 2),
            record("N3", &["a", "b"], true, 3),
            record("N4", &["c"], false, 4),
        ])?;

        let union = NoteFilter {
            tags: Some(vec!["a".to_string(), "b".to_string()]),
            ..Default::default()
        };
        let mut found = titles(&store.list_notes(&union)?);
        found.sort();
        assert_eq!(found, vec!["N1", "N2", "N3"]);

        let pinned_only = NoteFilter {
            pinned: Some(true),
            ..union
        };
        assert_eq!(titles(&store.list_notes(&pinned_only)?), vec!["N3"]);
    }
    Ok(())
}

#[test]
fn listing_is_pinned_first_then_most_recent() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut store in stores {
        store.import_notes(vec![
            record("N1", &[], false, 2),
            record("N2", &[], true, 1),
            record("N3", &[], true, 3),
        ])?;

        let listed = store.list_notes(&NoteFilter::default())?;
        assert_eq!(titles(&listed), vec!["N3", "N2", "N1"]);
    }
    Ok(())
}

#[test]
fn tag_index_ranks_by_usage() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut store in stores {
        store.create_note(NewNote::new("1", "").with_tags(["a"]))?;
        store.create_note(NewNote::new("2", "").with_tags(["a"]))?;
        store.create_note(NewNote::new("3", "").with_tags(["b"]))?;

        let ranked: Vec<(String, usize)> = store
            .tags()?
            .iter()
            .map(|t| (t.name().to_string(), t.usage_count()))
            .collect();
        assert_eq!(ranked, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    }
    Ok(())
}

#[test]
fn deleting_a_folder_never_breaks_note_reads() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut store in stores {
        let folder = store.create_folder(NewFolder::new("Projects"))?;
        let note = store.create_note(NewNote::new("t", "c").in_folder(folder.id()))?;

        assert!(store.delete_folder(folder.id())?);
        assert!(store.get_note(note.id())?.is_some());
        assert!(store.list_folders()?.is_empty());
        assert_eq!(store.list_notes(&NoteFilter::default())?.len(), 1);
    }
    Ok(())
}

#[test]
fn pin_only_update_is_partial() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut store in stores {
        let created = store.create_note(NewNote::new("T", "C").with_tags(["x"]))?;
        let updated = store
            .update_note(created.id(), NoteUpdate::default().pinned(true))?
            .expect("note should exist");

        assert_eq!(updated.title(), "T");
        assert_eq!(updated.content(), "C");
        assert_eq!(updated.tags(), created.tags());
        assert!(updated.updated_at() > created.updated_at());
    }
    Ok(())
}

#[test]
fn export_and_import_move_notes_between_backends() -> Result<()> {
    let dir = tempdir()?;
    let mut source = NoteStore::open(&StoreConfig::new(BackendKind::FileTree, dir.path()))?;
    source.set_key("k")?;
    source.create_note(NewNote::new("plain", "p").with_tags(["t"]))?;
    source.create_note(NewNote::new("secret", "s").encrypted(true))?;
    let exported = source.export_notes()?;
    source.close()?;

    let mut target = NoteStore::with_backend(Box::new(KeyValueBackend::in_memory()));
    target.set_key("k")?;
    let imported = target.import_notes(exported.clone())?;
    assert_eq!(imported.len(), 2);

    let listed = target.export_notes()?;
    for (before, after) in exported.iter().zip(&listed) {
        assert_eq!(before.title(), after.title());
        assert_eq!(before.content(), after.content());
        assert_eq!(before.tags(), after.tags());
        assert_eq!(before.encrypted(), after.encrypted());
        assert_eq!(before.created_at(), after.created_at());
        assert_eq!(before.updated_at(), after.updated_at());
    }
    Ok(())
}

#[test]
fn undecryptable_notes_survive_export_and_reimport() -> Result<()> {
    let (_dir, stores) = stores()?;
    for mut source in stores {
        source.set_key("right")?;
        source.create_note(NewNote::new("secret", "original").encrypted(true))?;
        source.set_key("wrong")?;
        let exported = source.export_notes()?;

        let mut target = NoteStore::with_backend(Box::new(RelationalBackend::in_memory()?));
        target.set_key("right")?;
        let imported = target.import_notes(exported)?;
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].content(), "original");
    }
    Ok(())
}
