use replimon::journal::{Journal, JournalData};

fn journal_path(dir: &tempfile::TempDir, name: &str) -> std::path::PathBuf {
    dir.path().join(name)
}

#[test]
fn round_trips_through_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = journal_path(&dir, "replimon.journal");

    let data = JournalData {
        primary_server: Some("n1".to_string()),
        primary_gtid_domain: Some(0),
    };

    let mut writer = Journal::new(&path);
    writer.save(&data).expect("save should succeed");
    assert!(path.exists());

    let mut reader = Journal::new(&path);
    let loaded = reader.load();
    assert_eq!(loaded, data);
}

#[test]
fn missing_journal_loads_as_default_and_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = journal_path(&dir, "does-not-exist.journal");

    let mut journal = Journal::new(&path);
    let loaded = journal.load();
    assert_eq!(loaded, JournalData::default());
}

#[test]
fn corrupt_journal_loads_as_default_and_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = journal_path(&dir, "replimon.journal");
    std::fs::write(&path, b"not valid json{{{").unwrap();

    let mut journal = Journal::new(&path);
    let loaded = journal.load();
    assert_eq!(loaded, JournalData::default());
}

#[test]
fn is_dirty_tracks_whether_the_in_memory_copy_matches_what_was_last_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = journal_path(&dir, "replimon.journal");
    let mut journal = Journal::new(&path);

    let data = JournalData {
        primary_server: Some("n2".to_string()),
        primary_gtid_domain: Some(1),
    };
    assert!(journal.is_dirty(&data), "nothing written yet, must be dirty");

    journal.save(&data).unwrap();
    assert!(!journal.is_dirty(&data));

    let changed = JournalData {
        primary_server: Some("n3".to_string()),
        primary_gtid_domain: Some(1),
    };
    assert!(journal.is_dirty(&changed));
}

#[test]
fn save_leaves_no_stray_temp_file_behind_on_success() {
    let dir = tempfile::tempdir().unwrap();
    let path = journal_path(&dir, "replimon.journal");
    let mut journal = Journal::new(&path);

    journal
        .save(&JournalData {
            primary_server: Some("n1".to_string()),
            primary_gtid_domain: None,
        })
        .unwrap();

    let mut tmp = path.clone().into_os_string();
    tmp.push(".tmp");
    assert!(!std::path::Path::new(&tmp).exists());
}
