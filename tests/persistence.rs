use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tessera::{
    Config, Database, DocId, Document, Enquire, ErrorKind, Query, WritableDatabase, DB_CREATE_OR_OPEN,
    DB_OPEN,
};

fn doc(text: &str) -> Document {
    let mut d = Document::new();
    d.set_data(text);
    for (i, word) in text.split(' ').enumerate() {
        d.add_posting(word, i as u32 + 1, 1).unwrap();
    }
    d
}

fn first_wal(dir: &Path) -> std::path::PathBuf {
    dir.join("wal").join("wal_00000000.log")
}

#[test]
fn reopen_replays_committed_changes() {
    let dir = tempfile::tempdir().unwrap();
    let uuid = {
        let mut db = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN).unwrap();
        db.add_document(doc("the quick fox")).unwrap();
        db.add_document(doc("the slow fox runs")).unwrap();
        db.set_metadata("version", "1").unwrap();
        db.commit().unwrap();
        db.delete_document(DocId(2)).unwrap();
        db.commit().unwrap();
        db.get_uuid()
    };

    let db = Database::open(dir.path()).unwrap();
    assert_eq!(db.revision().unwrap(), 2);
    assert_eq!(db.doccount().unwrap(), 1);
    assert_eq!(db.lastdocid().unwrap(), DocId(2));
    assert_eq!(db.get_uuid().unwrap(), uuid);
    assert_eq!(db.get_metadata("version").unwrap(), "1");

    let mut enquire = Enquire::new(&db);
    enquire.set_query(Query::term("fox"), 0);
    assert_eq!(enquire.get_mset(0, 10).unwrap().docids(), vec![DocId(1)]);
}

#[test]
fn uncommitted_changes_are_discarded() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut db = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN).unwrap();
        db.add_document(doc("kept")).unwrap();
        db.commit().unwrap();
        db.add_document(doc("lost")).unwrap();
    }

    let db = WritableDatabase::open(dir.path(), DB_OPEN).unwrap();
    assert_eq!(db.doccount(), 1);
    assert!(!db.term_exists("lost"));
    assert_eq!(db.lastdocid(), DocId(1));
}

#[test]
fn second_writer_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let first = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN).unwrap();
    let second = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN);
    assert_eq!(second.err().map(|e| e.kind), Some(ErrorKind::ConcurrentWrite));

    let reader = Database::open(dir.path()).unwrap();
    assert!(reader.locked().unwrap());
    drop(first);
    assert!(!reader.locked().unwrap());
    assert!(WritableDatabase::open(dir.path(), DB_OPEN).is_ok());
}

#[test]
fn disk_reader_picks_up_commits_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN).unwrap();
    let reader = Database::open(dir.path()).unwrap();
    assert_eq!(reader.doccount().unwrap(), 0);

    writer.add_document(doc("fresh")).unwrap();
    writer.commit().unwrap();
    assert_eq!(reader.doccount().unwrap(), 0);
    assert!(reader.reopen().unwrap());
    assert_eq!(reader.doccount().unwrap(), 1);
    assert!(!reader.reopen().unwrap());
}

#[test]
fn torn_wal_tail_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut db = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN).unwrap();
        db.add_document(doc("whole")).unwrap();
        db.commit().unwrap();
    }
    let mut file = OpenOptions::new().append(true).open(first_wal(dir.path())).unwrap();
    file.write_all(&[0x40, 0x00, 0x00]).unwrap();
    drop(file);

    assert_eq!(Database::open(dir.path()).unwrap().doccount().unwrap(), 1);

    let mut db = WritableDatabase::open(dir.path(), DB_OPEN).unwrap();
    db.add_document(doc("after")).unwrap();
    db.commit().unwrap();
    drop(db);
    assert_eq!(Database::open(dir.path()).unwrap().doccount().unwrap(), 2);
}

#[test]
fn damaged_record_mid_log_is_corruption() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut db = WritableDatabase::open(dir.path(), DB_CREATE_OR_OPEN).unwrap();
        for text in ["one", "two"] {
            db.add_document(doc(text)).unwrap();
            db.commit().unwrap();
        }
    }

    let mut file = OpenOptions::new().read(true).write(true).open(first_wal(dir.path())).unwrap();
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(12)).unwrap();
    file.read_exact(&mut byte).unwrap();
    file.seek(SeekFrom::Start(12)).unwrap();
    file.write_all(&[byte[0] ^ 0xff]).unwrap();
    drop(file);

    let err = WritableDatabase::open(dir.path(), DB_OPEN).err().map(|e| e.kind);
    assert_eq!(err, Some(ErrorKind::Corruption));
    let err = Database::open(dir.path()).err().map(|e| e.kind);
    assert_eq!(err, Some(ErrorKind::Corruption));
}

#[test]
fn checkpoints_survive_reopen_with_every_codec() {
    use tessera::compression::compress::CompressionType;

    for compression in [CompressionType::None, CompressionType::LZ4, CompressionType::Zstd, CompressionType::Snappy] {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { checkpoint_interval: 1, compression, ..Config::default() };
        {
            let mut db = WritableDatabase::open_with_config(dir.path(), DB_CREATE_OR_OPEN, config.clone()).unwrap();
            db.add_document(doc("checkpointed text")).unwrap();
            db.commit().unwrap();
        }
        let db = Database::open_with_config(dir.path(), config).unwrap();
        assert_eq!(db.doccount().unwrap(), 1);
        assert_eq!(db.positionlist(DocId(1), "text").unwrap(), vec![2]);
    }
}

#[test]
fn config_loads_from_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tessera.json");
    std::fs::write(&path, r#"{ "checkpoint_interval": 4, "lock_retry_attempts": 2 }"#).unwrap();
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.checkpoint_interval, 4);
    assert_eq!(config.lock_retry_attempts, 2);
}
