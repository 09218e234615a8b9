//! Persistence Tests

use crate::common::*;
use std::fs;

#[test]
fn committed_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.slowdb");

    let db = Database::open(&path).unwrap();
    db.update(|tx| -> TxResult { tx.create_bucket("b")?.put("k", "v") })
        .unwrap();
    assert!(path.exists());
    db.close().unwrap();

    let db = Database::open(&path).unwrap();
    let value = db
        .view(|tx| -> TxResult<_> {
            Ok(tx.bucket("b").and_then(|b| b.get("k")).map(<[u8]>::to_vec))
        })
        .unwrap();
    assert_eq!(value, Some(b"v".to_vec()));
    assert_eq!(db.stats().sequence, 1);
}

#[test]
fn rolled_back_writes_are_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.slowdb");

    let db = Database::open(&path).unwrap();
    let _ = db.update(|tx| -> TxResult {
        tx.create_bucket("b")?;
        Err(Error::Config("abort".into()))
    });
    assert!(!path.exists());
    assert_eq!(db.stats().rollbacks, 1);
}

#[test]
fn no_sync_writes_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.slowdb");

    let db = Database::builder().path(&path).no_sync().open().unwrap();
    db.update(|tx| -> TxResult { tx.create_bucket("b").map(|_| ()) })
        .unwrap();
    assert!(!path.exists());
    db.close().unwrap();
    assert!(path.exists());
}

#[test]
fn corrupt_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.slowdb");

    let db = Database::open(&path).unwrap();
    db.update(|tx| -> TxResult { tx.create_bucket("b")?.put("k", "v") })
        .unwrap();
    db.close().unwrap();

    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x5a;
    fs::write(&path, bytes).unwrap();

    let err = Database::open(&path).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn read_only_database_rejects_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.slowdb");
    Database::open(&path)
        .unwrap()
        .update(|tx| -> TxResult { tx.create_bucket("b").map(|_| ()) })
        .unwrap();

    let db = Database::builder().path(&path).read_only().open().unwrap();
    let err = db.update(|_tx| -> TxResult { Ok(()) }).unwrap_err();
    assert!(matches!(err, Error::ReadOnly));
    db.view(|tx| -> TxResult {
        assert!(tx.bucket("b").is_some());
        Ok(())
    })
    .unwrap();
}

#[test]
fn config_file_drives_the_builder() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("app.slowdb");
    let config_path = dir.path().join("slowdb.toml");
    fs::write(
        &config_path,
        format!(
            "path = {:?}\nno_sync = true\n\n[slow]\nthreshold = \"disabled\"\n",
            data.display().to_string()
        ),
    )
    .unwrap();

    let config = DatabaseConfig::from_file(&config_path).unwrap();
    let db = Database::builder().config(config).open().unwrap();
    assert_eq!(db.path(), Some(data.as_path()));
    assert_eq!(db.slow_threshold(), None);

    db.update(|tx| -> TxResult { tx.create_bucket("b").map(|_| ()) })
        .unwrap();
    assert!(!data.exists());
    db.close().unwrap();
    assert!(data.exists());
}

#[test]
fn open_temp_uses_a_fresh_file() {
    let a = Database::builder().open_temp().unwrap();
    let b = Database::builder().open_temp().unwrap();
    let (a_path, b_path) = (a.path().unwrap().to_path_buf(), b.path().unwrap().to_path_buf());
    assert_ne!(a_path, b_path);

    a.update(|tx| -> TxResult { tx.create_bucket("b").map(|_| ()) })
        .unwrap();
    b.view(|tx| -> TxResult {
        assert!(tx.bucket("b").is_none());
        Ok(())
    })
    .unwrap();
    let _ = fs::remove_file(a_path);
}
