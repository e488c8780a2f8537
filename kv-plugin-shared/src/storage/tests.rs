use super::*;

fn open_temp() -> (tempfile::TempDir, KvStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path(), Duration::from_secs(2)).unwrap();
    (dir, store)
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let (_dir, store) = open_temp();
    store.put("alpha".to_string(), vec![1, 2, 3]).await.unwrap();
    let value = store.get("alpha".to_string()).await.unwrap();
    assert_eq!(value, vec![1, 2, 3]);
}

#[tokio::test]
async fn get_missing_key_is_not_found() {
    let (_dir, store) = open_temp();
    let err = store.get("never".to_string()).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::Error::Storage(StorageError::NotFound { .. })
    ));
}

#[tokio::test]
async fn empty_key_put_and_get_are_no_ops() {
    let (_dir, store) = open_temp();
    store.put(String::new(), vec![9, 9, 9]).await.unwrap();
    let value = store.get(String::new()).await.unwrap();
    assert!(value.is_empty());
    assert!(store.written_files().is_empty());
}

#[tokio::test]
async fn last_writer_wins_sequential() {
    let (_dir, store) = open_temp();
    store.put("k".to_string(), vec![]).await.unwrap();
    store.put("k".to_string(), vec![]).await.unwrap();
    store.put("k".to_string(), vec![]).await.unwrap();
    store.put("k".to_string(), vec![]).await.unwrap();
    store.put("k".to_string(), vec![0x00]).await.unwrap();

    let value = store.get("k".to_string()).await.unwrap();
    assert_eq!(value, vec![0x00]);
}

#[tokio::test]
async fn rejects_key_with_nul_byte() {
    let (_dir, store) = open_temp();
    let err = store.put("bad\0key".to_string(), vec![1]).await.unwrap_err();
    assert!(matches!(
        err,
        crate::error::Error::Storage(StorageError::FilesystemConstraint { .. })
    ));
}

#[tokio::test]
async fn rejects_key_with_path_separator() {
    let (_dir, store) = open_temp();
    let err = store
        .put("../escape".to_string(), vec![1])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        crate::error::Error::Storage(StorageError::FilesystemConstraint { .. })
    ));
}

#[tokio::test]
async fn written_file_matches_key_and_contents() {
    let (dir, store) = open_temp();
    store.put("beta".to_string(), vec![7, 8]).await.unwrap();
    let expected = dir.path().join("kv-data-beta");
    assert!(expected.exists());
    assert_eq!(std::fs::read(expected).unwrap(), vec![7, 8]);
}

#[test]
fn put_times_out_when_lock_held_externally() {
    use fs4::FileExt as _;

    let dir = tempfile::tempdir().unwrap();
    let store = KvStore::open(dir.path(), Duration::from_millis(150)).unwrap();
    let path = dir.path().join("kv-data-locked");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&path)
        .unwrap();
    file.lock_exclusive().unwrap();

    let result = tokio_test::block_on(store.put("locked".to_string(), vec![1]));

    file.unlock().unwrap();

    assert!(matches!(
        result,
        Err(crate::error::Error::Storage(StorageError::LockTimeout { .. }))
    ));
}

#[tokio::test]
async fn concurrent_writers_leave_one_consistent_value() {
    let (_dir, store) = open_temp();
    let mut handles = Vec::new();
    for i in 0..8u8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.put("hot".to_string(), vec![i; 16]).await.unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let value = store.get("hot".to_string()).await.unwrap();
    // Every write is 16 identical bytes; a torn write would produce a mix.
    assert_eq!(value.len(), 16);
    assert!(value.iter().all(|&b| b == value[0]));
}
