// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{Cursor, Read};
use std::sync::Arc;

use fil_piece_storage::{
    FsPieceStore, MemPieceStore, PieceReader, PieceStorageError, PieceStorageManager, PieceStore,
    StorageType,
};
use fil_retrieval_runtime::config::{FsPieceStorageConfig, PieceStorageConfig};
use test_case::test_case;

fn mem(name: &str, capacity: u64) -> Arc<dyn PieceStore> {
    Arc::new(MemPieceStore::new(name, capacity))
}

fn body(data: &[u8]) -> Box<dyn Read + Send> {
    Box::new(Cursor::new(data.to_vec()))
}

#[tokio::test]
async fn read_prefers_configured_order() {
    let first = Arc::new(MemPieceStore::new("first", 1024));
    let second = Arc::new(MemPieceStore::new("second", 1024));
    first.insert("piece", b"a".to_vec());
    second.insert("piece", b"b".to_vec());
    second.insert("other", b"c".to_vec());
    let mgr = PieceStorageManager::with_storages([
        first as Arc<dyn PieceStore>,
        second as Arc<dyn PieceStore>,
    ])
    .unwrap();

    assert_eq!("first", mgr.find_storage_for_read("piece").await.unwrap().name());
    assert_eq!("second", mgr.find_storage_for_read("other").await.unwrap().name());

    let err = mgr.find_storage_for_read("missing").await.err().unwrap();
    assert!(matches!(err, PieceStorageError::NotFoundForRead(_)));
    assert!(err.is_not_found());
}

#[test_case(&[("a", 100, false), ("b", 300, false), ("c", 200, false)], 50 => Some("b"); "most available wins")]
#[test_case(&[("a", 100, false), ("b", 300, true), ("c", 200, false)], 50 => Some("c"); "read only skipped")]
#[test_case(&[("a", 200, false), ("b", 200, false)], 200 => Some("a"); "tie keeps configured order")]
#[test_case(&[("a", 100, false), ("b", 150, false)], 151 => None; "nothing large enough")]
#[test_case(&[], 1 => None; "no storages")]
fn write_selection(storages: &[(&str, u64, bool)], size: u64) -> Option<&'static str> {
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    rt.block_on(async {
        let mgr = PieceStorageManager::default();
        for (name, capacity, read_only) in storages {
            let mut store = MemPieceStore::new(*name, *capacity);
            if *read_only {
                store = store.with_read_only();
            }
            mgr.add_piece_storage(Arc::new(store)).unwrap();
        }
        match mgr.find_storage_for_write(size).await {
            Ok(store) => Some(match store.name() {
                "a" => "a",
                "b" => "b",
                "c" => "c",
                other => panic!("unexpected storage {}", other),
            }),
            Err(PieceStorageError::NoStorageForWrite(n)) => {
                assert_eq!(size, n);
                None
            }
            Err(e) => panic!("unexpected error {}", e),
        }
    })
}

#[tokio::test]
async fn written_piece_is_found_for_read() {
    let mgr = PieceStorageManager::with_storages([mem("small", 64), mem("large", 4096)]).unwrap();

    let store = mgr.find_storage_for_write(2048).await.unwrap();
    assert_eq!("large", store.name());
    assert_eq!(2048, store.save_to("piece", body(&[7u8; 2048])).await.unwrap());

    let found = mgr.find_storage_for_read("piece").await.unwrap();
    assert_eq!(store.name(), found.name());
    assert_eq!(2048, found.len("piece").await.unwrap());
}

#[tokio::test]
async fn storage_administration() {
    let mgr = PieceStorageManager::with_storages([mem("a", 10)]).unwrap();

    let err = mgr.add_piece_storage(mem("a", 20)).unwrap_err();
    assert!(matches!(err, PieceStorageError::StorageExists(_)));

    mgr.add_piece_storage(Arc::new(MemPieceStore::new("b", 20).with_read_only())).unwrap();
    let infos = mgr.list_storage_infos().await.unwrap();
    assert_eq!(2, infos.len());
    assert_eq!("a", infos[0].name);
    assert_eq!(StorageType::Memory, infos[0].storage_type);
    assert_eq!(10, infos[0].capacity);
    assert!(infos[1].read_only);

    assert_eq!("b", mgr.get_piece_storage_by_name("b").unwrap().name());
    mgr.remove_piece_storage("a").unwrap();
    assert!(mgr.get_piece_storage_by_name("a").err().unwrap().is_not_found());
    assert!(mgr.remove_piece_storage("a").is_err());
}

#[tokio::test]
async fn piece_transfer_endpoints() {
    let writable = MemPieceStore::new("hot", 10);
    assert_eq!("market://hot/baga6ea4seaq", writable.piece_transfer("baga6ea4seaq").await.unwrap());

    let read_only = MemPieceStore::new("cold", 10).with_read_only();
    let err = read_only.piece_transfer("baga6ea4seaq").await.unwrap_err();
    assert!(matches!(err, PieceStorageError::ReadOnly(_)));
}

#[tokio::test]
async fn memory_store_capacity() {
    let store = MemPieceStore::new("m", 8);
    assert_eq!(6, store.save_to("a", body(b"abcdef")).await.unwrap());

    let err = store.save_to("b", body(b"xyz")).await.unwrap_err();
    assert!(matches!(
        err,
        PieceStorageError::InsufficientCapacity { available: 2, required: 3, .. }
    ));

    // replacing a piece frees its own bytes first
    assert_eq!(8, store.save_to("a", body(b"abcdefgh")).await.unwrap());
    let status = store.status().await.unwrap();
    assert_eq!(0, status.available);
}

#[tokio::test]
async fn fs_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = PieceStorageConfig {
        fs: vec![FsPieceStorageConfig {
            name: "disk".into(),
            path: dir.path().join("pieces"),
            read_only: false,
            max_size: Some(1 << 20),
        }],
    };
    let mgr = PieceStorageManager::new(&cfg).unwrap();
    let store = mgr.get_piece_storage_by_name("disk").unwrap();
    assert_eq!(StorageType::Filesystem, store.storage_type());
    assert!(!store.has("piece").await.unwrap());

    assert_eq!(5, store.save_to("piece", body(b"hello")).await.unwrap());
    assert!(store.has("piece").await.unwrap());
    assert_eq!(5, store.len("piece").await.unwrap());

    let mut out = String::new();
    store.reader("piece").await.unwrap().read_to_string(&mut out).unwrap();
    assert_eq!("hello", out);

    let mut buf = [0u8; 3];
    let mut r = store.seekable_reader("piece").await.unwrap();
    assert_eq!(3, r.read_at(&mut buf, 2).unwrap());
    assert_eq!(b"llo", &buf);

    assert_eq!(vec!["piece".to_string()], store.list_resource_ids().await.unwrap());
    let status = store.status().await.unwrap();
    assert_eq!(1 << 20, status.capacity);
    assert_eq!((1 << 20) - 5, status.available);

    let err = store.len("absent").await.unwrap_err();
    assert!(err.is_not_found());
    assert!(matches!(
        store.save_to("../escape", body(b"x")).await.unwrap_err(),
        PieceStorageError::InvalidResourceId(_)
    ));
}

#[tokio::test]
async fn fs_store_capacity() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsPieceStore::new(&FsPieceStorageConfig {
        name: "small".into(),
        path: dir.path().to_path_buf(),
        read_only: false,
        max_size: Some(10),
    })
    .unwrap();

    let err = store.save_to("big", body(&[7u8; 100])).await.unwrap_err();
    assert!(matches!(
        err,
        PieceStorageError::InsufficientCapacity { available: 10, required: 100, .. }
    ));
    // nothing staged is left behind
    assert_eq!(0, std::fs::read_dir(dir.path()).unwrap().count());

    assert_eq!(6, store.save_to("a", body(b"abcdef")).await.unwrap());
    let err = store.save_to("b", body(b"12345")).await.unwrap_err();
    assert!(matches!(
        err,
        PieceStorageError::InsufficientCapacity { available: 4, required: 5, .. }
    ));

    // replacing a piece frees its own bytes first
    assert_eq!(10, store.save_to("a", body(b"abcdefghij")).await.unwrap());
    assert_eq!(0, store.status().await.unwrap().available);
    assert_eq!(vec!["a".to_string()], store.list_resource_ids().await.unwrap());
}

#[tokio::test]
async fn fs_store_read_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("piece"), b"sealed").unwrap();
    let store = FsPieceStore::new(&FsPieceStorageConfig {
        name: "ro".into(),
        path: dir.path().to_path_buf(),
        read_only: true,
        max_size: None,
    })
    .unwrap();

    assert!(store.has("piece").await.unwrap());
    assert!(matches!(
        store.save_to("other", body(b"x")).await.unwrap_err(),
        PieceStorageError::ReadOnly(_)
    ));
    assert!(store.piece_transfer("other").await.is_err());
    assert_eq!(u64::MAX, store.status().await.unwrap().capacity);
}
