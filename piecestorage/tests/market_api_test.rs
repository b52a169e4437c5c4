// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use cid::Cid;
use fil_piece_storage::{MarketApi, MemPieceStore, PieceReader, PieceStorageManager, PieceStore};
use fil_retrieval_runtime::config::DagStoreConfig;
use fil_retrieval_runtime::repo::MemStorageDealRepo;
use fil_retrieval_runtime::test_utils::{make_payload_cid, make_piece_cid, make_proposal_cid};
use fil_retrieval_runtime::types::{MinerDeal, StorageDealProposal};
use fvm_shared::address::Address;
use fvm_shared::piece::PaddedPieceSize;

const PAYLOAD: &[u8] = b"car payload bytes";

struct Setup {
    api: MarketApi,
    piece: Cid,
}

// A 128 byte padded piece unpads to 127 bytes.
fn setup(use_transient: bool, concurrency: usize) -> Setup {
    setup_with_payload_size(use_transient, concurrency, PAYLOAD.len() as u64)
}

fn setup_with_payload_size(use_transient: bool, concurrency: usize, payload_size: u64) -> Setup {
    let piece = make_piece_cid("p");
    let deals = MemStorageDealRepo::with_deals([MinerDeal {
        proposal_cid: make_proposal_cid("p"),
        proposal: StorageDealProposal {
            piece_cid: piece,
            piece_size: PaddedPieceSize(128),
            client: Address::new_id(101),
            provider: Address::new_id(1000),
        },
        payload_cid: make_payload_cid("p"),
        payload_size,
        sector_number: 1,
        offset: PaddedPieceSize(0),
    }]);

    let store = MemPieceStore::new("mem", 1 << 10);
    store.insert(piece.to_string(), PAYLOAD.to_vec());
    let mgr = PieceStorageManager::with_storages([Arc::new(store) as Arc<dyn PieceStore>]).unwrap();

    let cfg = DagStoreConfig { use_transient, max_concurrency_storage_calls: concurrency };
    Setup { api: MarketApi::new(Arc::new(mgr), Arc::new(deals), &cfg), piece }
}

#[tokio::test]
async fn persistent_fetch_is_padded_and_seekable() {
    let Setup { api, piece } = setup(false, 4);

    let mut r = api.fetch_from_piece_storage(&piece).await.unwrap();
    assert_eq!(127, r.seek(SeekFrom::End(0)).unwrap());

    let mut buf = [0xffu8; 8];
    assert_eq!(8, r.read_at(&mut buf, 100).unwrap());
    assert_eq!([0u8; 8], buf);
    assert_eq!(3, r.read_at(&mut buf[..3], 0).unwrap());
    assert_eq!(b"car", &buf[..3]);

    assert_eq!(PAYLOAD.len() as u64, api.metrics().bytes_requested());
    assert_eq!(1, api.metrics().init_count());
    assert_eq!(1, api.metrics().storage_hits("mem"));
}

#[tokio::test]
async fn transient_fetch_streams_payload_then_zeros() {
    let Setup { api, piece } = setup(true, 4);

    let mut r = api.fetch_from_piece_storage(&piece).await.unwrap();
    let mut out = Vec::new();
    r.read_to_end(&mut out).unwrap();
    assert_eq!(127, out.len());
    assert_eq!(PAYLOAD, &out[..PAYLOAD.len()]);
    assert!(out[PAYLOAD.len()..].iter().all(|b| *b == 0));

    assert!(r.seek(SeekFrom::Start(0)).is_err());
}

#[tokio::test(start_paused = true)]
async fn fetches_beyond_bound_wait_for_a_slot() {
    let Setup { api, piece } = setup(false, 1);

    let first = api.fetch_from_piece_storage(&piece).await.unwrap();
    assert_eq!(0, api.available_fetch_slots());

    let blocked =
        tokio::time::timeout(Duration::from_secs(1), api.fetch_from_piece_storage(&piece)).await;
    assert!(blocked.is_err());

    drop(first);
    assert_eq!(1, api.available_fetch_slots());
    let second = api.fetch_from_piece_storage(&piece).await;
    assert!(second.is_ok());
}

#[tokio::test]
async fn unsealed_and_car_size() {
    let Setup { api, piece } = setup(false, 1);

    assert!(api.is_unsealed(&piece).await.unwrap());
    assert!(!api.is_unsealed(&make_piece_cid("absent")).await.unwrap());

    assert_eq!(PAYLOAD.len() as u64, api.get_unpadded_car_size(&piece).await.unwrap());
    let err = api.get_unpadded_car_size(&make_piece_cid("absent")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn fetch_unknown_piece_fails_without_leaking_a_slot() {
    let Setup { api, .. } = setup(false, 1);

    let err = api.fetch_from_piece_storage(&make_piece_cid("absent")).await.err().unwrap();
    assert!(err.is_not_found());
    assert_eq!(1, api.available_fetch_slots());
    assert_eq!(0, api.metrics().init_count());
}

#[tokio::test]
async fn failed_open_is_not_counted() {
    // the recorded payload does not fit the unpadded piece
    let Setup { api, piece } = setup_with_payload_size(false, 1, 200);

    let err = api.fetch_from_piece_storage(&piece).await.err().unwrap();
    assert!(err.msg().contains("invalid piece size"));
    assert_eq!(0, api.metrics().bytes_requested());
    assert_eq!(0, api.metrics().storage_hits("mem"));
    assert_eq!(0, api.metrics().init_count());
    assert_eq!(1, api.available_fetch_slots());
}
