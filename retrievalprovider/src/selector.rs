// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

/// DAG-CBOR encoding of the selector that recursively explores every node of a
/// DAG, `{"R": {"l": {"none": {}}, ":>": {"a": {">": {"@": {}}}}}}`. A proposal
/// without a selector must be requested with exactly these bytes.
pub const ALL_SELECTOR_BYTES: &[u8] = &[
    0xa1, 0x61, 0x52, 0xa2, 0x61, 0x6c, 0xa1, 0x64, 0x6e, 0x6f, 0x6e, 0x65, 0xa0, 0x62, 0x3a, 0x3e,
    0xa1, 0x61, 0x61, 0xa1, 0x61, 0x3e, 0xa1, 0x61, 0x40, 0xa0,
];
