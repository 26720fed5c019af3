// Copyright (c) 2026 Data Mesher
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

use data_mesher::core::codec::Document;
use data_mesher::core::data::Mesh;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary gossip payloads must never panic; a decoded
    // document must survive re-encoding and re-decoding.
    if let Ok(doc) = Document::from_slice(data) {
        let _ = Mesh::from_document(&doc);
        let bytes = doc.to_bytes();
        let again = Document::from_slice(&bytes).expect("canonical bytes re-decode");
        assert_eq!(again.to_bytes(), bytes);
    }
});
