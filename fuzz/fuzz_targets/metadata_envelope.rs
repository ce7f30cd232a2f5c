#![no_main]

use arbitrary::Arbitrary;
use blockcache_core::metadata::CORE_TABLE_FORMAT;
use blockcache_core::{CoreTableSnapshot, MetadataEnvelope, MetadataError};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct EnvelopeCase {
    /// Compressed bytes, valid LZ4 or not
    compressed_data: Vec<u8>,
    /// Claimed uncompressed size (bomb attempts live here)
    original_size: u32,
    checksum: [u8; 8],
    /// Whether to use the real format tag
    correct_format: bool,
    /// Raw bytes for the whole-snapshot decoder
    snapshot: Vec<u8>,
}

fuzz_target!(|case: EnvelopeCase| {
    // Attack scenarios:
    // 1. Decompression bomb: tiny payload claiming a huge original size
    // 2. Malformed LZ4 streams
    // 3. Forged checksums and format tags
    // 4. Arbitrary bytes fed to the snapshot decoder

    let envelope = MetadataEnvelope {
        compressed_data: case.compressed_data,
        checksum: case.checksum,
        original_size: case.original_size,
        format: if case.correct_format {
            CORE_TABLE_FORMAT.to_string()
        } else {
            "fuzz".to_string()
        },
    };

    match envelope.open() {
        Ok(payload) => {
            assert_eq!(payload.len(), envelope.original_size as usize);
            assert!(
                envelope.original_size as u64 <= envelope.compressed_data.len() as u64 * 1000
            );
        }
        Err(MetadataError::UnsupportedFormat(_)) => assert!(!case.correct_format),
        Err(_) => {}
    }

    // Must never panic, whatever the input
    let _ = CoreTableSnapshot::decode(&case.snapshot);
});
