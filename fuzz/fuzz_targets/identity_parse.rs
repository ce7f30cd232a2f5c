#![no_main]

use arbitrary::Arbitrary;
use blockcache_core::DeviceIdentity;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct IdentityInput {
    /// Raw bytes as a C caller would hand them over
    encoded: Vec<u8>,
    /// Declared size, possibly lying about `encoded`
    size_delta: i8,
}

fuzz_target!(|input: IdentityInput| {
    // Malformed input:
    // 1. Missing or interior NUL terminators
    // 2. Declared size that disagrees with the buffer
    // 3. Non-UTF-8 payloads

    let size = (input.encoded.len() as isize + input.size_delta as isize).max(0) as usize;
    if let Ok(identity) = DeviceIdentity::from_raw(&input.encoded, size) {
        // Accepted identities are exactly what was passed in
        assert_eq!(identity.as_bytes_with_nul(), input.encoded.as_slice());
        assert_eq!(identity.len(), size);
        assert_eq!(identity.len(), identity.as_str().len() + 1);
        assert!(!identity.as_str().as_bytes().contains(&0));
    }
});
