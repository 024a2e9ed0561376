//! Value payload generation
//!
//! Values are deterministic functions of the key so a search can be checked
//! against what an insert wrote, without the harness keeping any state.

/// Build a `value_size`-byte payload derived from `key`.
pub fn build_value(key: u64, value_size: usize) -> Vec<u8> {
    // Mix the key so adjacent keys do not produce near-identical payloads.
    let mixed = key.wrapping_mul(0x9e37_79b9_7f4a_7c15);
    (0..value_size)
        .map(|i| b'a' + ((mixed as usize).wrapping_add(i * 7) % 26) as u8)
        .collect()
}
