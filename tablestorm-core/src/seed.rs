//! Seed derivation for reproducible per-worker randomness
//!
//! Every worker owns its own RNG stream so key sequences are independent
//! across threads yet fully reproducible from one master seed. Streams are
//! derived by hashing the master seed with a component label: same master +
//! label always yields the same stream, different labels yield unrelated
//! ones.

use sha2::{Digest, Sha256};

/// Derive a component-specific seed from the master seed.
///
/// The label should uniquely identify the consumer, e.g.
/// `op_seed_label("inserts", 3, 0)` for operation slot 0 of worker 3 of the
/// "inserts" thread group.
pub fn derive_seed(master_seed: u64, label: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(master_seed.to_be_bytes());
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Label for the key generator of one operation slot in one worker.
pub fn op_seed_label(thread_name: &str, worker_index: usize, op_slot: usize) -> String {
    format!("{thread_name}/worker{worker_index}/op{op_slot}")
}
