// Network-wide constants shared by the artifact model and the harness.

// Number of slots per epoch
pub const SLOTS_PER_EPOCH: u64 = 32;

// Wall-clock duration of one slot in milliseconds
// Every strategy-side delay must finish well inside this budget
pub const SLOT_DURATION_MS: u64 = 12_000;

// Maximum number of data shards referenced by a single block
// A shard index must be in [0, MAX_SHARDS_PER_BLOCK)
pub const MAX_SHARDS_PER_BLOCK: u8 = 6;

// Maximum size of a shard blob in bytes
pub const MAX_SHARD_BLOB_SIZE: usize = 128 * 1024;

// Size of the graffiti tag carried by a slot header
pub const GRAFFITI_SIZE: usize = 32;

// Size of the logs bloom filter carried by an execution payload
pub const LOGS_BLOOM_SIZE: usize = 256;

// Maximum size of a payload's extra data field
pub const MAX_EXTRA_DATA_SIZE: usize = 32;

// Maximum size of a single opaque transaction byte string
pub const MAX_TRANSACTION_SIZE: usize = 128 * 1024;

// Maximum size of a transaction's input payload
pub const MAX_TRANSACTION_INPUT_SIZE: usize = MAX_TRANSACTION_SIZE - 256;

// Maximum number of transactions carried by one execution payload
pub const MAX_TRANSACTIONS_PER_PAYLOAD: usize = 1024;

// Default missed-slot budget for a scenario observation window
pub const DEFAULT_MAX_MISSED_SLOTS: u64 = 3;

// Default observation window after the behavioral transition point,
// expressed in epochs
pub const DEFAULT_WAIT_EPOCHS: u64 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_consistent() {
        assert!(MAX_TRANSACTION_INPUT_SIZE < MAX_TRANSACTION_SIZE);
        assert!((MAX_SHARDS_PER_BLOCK as usize) > 0);
        assert!(DEFAULT_WAIT_EPOCHS * SLOTS_PER_EPOCH > DEFAULT_MAX_MISSED_SLOTS);
    }
}
