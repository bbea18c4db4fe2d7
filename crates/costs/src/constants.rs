pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * 1024;
pub const GIB: u64 = 1024 * 1024 * 1024;

pub const MINUTE: u64 = 60;
pub const HOUR: u64 = 60 * MINUTE;

/// Minimum billed size, in MiB, for a pure STORE message -- small files are
/// still charged as if they were this size.
pub const MIN_STORE_COST_MIB: u64 = 25;
