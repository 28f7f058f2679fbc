//! Protocol constants shared across the daemon.

// =============================================================================
// WIRE
// =============================================================================

/// Default UDP broadcast port. Every node on a link must agree on it.
pub const DEFAULT_BROADCAST_PORT: u16 = 37020;

/// Maximum datagram size (4 KiB). Every message must fit in a single
/// datagram; the codec refuses to emit anything larger, and the listener
/// never reads more than this per receive.
pub const MAX_DATAGRAM: usize = 4096;

/// Maximum length of a logical node name.
pub const MAX_NAME_LEN: usize = 64;

/// Maximum neighbor rows in a single HELLO.
/// Bounds memory per ingress message; a dense one-hop neighborhood larger
/// than this does not fit the datagram budget anyway.
pub const MAX_NEIGHBOR_ENTRIES: usize = 128;

/// Maximum hops recorded in a TC `route` or CUSTOM `forwarders` list.
/// Also serves as the flooding diameter bound.
pub const MAX_ROUTE_HOPS: usize = 64;

/// Maximum link addresses advertised per node.
pub const MAX_ADDRS_PER_NODE: usize = 8;

/// Maximum CUSTOM payload size, leaving headroom for the envelope within
/// [`MAX_DATAGRAM`].
pub const MAX_PAYLOAD: usize = 2048;

// =============================================================================
// REPUTATION
// =============================================================================

/// Upper bound on a peer's rating. The update rule only applies a delta
/// while the rating is at or below this value.
pub const MAX_RATING: i32 = 10;

/// Rating at or below which a peer is isolated.
pub const RATING_TO_ISOLATE: i32 = -10;

/// Logical ticks a pending-forward entry may age before the expected
/// next hop is penalized for not forwarding.
pub const PENDING_EXPIRE_TICKS: u32 = 2;

/// Penalty applied to the expected next hop when a pending-forward entry
/// expires unconfirmed.
pub const PENDING_EXPIRE_PENALTY: i32 = -2;

// =============================================================================
// SCHEDULING
// =============================================================================

/// Default HELLO emission period (seconds).
pub const DEFAULT_HELLO_SECS: u64 = 5;

/// Default TC emission period (seconds).
pub const DEFAULT_TC_SECS: u64 = 5;

/// Default IPS tick period (seconds). Pending-forward entries age in
/// these ticks, not wall time.
pub const DEFAULT_IPS_SECS: u64 = 20;

/// Default snapshot rendering period (seconds).
pub const DEFAULT_VIZ_SECS: u64 = 15;

/// Status log line period (seconds).
pub const STATUS_SECS: u64 = 30;

/// Upper bound of the per-emission jitter (milliseconds). Keeps nodes
/// started together from synchronizing their beats.
pub const EMIT_JITTER_MS: u64 = 1000;

// =============================================================================
// DEFAULTS
// =============================================================================

/// Default substring selector on interface names.
pub const DEFAULT_INTERFACE_PATTERN: &str = "eth";

/// Default directory for rendered snapshots and the per-node log.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
