//! Log output for batch runs
use tracing::Level;

/// Install a `fmt` subscriber printing events at `level` and above.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .is_ok()
}
