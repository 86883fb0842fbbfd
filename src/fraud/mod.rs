// Replay and copy detection over check-in events
pub mod ledger;
pub mod copy_guard;

pub use ledger::{CheckLogEntry, FraudCheck, NullifierLedger};
pub use copy_guard::{CopyProtectionGuard, SweeperHandle};
