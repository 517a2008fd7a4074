pub mod joblog;
pub mod ledger;
pub mod locking;

#[cfg(test)]
mod ledger_test;

pub use joblog::JobLog;
pub use ledger::{Ledger, LedgerError};
