//! Retransmission tracking for at-most-once RPC semantics.
//!
//! Clients retransmit CALLs they believe lost; replaying a non-idempotent
//! operation (a WRITE, a REMOVE) would corrupt state. Transactions are
//! identified by `(xid, client address)` and remembered for a retention
//! period; a duplicate within that window is dropped without a reply.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

enum TransactionState {
    InProgress,
    Completed(SystemTime),
}

/// Tracks seen transactions per client within a retention window.
pub struct TransactionTracker {
    retention_period: Duration,
    transactions: Mutex<HashMap<(u32, String), TransactionState>>,
}

impl TransactionTracker {
    pub fn new(retention_period: Duration) -> Self {
        Self { retention_period, transactions: Mutex::new(HashMap::new()) }
    }

    /// True when this `(xid, client)` pair was already seen; otherwise the
    /// transaction is recorded as in progress.
    pub fn is_retransmission(&self, xid: u32, client_addr: &str) -> bool {
        let key = (xid, client_addr.to_string());
        let mut transactions =
            self.transactions.lock().expect("transaction tracker lock poisoned");
        expire(&mut transactions, self.retention_period);
        if let std::collections::hash_map::Entry::Vacant(e) = transactions.entry(key) {
            e.insert(TransactionState::InProgress);
            false
        } else {
            true
        }
    }

    /// Records the completion time, starting the retention countdown.
    pub fn mark_processed(&self, xid: u32, client_addr: &str) {
        let key = (xid, client_addr.to_string());
        let mut transactions =
            self.transactions.lock().expect("transaction tracker lock poisoned");
        if let Some(tx) = transactions.get_mut(&key) {
            *tx = TransactionState::Completed(SystemTime::now());
        }
    }
}

/// Drops completed transactions older than the retention window.
/// In-progress entries are kept regardless of age.
fn expire(transactions: &mut HashMap<(u32, String), TransactionState>, max_age: Duration) {
    let cutoff = SystemTime::now() - max_age;
    transactions.retain(|_, v| match v {
        TransactionState::InProgress => true,
        TransactionState::Completed(completion_time) => *completion_time >= cutoff,
    });
}
