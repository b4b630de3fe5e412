use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::Amount;
use crate::model::{Confirmation, TransactionRecord, TxHash, TxStatus};

/// Terminal outcome applied to a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Confirmed {
        confirmation: Confirmation,
        /// Replaces the record's amount when it was unknown at submission.
        amount: Option<Amount>,
    },
    Failed,
}

/// Session-wide transaction history, newest submission first.
///
/// The lock is only ever taken for a lookup plus mutation with no `.await`
/// in between, so each transition is atomic with respect to other readers.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Arc<Mutex<VecDeque<TransactionRecord>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly submitted record at the head.
    pub fn insert(&self, record: TransactionRecord) {
        self.lock().push_front(record);
    }

    /// Move the record with `hash` out of `Pending`.
    ///
    /// Returns `false` without touching anything if no such record exists or
    /// it has already reached a terminal state.
    pub fn resolve(&self, hash: &TxHash, resolution: Resolution) -> bool {
        let mut records = self.lock();
        let Some(record) = records.iter_mut().find(|r| &r.hash == hash) else {
            return false;
        };
        if record.status.is_terminal() {
            return false;
        }

        match resolution {
            Resolution::Confirmed {
                confirmation,
                amount,
            } => {
                record.status = TxStatus::Confirmed;
                record.confirmation = Some(confirmation);
                if let Some(amount) = amount {
                    record.amount = amount;
                }
            }
            Resolution::Failed => record.status = TxStatus::Failed,
        }
        true
    }

    pub fn get(&self, hash: &TxHash) -> Option<TransactionRecord> {
        self.lock().iter().find(|r| &r.hash == hash).cloned()
    }

    /// Copy of the current list, newest first.
    pub fn snapshot(&self) -> Vec<TransactionRecord> {
        self.lock().iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TransactionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TxKind;

    fn hash(n: u8) -> TxHash {
        TxHash::repeat_byte(n)
    }

    fn confirmed(block_number: u64) -> Resolution {
        Resolution::Confirmed {
            confirmation: Confirmation {
                block_number,
                gas_used: 21_000,
                fee: Amount::fee(21_000, 1),
            },
            amount: None,
        }
    }

    #[test]
    fn insert_is_newest_first() {
        let history = History::new();
        history.insert(TransactionRecord::pending(hash(1), TxKind::Mint, Amount::from_tokens(1)));
        history.insert(TransactionRecord::pending(hash(2), TxKind::Burn, Amount::from_tokens(2)));

        let hashes: Vec<_> = history.snapshot().into_iter().map(|r| r.hash).collect();
        assert_eq!(hashes, vec![hash(2), hash(1)]);
    }

    #[test]
    fn resolve_unknown_hash_creates_nothing() {
        let history = History::new();
        assert!(!history.resolve(&hash(9), Resolution::Failed));
        assert!(history.snapshot().is_empty());
    }

    #[test]
    fn resolve_is_one_shot() {
        let history = History::new();
        history.insert(TransactionRecord::pending(hash(1), TxKind::Mint, Amount::from_tokens(1)));

        assert!(history.resolve(&hash(1), confirmed(10)));
        assert!(!history.resolve(&hash(1), Resolution::Failed));
        assert!(!history.resolve(&hash(1), confirmed(11)));

        let record = history.get(&hash(1)).unwrap();
        assert_eq!(record.status, TxStatus::Confirmed);
        assert_eq!(record.block_number(), Some(10));
    }

    #[test]
    fn failed_records_have_no_receipt_facts() {
        let history = History::new();
        history.insert(TransactionRecord::pending(hash(1), TxKind::Burn, Amount::from_tokens(1)));
        assert!(history.resolve(&hash(1), Resolution::Failed));

        let record = history.get(&hash(1)).unwrap();
        assert_eq!(record.status, TxStatus::Failed);
        assert_eq!(record.confirmation, None);
    }

    #[test]
    fn confirmed_amount_override() {
        let history = History::new();
        history.insert(TransactionRecord::pending(hash(3), TxKind::Faucet, Amount::ZERO));
        let Resolution::Confirmed { confirmation, .. } = confirmed(5) else {
            unreachable!()
        };
        history.resolve(
            &hash(3),
            Resolution::Confirmed {
                confirmation,
                amount: Some(Amount::from_tokens(100)),
            },
        );
        assert_eq!(history.get(&hash(3)).unwrap().amount, Amount::from_tokens(100));
    }

    #[test]
    fn snapshot_is_detached() {
        let history = History::new();
        history.insert(TransactionRecord::pending(hash(1), TxKind::Mint, Amount::from_tokens(1)));
        let before = history.snapshot();
        history.resolve(&hash(1), Resolution::Failed);
        assert_eq!(before[0].status, TxStatus::Pending);
    }
}
