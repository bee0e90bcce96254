// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Transactions opened over HTTP
//!
//! Between requests an HTTP transaction is only an entry here. Each request
//! touching it pushes the expiry forward; the reaper rolls back whatever
//! runs past it.

use crate::txn::{TransactionHandle, TransactionId, TransactionManager};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct OpenTransaction {
    handle: TransactionHandle,
    expires: DateTime<Utc>,
}

pub struct HttpTransactions {
    manager: Arc<TransactionManager>,
    timeout: chrono::Duration,
    open: Mutex<HashMap<TransactionId, OpenTransaction>>,
}

impl HttpTransactions {
    pub fn new(manager: Arc<TransactionManager>, timeout: Duration) -> Self {
        Self {
            manager,
            timeout: chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::seconds(60)),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Track a freshly begun transaction, returning its expiry
    pub fn register(&self, handle: TransactionHandle) -> DateTime<Utc> {
        let expires = Utc::now() + self.timeout;
        self.open
            .lock()
            .insert(handle.id(), OpenTransaction { handle, expires });
        expires
    }

    /// Look up a transaction and extend its expiry
    pub fn touch(&self, id: TransactionId) -> Option<(TransactionHandle, DateTime<Utc>)> {
        let mut open = self.open.lock();
        let entry = open.get_mut(&id)?;
        entry.expires = Utc::now() + self.timeout;
        Some((entry.handle.clone(), entry.expires))
    }

    /// Stop tracking a transaction; the caller commits or rolls it back
    pub fn remove(&self, id: TransactionId) -> Option<TransactionHandle> {
        self.open.lock().remove(&id).map(|entry| entry.handle)
    }

    pub fn len(&self) -> usize {
        self.open.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Roll back every transaction that expired before `now`
    pub fn reap(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<TransactionHandle> = {
            let mut open = self.open.lock();
            let ids: Vec<TransactionId> = open
                .iter()
                .filter(|(_, entry)| entry.expires <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| open.remove(&id).map(|entry| entry.handle))
                .collect()
        };
        for handle in &expired {
            info!("HTTP transaction {} expired, rolling back", handle.id());
            handle.cancel();
            if let Err(e) = self.manager.rollback(handle.id()) {
                debug!("rollback of expired {} skipped: {}", handle.id(), e);
            }
        }
        expired.len()
    }

    /// Roll back everything still open
    pub fn close_all(&self) {
        let open: Vec<TransactionHandle> =
            self.open.lock().drain().map(|(_, entry)| entry.handle).collect();
        for handle in open {
            if let Err(e) = self.manager.rollback(handle.id()) {
                debug!("rollback of {} on close skipped: {}", handle.id(), e);
            }
        }
    }
}

/// RFC 1123 rendering used by the `expires` field
pub fn format_expiry(expires: DateTime<Utc>) -> String {
    expires.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::GraphDatabase;
    use crate::txn::TransactionMetadata;

    #[test]
    fn test_reap_rolls_back_expired() {
        let db = GraphDatabase::memory().unwrap();
        let open = HttpTransactions::new(db.manager().clone(), Duration::from_secs(60));
        let kept = db.begin(TransactionMetadata::new());
        let stale = db.begin(TransactionMetadata::new());
        open.register(kept.clone());
        open.register(stale.clone());

        assert_eq!(open.reap(Utc::now()), 0);
        assert_eq!(open.len(), 2);

        assert_eq!(open.reap(Utc::now() + chrono::Duration::seconds(120)), 2);
        assert!(open.is_empty());
        assert!(!stale.is_active());
    }

    #[test]
    fn test_touch_extends_expiry() {
        let db = GraphDatabase::memory().unwrap();
        let open = HttpTransactions::new(db.manager().clone(), Duration::from_secs(1));
        let handle = db.begin(TransactionMetadata::new());
        let first = open.register(handle.clone());
        std::thread::sleep(Duration::from_millis(10));
        let (_, second) = open.touch(handle.id()).unwrap();
        assert!(second > first);
        assert!(open.remove(handle.id()).is_some());
        assert!(open.touch(handle.id()).is_none());
    }

    #[test]
    fn test_expiry_format() {
        let at = DateTime::parse_from_rfc3339("2024-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_expiry(at), "Tue, 02 Jan 2024 03:04:05 GMT");
    }
}
