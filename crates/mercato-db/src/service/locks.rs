//! Advisory locks keyed by `(sales_code, month)`.
//!
//! Settlement and the administrative commission transitions re-tier a whole
//! month; two of them on the same key must not interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// A `(sales_code, "YYYY-MM")` key.
pub type MonthKey = (String, String);

#[derive(Debug, Default)]
pub struct SettlementLocks {
    slots: StdMutex<HashMap<MonthKey, Arc<Mutex<()>>>>,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct MonthGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl SettlementLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every key, in sorted order so concurrent callers cannot deadlock.
    pub async fn acquire<I>(&self, keys: I) -> MonthGuards
    where
        I: IntoIterator<Item = MonthKey>,
    {
        let mut keys: Vec<MonthKey> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let slots: Vec<Arc<Mutex<()>>> = {
            let mut map = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            keys.into_iter()
                .map(|key| Arc::clone(map.entry(key).or_default()))
                .collect()
        };

        let mut guards = Vec::with_capacity(slots.len());
        for slot in slots {
            guards.push(slot.lock_owned().await);
        }
        MonthGuards { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(code: &str, month: &str) -> MonthKey {
        (code.to_string(), month.to_string())
    }

    #[tokio::test]
    async fn test_same_key_is_serialised() {
        let locks = Arc::new(SettlementLocks::new());
        let held = locks.acquire([key("10001", "2026-05")]).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _g = locks.acquire([key("10001", "2026-05")]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_and_distinct_keys() {
        let locks = SettlementLocks::new();
        let _a = locks.acquire([key("10001", "2026-05"), key("10001", "2026-05")]).await;
        // A different month is independent.
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire([key("10001", "2026-06")]))
            .await
            .unwrap();
    }
}
