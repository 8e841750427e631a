//! Shared fetch cache deduplicating the four correlated financial-statement
//! calls across analysts running in parallel.
//!
//! The first task to need the statements for a (ticker, as_of) key performs
//! the fetch while holding a per-key mutex; late arrivals await that same
//! in-flight fetch and read the stored bundle. The original advisory
//! flag-then-sleep discipline survives as a bounded-wait relaxation: a caller
//! that cannot take the key lock within `wait_budget` fetches independently
//! rather than blocking the run. Duplicate fetches are redundant work, not an
//! error; the stored bundle is swapped atomically so it is never interleaved.

use crate::error::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// The four correlated statements returned by one upstream fetch batch
#[derive(Debug, Clone, Default)]
pub struct FetchedStatements {
    pub fundamentals: String,
    pub balance_sheet: String,
    pub cashflow: String,
    pub income_statement: String,
}

/// Completed cache entry for one (ticker, as_of) key. Never mutated once stored.
#[derive(Debug, Clone)]
pub struct FinancialBundle {
    pub ticker: String,
    pub as_of: String,
    pub fundamentals: String,
    pub balance_sheet: String,
    pub cashflow: String,
    pub income_statement: String,
    /// Which analyst performed the fetch that produced this entry
    pub owner_label: String,
}

#[derive(Default)]
struct KeyState {
    entry: Option<Arc<FinancialBundle>>,
    fetch_lock: Arc<Mutex<()>>,
}

/// Per-run cache of financial-statement bundles keyed by (ticker, as_of)
pub struct SharedFetchCache {
    keys: Mutex<HashMap<(String, String), KeyState>>,
    wait_budget: Duration,
}

impl SharedFetchCache {
    /// Create a cache with the given bounded wait for in-flight fetches
    pub fn new(wait_budget: Duration) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            wait_budget,
        }
    }

    /// Return the completed bundle for the key, fetching it if necessary.
    ///
    /// `fetch_fn` runs at most once under normal contention; it runs again
    /// only when an earlier holder exceeds `wait_budget`, in which case the
    /// later caller's bundle replaces the stored one wholesale.
    pub async fn acquire_or_fetch<F, Fut>(
        &self,
        ticker: &str,
        as_of: &str,
        owner_label: &str,
        fetch_fn: F,
    ) -> Result<Arc<FinancialBundle>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedStatements>>,
    {
        let key = (ticker.to_string(), as_of.to_string());

        let fetch_lock = {
            let mut keys = self.keys.lock().await;
            let state = keys.entry(key.clone()).or_default();
            if let Some(entry) = &state.entry {
                tracing::debug!(
                    ticker,
                    as_of,
                    owner = %entry.owner_label,
                    "shared fetch cache hit for {owner_label}"
                );
                return Ok(Arc::clone(entry));
            }
            Arc::clone(&state.fetch_lock)
        };

        // Wait for any in-flight fetch, but only within the budget. The
        // original pipeline tolerated duplicate fetches as a performance
        // concern; keep that tolerance instead of blocking indefinitely.
        let guard = tokio::time::timeout(self.wait_budget, fetch_lock.lock()).await;
        match guard {
            Ok(_guard) => {
                // Lock acquired: re-check before fetching, the previous
                // holder may have completed the entry.
                if let Some(entry) = self.lookup(&key).await {
                    tracing::debug!(ticker, as_of, "cache populated while waiting, reusing");
                    return Ok(entry);
                }
                let entry = self.fetch_and_store(&key, owner_label, fetch_fn).await?;
                Ok(entry)
            }
            Err(_) => {
                tracing::warn!(
                    ticker,
                    as_of,
                    "shared fetch still in flight after wait budget, {owner_label} fetching independently"
                );
                if let Some(entry) = self.lookup(&key).await {
                    return Ok(entry);
                }
                self.fetch_and_store(&key, owner_label, fetch_fn).await
            }
        }
    }

    /// Read-only lookup of a completed entry
    pub async fn lookup(&self, key: &(String, String)) -> Option<Arc<FinancialBundle>> {
        let keys = self.keys.lock().await;
        keys.get(key).and_then(|s| s.entry.as_ref().map(Arc::clone))
    }

    /// Number of completed entries
    pub async fn len(&self) -> usize {
        let keys = self.keys.lock().await;
        keys.values().filter(|s| s.entry.is_some()).count()
    }

    /// Whether no completed entries exist
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn fetch_and_store<F, Fut>(
        &self,
        key: &(String, String),
        owner_label: &str,
        fetch_fn: F,
    ) -> Result<Arc<FinancialBundle>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchedStatements>>,
    {
        tracing::info!(ticker = %key.0, as_of = %key.1, owner = owner_label, "fetching financial statements");
        let statements = fetch_fn().await?;
        let bundle = Arc::new(FinancialBundle {
            ticker: key.0.clone(),
            as_of: key.1.clone(),
            fundamentals: statements.fundamentals,
            balance_sheet: statements.balance_sheet,
            cashflow: statements.cashflow,
            income_statement: statements.income_statement,
            owner_label: owner_label.to_string(),
        });

        // Swap in the whole bundle under the map lock. A racing duplicate
        // fetch replaces the entry atomically; readers only ever observe one
        // internally consistent bundle.
        let mut keys = self.keys.lock().await;
        let state = keys.entry(key.clone()).or_default();
        state.entry = Some(Arc::clone(&bundle));
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn statements(tag: &str) -> FetchedStatements {
        FetchedStatements {
            fundamentals: format!("fundamentals-{tag}"),
            balance_sheet: format!("balance-{tag}"),
            cashflow: format!("cashflow-{tag}"),
            income_statement: format!("income-{tag}"),
        }
    }

    #[tokio::test]
    async fn test_completed_entry_returned_without_refetch() {
        let cache = SharedFetchCache::new(Duration::from_millis(500));
        let calls = AtomicUsize::new(0);

        let first = cache
            .acquire_or_fetch("AAPL", "2025-06-02", "fundamentals", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(statements("a"))
            })
            .await
            .unwrap();

        let second = cache
            .acquire_or_fetch("AAPL", "2025-06-02", "valuation", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(statements("b"))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.owner_label, "fundamentals");
        assert_eq!(second.fundamentals, "fundamentals-a");
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = Arc::new(SharedFetchCache::new(Duration::from_secs(5)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for label in ["fundamentals", "valuation", "market"] {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .acquire_or_fetch("MSFT", "2025-06-02", label, || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(statements("shared"))
                    })
                    .await
                    .unwrap()
            }));
        }

        let bundles: Vec<_> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
        for bundle in bundles {
            assert_eq!(bundle.fundamentals, "fundamentals-shared");
        }
    }

    #[tokio::test]
    async fn test_exhausted_wait_budget_fetches_independently() {
        let cache = Arc::new(SharedFetchCache::new(Duration::from_millis(20)));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .acquire_or_fetch("NVDA", "2025-06-02", "fundamentals", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok(statements("slow"))
                    })
                    .await
                    .unwrap()
            })
        };

        // Give the slow fetch time to take the key lock first.
        tokio::time::sleep(Duration::from_millis(30)).await;

        let fast = cache
            .acquire_or_fetch("NVDA", "2025-06-02", "valuation", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(statements("fast"))
            })
            .await
            .unwrap();

        slow.await.unwrap();

        // Duplicate work is tolerated; the entry stays internally consistent.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 1);
        assert!(fast.fundamentals.starts_with("fundamentals-"));
        let stored = cache
            .lookup(&("NVDA".to_string(), "2025-06-02".to_string()))
            .await
            .unwrap();
        let tag = stored.fundamentals.trim_start_matches("fundamentals-").to_string();
        assert_eq!(stored.balance_sheet, format!("balance-{tag}"));
        assert_eq!(stored.cashflow, format!("cashflow-{tag}"));
        assert_eq!(stored.income_statement, format!("income-{tag}"));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_share_entries() {
        let cache = SharedFetchCache::new(Duration::from_millis(100));

        cache
            .acquire_or_fetch("AAPL", "2025-06-02", "fundamentals", || async {
                Ok(statements("june"))
            })
            .await
            .unwrap();
        cache
            .acquire_or_fetch("AAPL", "2025-07-01", "fundamentals", || async {
                Ok(statements("july"))
            })
            .await
            .unwrap();

        assert_eq!(cache.len().await, 2);
        let july = cache
            .lookup(&("AAPL".to_string(), "2025-07-01".to_string()))
            .await
            .unwrap();
        assert_eq!(july.fundamentals, "fundamentals-july");
    }

    #[tokio::test]
    async fn test_fetch_error_leaves_no_entry() {
        let cache = SharedFetchCache::new(Duration::from_millis(100));
        let result = cache
            .acquire_or_fetch("AAPL", "2025-06-02", "fundamentals", || async {
                Err(crate::error::DeskError::ApiError("upstream down".to_string()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);

        // A later caller can still populate the key.
        let bundle = cache
            .acquire_or_fetch("AAPL", "2025-06-02", "valuation", || async {
                Ok(statements("retry"))
            })
            .await
            .unwrap();
        assert_eq!(bundle.owner_label, "valuation");
    }
}
