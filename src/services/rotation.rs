//! Round-robin key rotation backed by the counter store
//!
//! The cursor stored under `cursor_key` is the pool index the *next* request
//! should use. Each request reads it, clamps it into the current pool, picks
//! that key and writes `(used + 1) % len` back before the upstream call is
//! made, independently of how that call turns out.
//!
//! In relaxed mode the read and the write are two separate store calls and
//! the write is not awaited. Two concurrent requests can therefore read the
//! same cursor and use the same key, and one of their writes is lost. The
//! resulting distribution is approximately fair, which is accepted in
//! exchange for one store round-trip of added latency.
//!
//! Strict mode advances the cursor with the store's compare-and-swap and
//! re-reads on conflict, up to a bounded number of attempts.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::config::RotationMode;
use crate::services::key_pool::KeyPool;
use crate::store::{CounterStore, StoreError};
use crate::utils::mask_key;

/// Outcome of one selection
#[derive(Debug)]
pub struct Selection {
    /// Upstream key to inject
    pub key: String,
    /// Pool index the key was taken from
    pub used_index: usize,
    /// Cursor value written for the next request
    pub next_index: usize,
    /// Detached cursor write; `None` when the cursor was already committed
    /// by compare-and-swap. Dropping the handle does not cancel the write.
    pub persist: Option<JoinHandle<()>>,
}

/// Parse a stored cursor the lenient way: optional leading whitespace and
/// sign, then the leading run of decimal digits. Anything else is `None`.
pub fn parse_cursor(raw: Option<&str>) -> Option<i64> {
    let s = raw?.trim_start();

    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value: i64 = digits[..end].parse().ok()?;

    Some(if negative { -value } else { value })
}

/// Index to use for this request: the cursor when it falls inside the pool,
/// otherwise 0 (missing, unparseable, negative, or the pool shrank)
pub fn clamp_cursor(cursor: Option<i64>, len: usize) -> usize {
    match cursor {
        Some(v) if v >= 0 && (v as u64) < len as u64 => v as usize,
        _ => 0,
    }
}

/// Cursor value for the request after `used`
pub fn next_index(used: usize, len: usize) -> usize {
    (used + 1) % len
}

/// Picks a key from the pool and advances the shared cursor
pub struct RotationSelector {
    store: Arc<dyn CounterStore>,
    cursor_key: String,
    mode: RotationMode,
    cas_attempts: u32,
}

impl RotationSelector {
    /// Create a relaxed-mode selector
    pub fn new(store: Arc<dyn CounterStore>, cursor_key: impl Into<String>) -> Self {
        Self {
            store,
            cursor_key: cursor_key.into(),
            mode: RotationMode::Relaxed,
            cas_attempts: 1,
        }
    }

    pub fn with_mode(mut self, mode: RotationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cas_attempts(mut self, attempts: u32) -> Self {
        self.cas_attempts = attempts.max(1);
        self
    }

    /// Select this request's key and schedule the cursor advance
    ///
    /// Never fails: store problems degrade to index 0 and are only logged.
    pub async fn select_and_advance(&self, pool: &KeyPool) -> Selection {
        let len = pool.len();

        let mut seen = self.read_cursor().await;
        let mut used = clamp_cursor(parse_cursor(seen.as_deref()), len);
        let mut next = next_index(used, len);
        let mut committed = false;

        if self.mode == RotationMode::Strict {
            for attempt in 1..=self.cas_attempts {
                let swapped = self
                    .store
                    .compare_and_swap(&self.cursor_key, seen.as_deref(), &next.to_string())
                    .await;

                match swapped {
                    Ok(true) => {
                        committed = true;
                        break;
                    }
                    Ok(false) if attempt < self.cas_attempts => {
                        tracing::debug!(attempt, "Rotation cursor changed concurrently, re-reading");
                        seen = self.read_cursor().await;
                        used = clamp_cursor(parse_cursor(seen.as_deref()), len);
                        next = next_index(used, len);
                    }
                    Ok(false) => {
                        tracing::warn!(
                            attempts = self.cas_attempts,
                            "Rotation cursor still contended, writing without compare-and-swap"
                        );
                    }
                    Err(StoreError::Unsupported(op)) => {
                        tracing::warn!(operation = op, "Store cannot do strict rotation, using relaxed write");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Compare-and-swap failed, using relaxed write");
                        break;
                    }
                }
            }
        }

        let key = pool.key_at(used).to_string();

        tracing::info!(
            used_index = used,
            next_index = next,
            key = %mask_key(&key),
            "Round-Robin: Using key at index {}. Next index will be {}.",
            used,
            next
        );

        let persist = if committed {
            None
        } else {
            Some(self.spawn_persist(next))
        };

        Selection {
            key,
            used_index: used,
            next_index: next,
            persist,
        }
    }

    /// Current raw cursor; store errors read as absent
    async fn read_cursor(&self) -> Option<String> {
        match self.store.get(&self.cursor_key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    cursor_key = %self.cursor_key,
                    "Failed to read rotation cursor, using index 0"
                );
                None
            }
        }
    }

    /// Write the next cursor in the background; failures are logged only
    fn spawn_persist(&self, next: usize) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let cursor_key = self.cursor_key.clone();
        let value = next.to_string();

        tokio::spawn(
            async move {
                if let Err(e) = store.set(&cursor_key, &value).await {
                    tracing::error!(
                        error = %e,
                        cursor_key = %cursor_key,
                        next_index = %value,
                        "Error writing rotation cursor to store"
                    );
                }
            }
            .in_current_span(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use std::sync::atomic::Ordering;

    const CURSOR: &str = "gemini_rr_index";

    fn pool_of(n: usize) -> KeyPool {
        let raw = (1..=n).map(|i| format!("k{}", i)).collect::<Vec<_>>().join(",");
        KeyPool::resolve(Some(&raw)).unwrap()
    }

    async fn select(store: &Arc<MemoryStore>, pool: &KeyPool) -> Selection {
        let selector = RotationSelector::new(store.clone(), CURSOR);
        let mut selection = selector.select_and_advance(pool).await;
        if let Some(persist) = selection.persist.take() {
            persist.await.unwrap();
        }
        selection
    }

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor(Some("2")), Some(2));
        assert_eq!(parse_cursor(Some("  3")), Some(3));
        assert_eq!(parse_cursor(Some("4abc")), Some(4));
        assert_eq!(parse_cursor(Some("-1")), Some(-1));
        assert_eq!(parse_cursor(Some("+5")), Some(5));
        assert_eq!(parse_cursor(Some("abc")), None);
        assert_eq!(parse_cursor(Some("")), None);
        assert_eq!(parse_cursor(Some("-")), None);
        assert_eq!(parse_cursor(None), None);
    }

    #[test]
    fn test_clamp_cursor() {
        assert_eq!(clamp_cursor(Some(1), 3), 1);
        assert_eq!(clamp_cursor(Some(3), 3), 0);
        assert_eq!(clamp_cursor(Some(-2), 3), 0);
        assert_eq!(clamp_cursor(None, 3), 0);
        assert_eq!(clamp_cursor(Some(0), 1), 0);
    }

    #[test]
    fn test_next_index_wraps() {
        assert_eq!(next_index(0, 3), 1);
        assert_eq!(next_index(2, 3), 0);
        assert_eq!(next_index(0, 1), 0);
    }

    #[tokio::test]
    async fn test_in_range_cursor_is_used_and_advanced() {
        for n in 1..=5 {
            let pool = pool_of(n);
            for v in 0..n {
                let store = Arc::new(MemoryStore::with_value(CURSOR, &v.to_string()));
                let selection = select(&store, &pool).await;

                assert_eq!(selection.used_index, v, "pool {} cursor {}", n, v);
                assert_eq!(selection.key, format!("k{}", v + 1));
                assert_eq!(selection.next_index, (v + 1) % n);
                assert_eq!(store.value(CURSOR), Some(((v + 1) % n).to_string()));
            }
        }
    }

    #[tokio::test]
    async fn test_unusable_cursor_falls_back_to_zero() {
        for n in 1..=4 {
            let pool = pool_of(n);
            let stored = [
                Some(n.to_string()),
                Some((n + 7).to_string()),
                Some("-1".to_string()),
                Some("not-a-number".to_string()),
                None,
            ];

            for value in stored {
                let store = Arc::new(match value.as_deref() {
                    Some(v) => MemoryStore::with_value(CURSOR, v),
                    None => MemoryStore::new(),
                });
                let selection = select(&store, &pool).await;

                assert_eq!(selection.used_index, 0, "pool {} cursor {:?}", n, value);
                assert_eq!(selection.key, "k1");
                assert_eq!(store.value(CURSOR), Some((1 % n).to_string()));
            }
        }
    }

    #[tokio::test]
    async fn test_absent_cursor_with_three_keys() {
        let store = Arc::new(MemoryStore::new());
        let selection = select(&store, &pool_of(3)).await;

        assert_eq!(selection.key, "k1");
        assert_eq!(store.value(CURSOR).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_shrunk_pool_resets_cursor() {
        let store = Arc::new(MemoryStore::with_value(CURSOR, "5"));
        let selection = select(&store, &pool_of(2)).await;

        assert_eq!(selection.used_index, 0);
        assert_eq!(selection.key, "k1");
        assert_eq!(store.value(CURSOR).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_sequential_requests_cycle_through_pool() {
        let store = Arc::new(MemoryStore::new());
        let pool = pool_of(3);

        let mut keys = Vec::new();
        for _ in 0..7 {
            keys.push(select(&store, &pool).await.key);
        }

        assert_eq!(keys, vec!["k1", "k2", "k3", "k1", "k2", "k3", "k1"]);
    }

    #[tokio::test]
    async fn test_duplicate_keys_get_extra_turns() {
        let store = Arc::new(MemoryStore::new());
        let pool = KeyPool::resolve(Some("hot,cold,hot")).unwrap();

        let mut keys = Vec::new();
        for _ in 0..3 {
            keys.push(select(&store, &pool).await.key);
        }

        assert_eq!(keys, vec!["hot", "cold", "hot"]);
    }

    #[tokio::test]
    async fn test_read_failure_uses_first_key() {
        let store = Arc::new(MemoryStore::with_value(CURSOR, "2").fail_reads());
        let selection = select(&store, &pool_of(3)).await;

        assert_eq!(selection.used_index, 0);
        assert_eq!(selection.key, "k1");
        assert_eq!(store.value(CURSOR).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::with_value(CURSOR, "1").fail_writes());
        let selection = select(&store, &pool_of(3)).await;

        assert_eq!(selection.used_index, 1);
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert_eq!(store.value(CURSOR).as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_concurrent_selections_stay_in_range() {
        let store = Arc::new(MemoryStore::new());
        let pool = pool_of(4);
        let selector = RotationSelector::new(store.clone(), CURSOR);

        let selections =
            futures::future::join_all((0..32).map(|_| selector.select_and_advance(&pool))).await;

        for mut selection in selections {
            assert!(selection.used_index < 4);
            assert_eq!(selection.next_index, (selection.used_index + 1) % 4);
            if let Some(persist) = selection.persist.take() {
                persist.await.unwrap();
            }
        }

        let cursor: usize = store.value(CURSOR).unwrap().parse().unwrap();
        assert!(cursor < 4);
    }

    #[tokio::test]
    async fn test_strict_commits_with_compare_and_swap() {
        let store = Arc::new(MemoryStore::with_value(CURSOR, "1").with_cas());
        let selector = RotationSelector::new(store.clone(), CURSOR)
            .with_mode(RotationMode::Strict)
            .with_cas_attempts(3);

        let selection = selector.select_and_advance(&pool_of(3)).await;

        assert_eq!(selection.used_index, 1);
        assert!(selection.persist.is_none());
        assert_eq!(store.value(CURSOR).as_deref(), Some("2"));
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.swaps.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_strict_rereads_after_conflict() {
        let store = Arc::new(
            MemoryStore::with_value(CURSOR, "0")
                .with_cas()
                .interfere_with(&["2"]),
        );
        let selector = RotationSelector::new(store.clone(), CURSOR)
            .with_mode(RotationMode::Strict)
            .with_cas_attempts(3);

        let selection = selector.select_and_advance(&pool_of(3)).await;

        assert_eq!(selection.used_index, 2);
        assert_eq!(selection.key, "k3");
        assert!(selection.persist.is_none());
        assert_eq!(store.value(CURSOR).as_deref(), Some("0"));
        assert_eq!(store.swaps.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_strict_falls_back_when_contention_persists() {
        let store = Arc::new(
            MemoryStore::with_value(CURSOR, "0")
                .with_cas()
                .interfere_with(&["1", "2"]),
        );
        let selector = RotationSelector::new(store.clone(), CURSOR)
            .with_mode(RotationMode::Strict)
            .with_cas_attempts(2);

        let mut selection = selector.select_and_advance(&pool_of(3)).await;
        selection.persist.take().unwrap().await.unwrap();

        assert_eq!(selection.used_index, 1);
        assert_eq!(selection.next_index, 2);
        assert_eq!(store.value(CURSOR).as_deref(), Some("2"));
        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_strict_without_cas_support_uses_relaxed_write() {
        let store = Arc::new(MemoryStore::with_value(CURSOR, "1"));
        let selector = RotationSelector::new(store.clone(), CURSOR).with_mode(RotationMode::Strict);

        let mut selection = selector.select_and_advance(&pool_of(2)).await;
        selection.persist.take().unwrap().await.unwrap();

        assert_eq!(selection.used_index, 1);
        assert_eq!(store.value(CURSOR).as_deref(), Some("0"));
    }
}
