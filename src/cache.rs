use anyhow::Context;
use redis::Commands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// The minimal set of key-value operations the tracker needs from a store.
pub trait KvStore: Send + Sync {
    /// Return the raw bytes under `key`, or `None` if the key is absent or expired.
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Set `key` to `value`, expiring after `ttl`.
    fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()>;

    /// Atomically increment the integer under `key`, a missing key counts from zero.
    fn incr(&self, key: &str) -> anyhow::Result<i64>;
}

impl<T: KvStore + ?Sized> KvStore for Arc<T> {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()> {
        (**self).set_ex(key, value, ttl)
    }

    fn incr(&self, key: &str) -> anyhow::Result<i64> {
        (**self).incr(key)
    }
}

/// Redis backed store. Connections are checked out from a shared r2d2 pool, so every call reuses
/// an existing connection instead of dialing the server again.
#[derive(Clone)]
pub struct Cacher {
    pool: r2d2::Pool<redis::Client>,
}

impl Cacher {
    pub fn new(client: redis::Client) -> anyhow::Result<Self> {
        let pool = r2d2::Pool::builder()
            .build(client)
            .with_context(|| "fail to build redis connection pool")?;
        Ok(Self { pool })
    }

    pub fn open(addr: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(addr)
            .with_context(|| format!("fail to open redis client for `{addr}`"))?;
        Self::new(client)
    }

    pub fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<redis::Client>> {
        self.pool
            .get()
            .with_context(|| "fail to get redis connection from pool")
    }
}

impl KvStore for Cacher {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = self
            .get_conn()?
            .get(key)
            .with_context(|| format!("fail to make GET request to redis for `{key}`"))?;
        Ok(value)
    }

    fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()> {
        // SETEX only accepts whole seconds, and zero is rejected by the server
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.get_conn()?;
        redis::cmd("SETEX")
            .arg(key)
            .arg(seconds)
            .arg(value)
            .query::<()>(&mut *conn)
            .with_context(|| format!("fail to make SETEX request to redis for `{key}`"))
    }

    fn incr(&self, key: &str) -> anyhow::Result<i64> {
        let count: i64 = self
            .get_conn()?
            .incr(key, 1)
            .with_context(|| format!("fail to make INCR request to redis for `{key}`"))?;
        Ok(count)
    }
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expire_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expire_at.is_some_and(|at| at <= now)
    }
}

/// In-process store. `INCR` keeps the TTL of the key like redis does, but the TTL itself is not
/// rounded to whole seconds, so sub-second TTLs expire on time. A TTL too large to represent as
/// an instant never expires.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every key, like `FLUSHDB`.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|entry| entry.is_expired(Instant::now())) {
            entries.remove(key);
        }

        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> anyhow::Result<()> {
        let entry = Entry {
            value: value.to_vec(),
            expire_at: Instant::now().checked_add(ttl),
        };
        self.lock().insert(key.to_string(), entry);
        Ok(())
    }

    fn incr(&self, key: &str) -> anyhow::Result<i64> {
        let mut entries = self.lock();
        let live = entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()));

        let (current, expire_at) = match live {
            None => (0, None),
            Some(entry) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| anyhow::anyhow!("value of `{key}` is not an integer"))?;
                (current, entry.expire_at)
            }
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("increment of `{key}` would overflow"))?;
        let entry = Entry {
            value: next.to_string().into_bytes(),
            expire_at,
        };
        entries.insert(key.to_string(), entry);
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_expiry() {
        let store = MemoryStore::new();
        store
            .set_ex("result:a", b"hello", Duration::from_millis(30))
            .unwrap();
        assert_eq!(store.get("result:a").unwrap(), Some(b"hello".to_vec()));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("result:a").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_incr() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("count:a").unwrap(), 1);
        assert_eq!(store.incr("count:a").unwrap(), 2);
        assert_eq!(store.get("count:a").unwrap(), Some(b"2".to_vec()));

        store.set_ex("num", b"41", Duration::from_secs(10)).unwrap();
        assert_eq!(store.incr("num").unwrap(), 42);

        store.set_ex("text", b"abc", Duration::from_secs(10)).unwrap();
        assert!(store.incr("text").is_err());

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.get("count:a").unwrap(), None);
    }

    #[test]
    fn test_memory_store_huge_ttl() {
        let store = MemoryStore::new();
        store
            .set_ex("result:a", b"forever", Duration::from_secs(u64::MAX))
            .unwrap();
        assert_eq!(store.get("result:a").unwrap(), Some(b"forever".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_incr_keep_ttl() {
        let store = MemoryStore::new();
        store.set_ex("num", b"1", Duration::from_millis(30)).unwrap();
        assert_eq!(store.incr("num").unwrap(), 2);
        assert_eq!(store.get("num").unwrap(), Some(b"2".to_vec()));

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("num").unwrap(), None);
        // An expired counter starts over without a TTL
        assert_eq!(store.incr("num").unwrap(), 1);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(store.get("num").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn test_shared_store() {
        let store = Arc::new(MemoryStore::new());
        let shared: Box<dyn KvStore> = Box::new(Arc::clone(&store));
        shared.incr("count:b").unwrap();
        assert_eq!(store.len(), 1);
    }

    // Need a live redis server: `REDIS_ADDR=redis://localhost cargo test -- --ignored`
    #[test]
    #[ignore]
    fn test_redis_cacher() {
        let addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "redis://localhost".to_string());
        let cacher = Cacher::open(&addr).unwrap();

        cacher
            .set_ex("page-tracker-test:result", b"body", Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            cacher.get("page-tracker-test:result").unwrap(),
            Some(b"body".to_vec())
        );

        let before = cacher.incr("page-tracker-test:count").unwrap();
        let after = cacher.incr("page-tracker-test:count").unwrap();
        assert_eq!(after, before + 1);
    }
}
