use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::domain::clock::clock::SystemClock;
use crate::domain::driver::page_driver::PageDriver;
use crate::error::Result;

/// Creates fresh browser sessions for the pool. The concrete factory lives
/// with the browser binding outside this crate.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PageDriver>>;

    /// Cheap liveness probe; the default asks the page for its URL.
    async fn health_check(&self, driver: &dyn PageDriver) -> bool {
        driver.page_url().await.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    pub max_size: usize,
    pub max_age_ms: i64,
    pub min_warm: usize,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        SessionPoolConfig { max_size: 4, max_age_ms: 10 * 60 * 1_000, min_warm: 1 }
    }
}

struct PooledSession {
    driver: Arc<dyn PageDriver>,
    created_ms: i64,
}

/// Pool of pre-warmed driver sessions.
///
/// `acquire` is non-blocking whenever a warm session exists; creation only
/// happens when the pool is empty. Aged-out or unhealthy sessions are
/// dropped instead of being handed back out.
pub struct SessionPool {
    config: SessionPoolConfig,
    factory: Arc<dyn SessionFactory>,
    clock: Arc<dyn SystemClock>,
    idle: Mutex<VecDeque<PooledSession>>,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool").field("config", &self.config).field("idle", &self.idle.lock().unwrap().len()).finish()
    }
}

impl SessionPool {
    pub fn new(config: SessionPoolConfig, factory: Arc<dyn SessionFactory>, clock: Arc<dyn SystemClock>) -> SessionPool {
        SessionPool { config, factory, clock, idle: Mutex::new(VecDeque::new()) }
    }

    /// Creates sessions until `min_warm` are idle.
    pub async fn warm_up(&self) -> Result<()> {
        while self.idle_count() < self.config.min_warm {
            let driver = self.factory.create().await?;
            self.idle.lock().unwrap().push_back(PooledSession { driver, created_ms: self.clock.now_ms() });
        }
        log::info!("Session pool warmed up with {} session(s).", self.idle_count());
        Ok(())
    }

    /// Hands out a warm session, or creates one when none is available.
    pub async fn acquire(&self) -> Result<Arc<dyn PageDriver>> {
        loop {
            let candidate = self.idle.lock().unwrap().pop_front();
            let Some(session) = candidate else {
                break;
            };

            if self.is_expired(&session) {
                log::debug!("Dropping aged-out pooled session.");
                continue;
            }
            if !self.factory.health_check(&*session.driver).await {
                log::warn!("Dropping unhealthy pooled session.");
                continue;
            }

            return Ok(session.driver);
        }

        self.factory.create().await
    }

    /// Returns a session to the pool; full or expired sessions are dropped.
    pub fn release(&self, driver: Arc<dyn PageDriver>) {
        let mut idle = self.idle.lock().unwrap();
        if idle.len() >= self.config.max_size {
            return;
        }
        idle.push_back(PooledSession { driver, created_ms: self.clock.now_ms() });
    }

    /// Periodic maintenance: drops aged-out and unhealthy idle sessions.
    pub async fn prune(&self) {
        let sessions: Vec<PooledSession> = self.idle.lock().unwrap().drain(..).collect();

        for session in sessions {
            if self.is_expired(&session) || !self.factory.health_check(&*session.driver).await {
                continue;
            }
            self.idle.lock().unwrap().push_back(session);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap().len()
    }

    fn is_expired(&self, session: &PooledSession) -> bool {
        self.clock.now_ms() - session.created_ms > self.config.max_age_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::clock_mock::MockClock;
    use crate::domain::driver::driver_mock::MockPageDriver;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockFactory {
        created: AtomicUsize,
    }

    impl MockFactory {
        fn new() -> MockFactory {
            MockFactory { created: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl SessionFactory for MockFactory {
        async fn create(&self) -> Result<Arc<dyn PageDriver>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockPageDriver::new()))
        }
    }

    fn pool(config: SessionPoolConfig, clock: &MockClock) -> (SessionPool, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::new());
        (SessionPool::new(config, factory.clone(), Arc::new(clock.clone())), factory)
    }

    #[tokio::test]
    async fn test_acquire_reuses_a_warm_session() {
        let clock = MockClock::new(0);
        let (pool, factory) = pool(SessionPoolConfig { max_size: 2, max_age_ms: 60_000, min_warm: 1 }, &clock);

        pool.warm_up().await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        let session = pool.acquire().await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle_count(), 0);

        pool.release(session);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_aged_out_sessions_are_replaced() {
        let clock = MockClock::new(0);
        let (pool, factory) = pool(SessionPoolConfig { max_size: 2, max_age_ms: 1_000, min_warm: 1 }, &clock);

        pool.warm_up().await.unwrap();
        clock.advance(1_001);

        let _session = pool.acquire().await.unwrap();
        // The warm session aged out, so a fresh one was created.
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_release_beyond_capacity_drops_the_session() {
        let clock = MockClock::new(0);
        let (pool, _factory) = pool(SessionPoolConfig { max_size: 1, max_age_ms: 60_000, min_warm: 0 }, &clock);

        pool.release(Arc::new(MockPageDriver::new()));
        pool.release(Arc::new(MockPageDriver::new()));
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn test_prune_drops_expired_sessions() {
        let clock = MockClock::new(0);
        let (pool, _factory) = pool(SessionPoolConfig { max_size: 4, max_age_ms: 1_000, min_warm: 2 }, &clock);

        pool.warm_up().await.unwrap();
        clock.advance(1_001);
        pool.prune().await;
        assert_eq!(pool.idle_count(), 0);
    }
}
