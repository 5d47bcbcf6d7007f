//! Lazy backend proxy.
//!
//! Holds connection parameters and connects on first use. Concurrent first
//! callers converge on a single connection attempt: `once_cell`'s
//! `OnceCell` blocks the other threads while one initializes, and tokio's
//! `OnceCell` makes the other tasks await the in-flight attempt. A failed
//! attempt leaves the cell empty so a later call may retry.

use ::async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::fmt;

use trellis_core::{Row, TransportError, TrellisConfig};
use trellis_cql::Statement;

use crate::async_backend::AsyncBackend;
use crate::backend::{Backend, ExecOptions};

type Connect<B> = Box<dyn Fn(&TrellisConfig) -> Result<B, TransportError> + Send + Sync>;
type AsyncConnect<B> =
    Box<dyn Fn(TrellisConfig) -> BoxFuture<'static, Result<B, TransportError>> + Send + Sync>;

// ============================================================================
// BLOCKING
// ============================================================================

/// Blocking backend that connects on first execution.
pub struct LazyBackend<B> {
    config: TrellisConfig,
    connect: Connect<B>,
    connection: once_cell::sync::OnceCell<B>,
}

impl<B> LazyBackend<B> {
    pub fn new<F>(config: TrellisConfig, connect: F) -> Self
    where
        F: Fn(&TrellisConfig) -> Result<B, TransportError> + Send + Sync + 'static,
    {
        Self {
            config,
            connect: Box::new(connect),
            connection: once_cell::sync::OnceCell::new(),
        }
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.get().is_some()
    }

    /// The established connection, connecting now if needed.
    pub fn connection(&self) -> Result<&B, TransportError> {
        self.connection.get_or_try_init(|| {
            tracing::info!(hosts = ?self.config.hosts, port = self.config.port, "connecting backend");
            (self.connect)(&self.config)
        })
    }
}

impl<B> fmt::Debug for LazyBackend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyBackend")
            .field("hosts", &self.config.hosts)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<B: Backend> Backend for LazyBackend<B> {
    fn execute(
        &self,
        statement: &Statement,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError> {
        self.connection()?.execute(statement, options)
    }

    fn default_keyspace(&self) -> Option<&str> {
        self.config.default_keyspace.as_deref()
    }

    /// No-op when never connected.
    fn close(&self) -> Result<(), TransportError> {
        match self.connection.get() {
            Some(connection) => connection.close(),
            None => Ok(()),
        }
    }
}

// ============================================================================
// ASYNC
// ============================================================================

/// Suspending backend that connects on first execution.
pub struct AsyncLazyBackend<B> {
    config: TrellisConfig,
    connect: AsyncConnect<B>,
    connection: tokio::sync::OnceCell<B>,
}

impl<B> AsyncLazyBackend<B> {
    pub fn new<F>(config: TrellisConfig, connect: F) -> Self
    where
        F: Fn(TrellisConfig) -> BoxFuture<'static, Result<B, TransportError>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            config,
            connect: Box::new(connect),
            connection: tokio::sync::OnceCell::new(),
        }
    }

    pub fn config(&self) -> &TrellisConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    /// The established connection, connecting now if needed.
    pub async fn connection(&self) -> Result<&B, TransportError> {
        self.connection
            .get_or_try_init(|| {
                tracing::info!(hosts = ?self.config.hosts, port = self.config.port, "connecting backend");
                (self.connect)(self.config.clone())
            })
            .await
    }
}

impl<B> fmt::Debug for AsyncLazyBackend<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncLazyBackend")
            .field("hosts", &self.config.hosts)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl<B: AsyncBackend> AsyncBackend for AsyncLazyBackend<B> {
    async fn execute(
        &self,
        statement: &Statement,
        options: &ExecOptions,
    ) -> Result<Vec<Row>, TransportError> {
        self.connection().await?.execute(statement, options).await
    }

    fn default_keyspace(&self) -> Option<&str> {
        self.config.default_keyspace.as_deref()
    }

    /// No-op when never connected.
    async fn close(&self) -> Result<(), TransportError> {
        match self.connection.get() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use futures_util::future::{join_all, FutureExt};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> TrellisConfig {
        TrellisConfig {
            default_keyspace: Some("shop".to_string()),
            ..Default::default()
        }
    }

    fn select() -> Statement {
        Statement::raw("SELECT * FROM shop.t", vec![])
    }

    #[test]
    fn test_does_not_connect_until_used() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let lazy = LazyBackend::new(config(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(MockBackend::new())
        });

        assert_eq!(Backend::default_keyspace(&lazy), Some("shop"));
        assert!(Backend::close(&lazy).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert!(!lazy.is_connected());
    }

    #[test]
    fn test_concurrent_first_use_connects_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let lazy = LazyBackend::new(config(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(MockBackend::new())
        });

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    Backend::execute(&lazy, &select(), &ExecOptions::default()).unwrap();
                });
            }
        });

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.connection().unwrap().executed_count(), 8);
    }

    #[test]
    fn test_failed_connect_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let lazy = LazyBackend::new(config(), move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TransportError::new("connection refused"))
            } else {
                Ok(MockBackend::new())
            }
        });

        assert!(Backend::execute(&lazy, &select(), &ExecOptions::default()).is_err());
        assert!(Backend::execute(&lazy, &select(), &ExecOptions::default()).is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_async_concurrent_first_use_connects_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let lazy = AsyncLazyBackend::new(config(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::task::yield_now().await;
                Ok::<_, TransportError>(MockBackend::new())
            }
            .boxed()
        });

        let statement = select();
        let options = ExecOptions::default();
        let results = join_all(
            (0..8).map(|_| AsyncBackend::execute(&lazy, &statement, &options)),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(lazy.is_connected());
    }

    #[tokio::test]
    async fn test_async_close_without_connect() {
        let lazy = AsyncLazyBackend::new(config(), |_| {
            async { Err::<MockBackend, _>(TransportError::new("unreachable")) }.boxed()
        });
        assert!(AsyncBackend::close(&lazy).await.is_ok());
        assert!(!lazy.is_connected());
    }
}
