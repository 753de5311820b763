//! Fixed-size pool of host clients for parallel enrichment.
//!
//! Acquire/release is FIFO over a bounded channel; a worker that cannot get
//! a client within the acquire timeout fails with a clearly identified
//! error instead of deadlocking the range run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::error::FetchError;
use crate::host::client::{HostClient, HostOptions, SearchThrottle};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool of independent [`HostClient`]s sharing one search throttle.
pub struct ClientPool {
    tx: mpsc::Sender<HostClient>,
    rx: tokio::sync::Mutex<mpsc::Receiver<HostClient>>,
    size: usize,
}

impl ClientPool {
    pub fn new(
        base_url: &str,
        token: &str,
        size: usize,
        options: HostOptions,
    ) -> Result<Self, FetchError> {
        let size = size.max(1);
        let throttle = Arc::new(SearchThrottle::new(options.search_interval));
        let (tx, rx) = mpsc::channel(size);
        for _ in 0..size {
            let client =
                HostClient::with_throttle(base_url, token, options.clone(), Arc::clone(&throttle))?;
            tx.try_send(client).expect("pool channel sized to fit");
        }
        info!(size, "host client pool created");
        Ok(ClientPool {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Take a client, blocking up to the acquire timeout.
    pub async fn acquire(&self) -> Result<PooledClient, FetchError> {
        self.acquire_timeout(ACQUIRE_TIMEOUT).await
    }

    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledClient, FetchError> {
        let client = {
            let mut rx = self.rx.lock().await;
            tokio::time::timeout(timeout, rx.recv())
                .await
                .map_err(|_| FetchError::PoolTimeout {
                    timeout_secs: timeout.as_secs(),
                })?
        };
        match client {
            Some(client) => Ok(PooledClient {
                client: Some(client),
                tx: self.tx.clone(),
            }),
            None => Err(FetchError::PoolTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// RAII guard returning the client to the pool on drop.
pub struct PooledClient {
    client: Option<HostClient>,
    tx: mpsc::Sender<HostClient>,
}

impl std::ops::Deref for PooledClient {
    type Target = HostClient;

    fn deref(&self) -> &HostClient {
        self.client.as_ref().expect("client present until drop")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            // Capacity equals pool size, so the send cannot fail while the
            // pool is alive.
            let _ = self.tx.try_send(client);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(size: usize) -> ClientPool {
        ClientPool::new(
            "https://ghe.example.com",
            "t0ken",
            size,
            HostOptions::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn acquire_release_cycles() {
        let pool = pool(2);
        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        drop(a);
        let c = pool.acquire().await.unwrap();
        drop(b);
        drop(c);
        assert_eq!(pool.size(), 2);
    }

    #[tokio::test]
    async fn exhausted_pool_times_out() {
        let pool = pool(1);
        let held = pool.acquire().await.unwrap();
        let err = pool
            .acquire_timeout(Duration::from_millis(50))
            .await
            .err()
            .expect("should time out");
        assert!(matches!(err, FetchError::PoolTimeout { .. }));
        drop(held);
    }

    #[tokio::test]
    async fn released_client_unblocks_waiter() {
        let pool = Arc::new(pool(1));
        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move {
                pool.acquire_timeout(Duration::from_secs(5)).await.is_ok()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }
}
