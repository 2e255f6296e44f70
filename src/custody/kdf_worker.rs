//! In-process worker pool for Argon2id derivations.
//!
//! Key derivation takes tens to hundreds of milliseconds by design and must
//! never run on a latency-sensitive path. Requests are queued to a fixed set
//! of worker tasks, executed on the blocking thread pool, and correlated
//! back to callers by a numeric request id. Multiple derivations may be in
//! flight at once (a rotation overlapping a sign attempt) and complete in
//! any order.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::kdf::{derive_unlock_key, KdfParams, UNLOCK_KEY_LEN};
use crate::types::{KeygateError, Result};

/// Request sent to the worker pool
struct KdfRequest {
    /// Correlation id, unique per derivation
    request_id: u64,
    /// Low-entropy secret to stretch (wiped when the request drops)
    secret: Zeroizing<Vec<u8>>,
    /// Derivation parameters
    params: KdfParams,
    /// Channel to send the derived key back
    response_tx: oneshot::Sender<Result<Zeroizing<[u8; UNLOCK_KEY_LEN]>>>,
}

/// Configuration for the KDF worker pool
#[derive(Debug, Clone)]
pub struct KdfPoolConfig {
    /// Number of worker tasks. Each in-flight derivation holds the full
    /// Argon2 memory cost, so this bounds peak memory.
    pub worker_count: usize,
    /// Maximum queued requests
    pub max_queue_size: usize,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for KdfPoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_queue_size: 256,
            request_timeout_ms: 10_000,
        }
    }
}

/// Fixed pool of derivation workers with request-id correlation.
pub struct KdfWorkerPool {
    /// Channel to send requests to workers
    request_tx: mpsc::Sender<KdfRequest>,
    /// Semaphore to limit queue depth
    semaphore: Arc<Semaphore>,
    /// Request timeout
    timeout: Duration,
    /// Monotonic request-id source
    next_request_id: AtomicU64,
    /// Number of workers currently running
    active_workers: Arc<AtomicUsize>,
    /// Total number of workers
    worker_count: usize,
}

impl KdfWorkerPool {
    /// Create and start a new worker pool
    pub fn new(config: KdfPoolConfig) -> Self {
        let (request_tx, request_rx) = mpsc::channel::<KdfRequest>(config.max_queue_size);
        let request_rx = Arc::new(tokio::sync::Mutex::new(request_rx));

        let semaphore = Arc::new(Semaphore::new(config.max_queue_size));
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let active_workers = Arc::new(AtomicUsize::new(0));

        info!("Starting KDF worker pool with {} workers", config.worker_count);

        for i in 0..config.worker_count {
            let request_rx = Arc::clone(&request_rx);
            let active_workers = Arc::clone(&active_workers);

            tokio::spawn(async move {
                worker_task(i, request_rx, active_workers).await;
            });
        }

        Self {
            request_tx,
            semaphore,
            timeout,
            next_request_id: AtomicU64::new(1),
            active_workers,
            worker_count: config.worker_count,
        }
    }

    /// Queue a derivation and wait for its result.
    ///
    /// Concurrent calls resolve independently and may complete out of
    /// order; the pool correlates responses by request id.
    pub async fn derive(
        &self,
        secret: Zeroizing<Vec<u8>>,
        params: KdfParams,
    ) -> Result<Zeroizing<[u8; UNLOCK_KEY_LEN]>> {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| KeygateError::Unavailable("KDF pool semaphore closed".into()))?;

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (response_tx, response_rx) = oneshot::channel();

        let request = KdfRequest {
            request_id,
            secret,
            params,
            response_tx,
        };

        self.request_tx
            .send(request)
            .await
            .map_err(|_| KeygateError::Unavailable("KDF worker pool closed".into()))?;

        match tokio::time::timeout(self.timeout, response_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(KeygateError::Unavailable(
                "KDF response channel closed".into(),
            )),
            Err(_) => {
                warn!(request_id, "KDF derivation timed out");
                Err(KeygateError::Unavailable("KDF derivation timeout".into()))
            }
        }
    }

    /// Check if the pool is healthy (at least one worker running)
    pub fn is_healthy(&self) -> bool {
        self.active_workers.load(Ordering::Relaxed) > 0
    }

    /// Get the total number of workers
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Get current queue headroom (approximate)
    pub fn queue_headroom(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Worker task that processes derivation requests from the pool
async fn worker_task(
    worker_id: usize,
    request_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<KdfRequest>>>,
    active_workers: Arc<AtomicUsize>,
) {
    active_workers.fetch_add(1, Ordering::Relaxed);
    info!("KDF worker {} started", worker_id);

    loop {
        let request = {
            let mut rx = request_rx.lock().await;
            match rx.recv().await {
                Some(r) => r,
                None => {
                    active_workers.fetch_sub(1, Ordering::Relaxed);
                    info!("KDF worker {} shutting down (channel closed)", worker_id);
                    return;
                }
            }
        };

        let KdfRequest {
            request_id,
            secret,
            params,
            response_tx,
        } = request;

        debug!(worker_id, request_id, "Processing KDF derivation");

        // Argon2 is CPU/memory-bound; keep it off the async executor.
        let result =
            tokio::task::spawn_blocking(move || derive_unlock_key(&secret, &params)).await;

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                error!(worker_id, request_id, "KDF blocking task panicked: {}", e);
                Err(KeygateError::Internal("KDF task failed".into()))
            }
        };

        match &result {
            Ok(_) => debug!(worker_id, request_id, "KDF derivation complete"),
            Err(e) => debug!(worker_id, request_id, "KDF derivation failed: {}", e),
        }

        // Caller may have timed out and dropped the receiver; nothing to do.
        let _ = response_tx.send(result);
    }
}
