//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. All custody routes
//! live in `routes::wallet_routes`; this module owns the listener loop and
//! the shared [`AppState`].

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::Args;
use crate::custody::kdf_worker::{KdfPoolConfig, KdfWorkerPool};
use crate::recovery::RecoveryService;
use crate::rotation::RotationService;
use crate::routes;
use crate::signing::SigningOrchestrator;
use crate::store::MemoryWalletStore;
use crate::types::KeygateError;

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Shared state for all request handlers.
pub struct AppState {
    pub args: Args,
    pub store: Arc<MemoryWalletStore>,
    pub kdf_pool: Arc<KdfWorkerPool>,
    pub orchestrator: SigningOrchestrator<MemoryWalletStore>,
    pub recovery: RecoveryService<MemoryWalletStore>,
    pub rotation: RotationService<MemoryWalletStore>,
}

impl AppState {
    /// Wire up the custody services around one in-memory store.
    pub fn new(args: Args) -> Self {
        let store = Arc::new(MemoryWalletStore::new());
        let kdf_pool = Arc::new(KdfWorkerPool::new(KdfPoolConfig {
            worker_count: args.kdf_worker_count,
            max_queue_size: args.kdf_max_queue_size,
            request_timeout_ms: args.kdf_request_timeout_ms,
        }));

        let orchestrator = SigningOrchestrator::new(Arc::clone(&store), Arc::clone(&kdf_pool));
        let recovery = RecoveryService::new(Arc::clone(&store), args.pending_recovery_ttl_secs);
        let rotation = RotationService::new(Arc::clone(&store));

        Self {
            args,
            store,
            kdf_pool,
            orchestrator,
            recovery,
            rotation,
        }
    }
}

/// Spawn the periodic maintenance task: sweeps expired pending recovery
/// records and prunes idle per-wallet signing locks.
pub fn spawn_cleanup_task(state: Arc<AppState>) {
    let interval = Duration::from_secs(state.args.recovery_cleanup_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately, skip it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.recovery.cleanup_expired().await {
                Ok(removed) => {
                    debug!(removed, "Recovery cleanup sweep complete");
                }
                Err(e) => error!("Recovery cleanup sweep failed: {}", e),
            }
            let pruned = state.orchestrator.prune_idle_locks();
            if pruned > 0 {
                debug!(pruned, "Pruned idle wallet locks");
            }
        }
    });
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<(), KeygateError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!(
        "Keygate listening on {} as node {}",
        state.args.listen, state.args.node_id
    );
    info!(
        "KDF pool ready ({} workers, queue {})",
        state.kdf_pool.worker_count(),
        state.args.kdf_max_queue_size
    );

    spawn_cleanup_task(Arc::clone(&state));

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .preserve_header_case(true)
                        .title_case_headers(true)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("[{}] {} {}", addr, method, path);

    if let Some(response) = routes::handle_wallet_request(req, Arc::clone(&state)).await {
        return Ok(response);
    }

    Ok(not_found_response(&path))
}

fn not_found_response(path: &str) -> Response<BoxBody> {
    let body = serde_json::json!({ "error": format!("Not found: {}", path) }).to_string();
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .body(
            Full::new(Bytes::from(body))
                .map_err(|never| match never {})
                .boxed(),
        )
        .unwrap()
}
