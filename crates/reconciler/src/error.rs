use thiserror::Error;

/// Error taxonomy for the reconciliation engine.
///
/// Deliberately small. Malformed chunks never appear here: unknown
/// payloads are dropped at the adapter boundary. Cancellation is routed
/// as an interrupted completion rather than an error. Persistence write
/// failures are logged and retried by the next throttled write; they
/// surface only when a store becomes unreachable for the final flush.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Upstream provider failure: {0}")]
    Upstream(String),

    #[error("Persistence write failed: {0}")]
    PersistenceWrite(String),
}
