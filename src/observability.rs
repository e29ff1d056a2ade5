use std::net::SocketAddr;

use crate::engine::EngineError;

// ── Admission outcomes ──────────────────────────────────────────

/// Counter: reservations admitted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "roomledger_reservations_created_total";

/// Counter: reservation requests rejected by the ledger. Labels: reason.
pub const RESERVATIONS_REJECTED_TOTAL: &str = "roomledger_reservations_rejected_total";

/// Counter: reservations moved from ACTIVE to CANCELLED.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "roomledger_reservations_cancelled_total";

/// Counter: mutations refused by the authorization gate. Labels: action.
pub const AUTHZ_DENIED_TOTAL: &str = "roomledger_authz_denied_total";

// ── Journal ─────────────────────────────────────────────────────

/// Counter: journal appends or compactions that failed.
pub const STORE_FAILURES_TOTAL: &str = "roomledger_store_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomledger_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map an error to a short label for metrics.
pub fn error_label(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotFound(_) => "not_found",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::InvalidInterval => "invalid_interval",
        EngineError::CapacityExceeded { .. } => "capacity_exceeded",
        EngineError::SlotUnavailable(_) => "slot_unavailable",
        EngineError::InvalidRole(_) => "invalid_role",
        EngineError::NotConfirmed(_) => "not_confirmed",
        EngineError::Unauthorized => "unauthorized",
        EngineError::InvalidInput(_) => "invalid_input",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::StoreFailure(_) => "store_failure",
    }
}
