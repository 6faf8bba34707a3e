use async_trait::async_trait;
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{info, warn};

/// Best-effort event logger. In production this seam is where a distributed
/// ledger client plugs in; the core only depends on this contract and never
/// lets a failed submission affect the primary operation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn submit(&self, event_type: &str, payload: Value) -> anyhow::Result<()>;
}

/// Demo/mock sink used when no ledger credentials are configured: events go
/// to the process log and nowhere else.
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn submit(&self, event_type: &str, payload: Value) -> anyhow::Result<()> {
        info!(event_type, payload = %payload, "audit event");
        Ok(())
    }
}

/// Submits an audit event, swallowing any sink failure. Callers invoke this
/// only after the primary store mutation has succeeded.
pub async fn record(sink: &dyn AuditSink, event_type: &str, mut payload: Value) {
    if let Value::Object(map) = &mut payload {
        if let Ok(ts) = OffsetDateTime::now_utc().format(&Rfc3339) {
            map.insert("timestamp".into(), Value::String(ts));
        }
    }
    if let Err(e) = sink.submit(event_type, payload).await {
        warn!(error = %e, event_type, "audit sink submission failed");
    }
}
