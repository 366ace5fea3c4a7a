//! Structured logging setup shared by every binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Run `fut` inside a `tracing` span named `name`, recording `target` as a
/// field. Every external call the fabric makes (LLM call, subprocess,
/// store read) is expected to be wrapped this way so the structured logs
/// carry a uniform call name regardless of component.
pub async fn traced<T>(name: &'static str, target: &str, fut: impl std::future::Future<Output = T>) -> T {
    let span = tracing::info_span!("call", name, target = %target);
    tracing::Instrument::instrument(fut, span).await
}

/// Install a `tracing` subscriber scoped to `service_name`, honoring
/// `RUST_LOG` and otherwise defaulting that service's own target to `info`.
pub fn init_tracing(service_name: &str) {
    let default_filter = format!("{}=info,warn", service_name.replace('-', "_"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false),
        )
        .init();
}
