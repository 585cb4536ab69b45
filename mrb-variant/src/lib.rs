//! Reference benchmark variant.
//!
//! A small item service that implements the harness contract end to end.
//! The harness tests run it in-process; deployed variants in other runtimes
//! must behave the same way on the wire.

pub mod routes;
pub mod store;

pub use routes::{VariantState, create_router};
pub use store::{Item, ItemStore};

use std::future::Future;
use tokio::net::TcpListener;
use tracing::info;

/// Serve the variant on an already-bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: VariantState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, runtime_id = %state.probe.identity().runtime_id, "Variant listening");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
