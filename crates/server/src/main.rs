mod api;
mod bootstrap;
mod health;
mod sse;
mod workers;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tagwatch_core::config::LoadOptions;
use tagwatch_engine::{Poller, SummaryComposer, SummaryScheduler};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).compact().init();

    let app = bootstrap::bootstrap(LoadOptions::default()).await?;
    let cancel = CancellationToken::new();
    let mut tasks = tokio::task::JoinSet::new();

    let poller = Poller::new(app.core.clone());
    let poller_cancel = cancel.clone();
    tasks.spawn(async move { poller.run(poller_cancel).await });

    let scheduler = SummaryScheduler::new(app.core.clone());
    let scheduler_cancel = cancel.clone();
    tasks.spawn(async move { scheduler.run(scheduler_cancel).await });

    tasks.spawn(workers::chat_listener(app.core.clone(), cancel.clone()));

    let state = api::ApiState {
        core: app.core.clone(),
        composer: Arc::new(SummaryComposer::new(app.core.clone())),
        db_pool: app.db_pool.clone(),
    };
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = TcpListener::bind(&address).await?;
    info!(address = %address, "tagwatch server listening");

    let server_cancel = cancel.clone();
    tasks.spawn(async move {
        let shutdown = async move { server_cancel.cancelled().await };
        if let Err(server_error) =
            axum::serve(listener, api::router(state)).with_graceful_shutdown(shutdown).await
        {
            error!(error = %server_error, "http server terminated unexpectedly");
        }
    });

    wait_for_shutdown().await?;
    info!("shutdown signal received; stopping workers");
    cancel.cancel();

    let deadline = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(deadline, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        error!("workers did not stop within the graceful shutdown window");
    }

    app.db_pool.close().await;
    info!("tagwatch server stopped");
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
