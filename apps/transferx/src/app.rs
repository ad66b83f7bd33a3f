//! Server and client runners.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use transferx_channel::{FileReceiver, FileSender, TracingObserver};

use crate::config::Cli;

/// Serves until Ctrl-C.
pub async fn run_server(cli: &Cli, output_dir: PathBuf) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let receiver = FileReceiver::new(output_dir, cli.channel_config(), Arc::new(TracingObserver));
    let listener = receiver.bind((cli.host.as_str(), cli.port)).await?;

    tokio::select! {
        _ = receiver.serve(listener, cancel.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
            cancel.cancel();
        }
    }

    Ok(())
}

/// Makes one transfer attempt. Failures are logged by the observer.
pub async fn run_client(cli: &Cli, file_path: &Path) {
    let sender = FileSender::new(cli.channel_config(), Arc::new(TracingObserver));

    if let Ok(report) = sender
        .send_file((cli.host.as_str(), cli.port), file_path)
        .await
    {
        tracing::info!(
            file = %file_path.display(),
            bytes = report.bytes_sent,
            confirmed = report.confirmed(),
            "file sent"
        );
    }
}
