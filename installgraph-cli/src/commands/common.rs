//! Shared setup for commands that run a pipeline.

use std::sync::Arc;

use installgraph::concurrency::DownloadConcurrencyController;
use installgraph::config::ConfigFile;
use installgraph::download::{Downloader, ReqwestClient};
use installgraph::executor::{PipelineReport, TaskGraphExecutor, TaskHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::console::ConsoleListener;
use crate::error::CliError;

/// Network client, settings and executor for one CLI invocation.
pub struct CommandContext {
    pub config: ConfigFile,
    client: Arc<ReqwestClient>,
}

impl CommandContext {
    /// Applies the download settings process-wide and builds the client.
    pub fn new(config: ConfigFile) -> Result<Self, CliError> {
        let previous = DownloadConcurrencyController::global().set(config.download.concurrency);
        debug!(previous, current = config.download.concurrency, "Applied download concurrency");

        let client = ReqwestClient::with_timeout(config.download.timeout())?;
        Ok(Self {
            config,
            client: Arc::new(client),
        })
    }

    /// Returns a downloader with its own guard, following the settings.
    pub fn downloader(&self, label: &str) -> Downloader {
        Downloader::new(self.client.clone(), label)
            .with_retry(self.config.download.retry_policy())
            .with_mirrors(self.config.download.mirrors())
    }

    /// Runs `root` to completion on a fresh runtime.
    ///
    /// Ctrl-C cancels the pipeline; the report then says so.
    pub fn run(&self, root: TaskHandle) -> Result<PipelineReport, CliError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("installgraph-worker")
            .build()
            .map_err(CliError::Runtime)?;

        let executor = TaskGraphExecutor::with_listener(
            self.config.executor.to_executor_config(),
            Arc::new(ConsoleListener::new()),
        );

        runtime.block_on(async {
            info!(root = %root.name(), "Starting pipeline");
            let pipeline = executor.submit(root);
            install_interrupt_handler(pipeline.cancellation_token())?;

            let report = pipeline.wait().await;
            println!("{}", executor.metrics().snapshot());
            Ok::<_, CliError>(report)
        })
    }
}

fn install_interrupt_handler(token: CancellationToken) -> Result<(), CliError> {
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted, cancelling...");
        token.cancel();
    })
    .map_err(|e| CliError::Signal(e.to_string()))
}
