//! `download` command.

use std::path::PathBuf;

use clap::Args;
use installgraph::concurrency::MAX_CONCURRENCY;
use installgraph::config::ConfigFile;
use installgraph::download::{Checksum, FileDownloadTask};
use installgraph::executor::TaskHandle;

use super::common::CommandContext;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// URLs to download
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Target directory (defaults to download.directory)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Concurrent transfers, at most 1024 (overrides download.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Expected SHA-1 of the file (single URL only)
    #[arg(long)]
    pub sha1: Option<String>,
}

pub fn run(args: DownloadArgs, mut config: ConfigFile) -> Result<(), CliError> {
    if args.sha1.is_some() && args.urls.len() != 1 {
        return Err(CliError::InvalidArgument(
            "--sha1 can only be used with a single URL".to_string(),
        ));
    }
    if let Some(concurrency) = args.concurrency {
        config.download.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
    }

    let dir = args.dir.unwrap_or_else(|| config.download.directory.clone());
    let ctx = CommandContext::new(config)?;
    let downloader = ctx.downloader("download");

    let mut tasks = Vec::with_capacity(args.urls.len());
    for url in &args.urls {
        let file_name = file_name_from_url(url)?;
        let mut task = FileDownloadTask::new(
            format!("Download {}", file_name),
            downloader.clone(),
            vec![url.clone()],
            dir.join(&file_name),
        );
        if let Some(sha1) = &args.sha1 {
            task = task.with_checksum(Checksum::sha1(sha1));
        }
        tasks.push(TaskHandle::new(task));
    }

    let count = tasks.len();
    let report = ctx.run(TaskHandle::group("Download files", tasks))?;
    report.into_result()?;

    println!("Downloaded {} file(s) to {}", count, dir.display());
    Ok(())
}

/// Returns the last path segment of `url`, without query or fragment.
fn file_name_from_url(url: &str) -> Result<String, CliError> {
    url.split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty() && !name.contains(':'))
        .map(str::to_string)
        .ok_or_else(|| CliError::InvalidArgument(format!("cannot derive a file name from '{}'", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_url() {
        assert_eq!(
            file_name_from_url("https://example.com/a/client.jar?sig=1#x").unwrap(),
            "client.jar"
        );
        assert!(file_name_from_url("https://example.com/").is_err());
        assert!(file_name_from_url("https:").is_err());
    }
}
