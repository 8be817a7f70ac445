//! `assets` command.

use std::path::PathBuf;

use clap::Args;
use installgraph::config::ConfigFile;
use installgraph::executor::TaskHandle;
use installgraph::versions::{AssetIndexRef, AssetIndexTask};

use super::common::CommandContext;
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct AssetsArgs {
    /// URL of the asset index JSON
    #[arg(long)]
    pub index_url: String,

    /// Assets directory (defaults to <download.directory>/assets)
    #[arg(long)]
    pub assets_dir: Option<PathBuf>,

    /// Index id (defaults to the index file name without .json)
    #[arg(long)]
    pub index_id: Option<String>,

    /// Expected SHA-1 of the index file
    #[arg(long)]
    pub index_sha1: Option<String>,
}

pub fn run(args: AssetsArgs, config: ConfigFile) -> Result<(), CliError> {
    let id = match args.index_id {
        Some(id) => id,
        None => index_id_from_url(&args.index_url)?,
    };
    let assets_dir = args
        .assets_dir
        .unwrap_or_else(|| config.download.directory.join("assets"));

    let ctx = CommandContext::new(config)?;
    let task = AssetIndexTask::new(
        ctx.downloader("assets"),
        AssetIndexRef {
            id,
            url: args.index_url,
            sha1: args.index_sha1,
        },
        &assets_dir,
    );

    ctx.run(TaskHandle::new(task))?.into_result()?;
    println!("Assets up to date in {}", assets_dir.display());
    Ok(())
}

fn index_id_from_url(url: &str) -> Result<String, CliError> {
    url.rsplit('/')
        .next()
        .map(|name| name.trim_end_matches(".json"))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| CliError::InvalidArgument(format!("cannot derive an index id from '{}'", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_id_from_url() {
        assert_eq!(
            index_id_from_url("https://piston-meta.mojang.com/v1/packages/abc/1.20.json").unwrap(),
            "1.20"
        );
        assert!(index_id_from_url("https://example.com/").is_err());
    }
}
