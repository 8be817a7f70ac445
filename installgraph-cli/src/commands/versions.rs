//! `versions` command.

use clap::{Args, ValueEnum};
use installgraph::config::ConfigFile;
use installgraph::versions::{version_list, LoaderKind};

use super::common::CommandContext;
use crate::error::CliError;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LoaderArg {
    /// Forge (queried per game version)
    Forge,
    /// OptiFine
    Optifine,
    /// LiteLoader
    Liteloader,
}

impl From<LoaderArg> for LoaderKind {
    fn from(arg: LoaderArg) -> Self {
        match arg {
            LoaderArg::Forge => LoaderKind::Forge,
            LoaderArg::Optifine => LoaderKind::OptiFine,
            LoaderArg::Liteloader => LoaderKind::LiteLoader,
        }
    }
}

#[derive(Debug, Args)]
pub struct VersionsArgs {
    /// Loader to list
    #[arg(value_enum)]
    pub loader: LoaderArg,

    /// Game version to list (repeatable; required for forge)
    #[arg(long = "game")]
    pub games: Vec<String>,
}

pub fn run(args: VersionsArgs, config: ConfigFile) -> Result<(), CliError> {
    let ctx = CommandContext::new(config)?;
    let list = version_list(args.loader.into(), ctx.downloader("versions"));

    let report = ctx.run(list.refresh(&args.games))?;
    report.into_result()?;

    let games = if args.games.is_empty() {
        list.game_versions()
    } else {
        args.games
    };

    for game in games {
        let versions = list.versions(&game);
        println!("[{}] {} version(s)", game, versions.len());
        for version in versions {
            match &version.released {
                Some(released) => println!("  {}  ({})", version.self_version, released),
                None => println!("  {}", version.self_version),
            }
        }
    }
    Ok(())
}
