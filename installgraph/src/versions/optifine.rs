//! OptiFine versions from the BMCLAPI index.

use serde::Deserialize;

use crate::download::BMCLAPI_ROOT;

use super::error::VersionListError;
use super::list::VersionSource;
use super::types::{LoaderKind, RemoteVersion};

#[derive(Debug, Deserialize)]
struct OptiFineBuild {
    #[serde(rename = "mcversion")]
    game_version: String,
    #[serde(rename = "type")]
    edition: String,
    patch: String,
}

/// OptiFine builds for every game version, from one manifest.
#[derive(Clone, Debug)]
pub struct OptiFineSource {
    root: String,
}

impl OptiFineSource {
    pub fn new() -> Self {
        Self::with_root(BMCLAPI_ROOT)
    }

    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for OptiFineSource {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionSource for OptiFineSource {
    fn loader(&self) -> LoaderKind {
        LoaderKind::OptiFine
    }

    fn manifest_url(&self, _game_version: Option<&str>) -> String {
        format!("{}/optifine/versionList", self.root)
    }

    fn parse(
        &self,
        body: &str,
        _game_version: Option<&str>,
    ) -> Result<Vec<RemoteVersion>, VersionListError> {
        let builds: Vec<OptiFineBuild> =
            serde_json::from_str(body).map_err(|source| VersionListError::Malformed {
                loader: LoaderKind::OptiFine,
                source,
            })?;

        Ok(builds
            .into_iter()
            .map(|build| {
                let url = format!(
                    "{}/optifine/{}/{}/{}",
                    self.root, build.game_version, build.edition, build.patch
                );
                let self_version = format!("{}_{}", build.edition, build.patch);
                RemoteVersion::new(LoaderKind::OptiFine, build.game_version, self_version, url)
            })
            .collect())
    }
}
