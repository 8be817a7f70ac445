//! Version lists backed by remote manifests.
//!
//! Refreshing a list does not fetch anything by itself: it returns a task
//! graph for the executor to run.
//!
//! ```text
//! Refresh forge versions (group)
//! ├── Parse forge versions for 1.12.2 ── Fetch forge versions for 1.12.2
//! └── Parse forge versions for 1.7.10 ── Fetch forge versions for 1.7.10
//! ```
//!
//! Sources with a single manifest for every game version have one
//! fetch/parse pair.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::download::Downloader;
use crate::executor::{BoxFuture, ResultSlot, Task, TaskContext, TaskError, TaskHandle};

use super::error::VersionListError;
use super::types::{compare_game_versions, LoaderKind, RemoteVersion};

/// A list of installable versions that can be refreshed from the network.
pub trait VersionList: Send + Sync {
    /// Returns the loader this list describes.
    fn loader(&self) -> LoaderKind;

    /// Returns a task that populates the list for `game_versions`.
    ///
    /// Sources with a single manifest ignore `game_versions`.
    fn refresh(&self, game_versions: &[String]) -> TaskHandle;

    /// Returns the known versions for a game version.
    fn versions(&self, game_version: &str) -> Vec<RemoteVersion>;

    /// Returns every game version with at least one loaded entry, oldest
    /// first (see [`compare_game_versions`]).
    fn game_versions(&self) -> Vec<String>;

    /// Looks up one version.
    fn version(&self, game_version: &str, self_version: &str) -> Option<RemoteVersion> {
        self.versions(game_version)
            .into_iter()
            .find(|v| v.self_version == self_version)
    }

    /// Returns true once any refresh has succeeded.
    fn is_loaded(&self) -> bool;
}

/// Where a [`RemoteVersionList`] gets its manifest and how to read it.
pub trait VersionSource: Send + Sync + 'static {
    fn loader(&self) -> LoaderKind;

    /// Returns true if the source publishes one manifest per game version.
    fn per_game_version(&self) -> bool {
        false
    }

    /// Returns the manifest URL, for one game version or for all.
    fn manifest_url(&self, game_version: Option<&str>) -> String;

    /// Parses a manifest.
    fn parse(
        &self,
        body: &str,
        game_version: Option<&str>,
    ) -> Result<Vec<RemoteVersion>, VersionListError>;
}

#[derive(Default)]
struct VersionMap {
    loaded: bool,
    by_game: HashMap<String, Vec<RemoteVersion>>,
}

/// Generic [`VersionList`] over a [`VersionSource`].
pub struct RemoteVersionList<S> {
    source: Arc<S>,
    downloader: Downloader,
    map: Arc<RwLock<VersionMap>>,
}

impl<S: VersionSource> RemoteVersionList<S> {
    pub fn new(source: S, downloader: Downloader) -> Self {
        Self {
            source: Arc::new(source),
            downloader,
            map: Arc::new(RwLock::new(VersionMap::default())),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn refresh_one(&self, game_version: Option<&str>) -> TaskHandle {
        let loader = self.source.loader();
        let suffix = game_version.map(|g| format!(" for {}", g)).unwrap_or_default();

        let fetch = self.downloader.text(
            format!("Fetch {} versions{}", loader, suffix),
            self.source.manifest_url(game_version),
        );
        let body = fetch.result_slot();

        TaskHandle::new(ParseVersionsTask {
            name: format!("Parse {} versions{}", loader, suffix),
            source: Arc::clone(&self.source),
            fetch: TaskHandle::new(fetch),
            body,
            game_version: game_version.map(str::to_string),
            map: Arc::clone(&self.map),
        })
    }
}

impl<S: VersionSource> VersionList for RemoteVersionList<S> {
    fn loader(&self) -> LoaderKind {
        self.source.loader()
    }

    fn refresh(&self, game_versions: &[String]) -> TaskHandle {
        let loader = self.source.loader();
        let name = format!("Refresh {} versions", loader);

        if !self.source.per_game_version() {
            return TaskHandle::group(name, vec![self.refresh_one(None)]);
        }

        if game_versions.is_empty() {
            return TaskHandle::from_fn(name, move |_ctx| async move {
                Err(VersionListError::GameVersionRequired(loader).into())
            });
        }

        let mut requested: Vec<&str> = Vec::new();
        for game_version in game_versions {
            if !requested.contains(&game_version.as_str()) {
                requested.push(game_version);
            }
        }
        let members = requested.into_iter().map(|g| self.refresh_one(Some(g))).collect();
        TaskHandle::group(name, members)
    }

    fn versions(&self, game_version: &str) -> Vec<RemoteVersion> {
        self.map
            .read()
            .by_game
            .get(game_version)
            .cloned()
            .unwrap_or_default()
    }

    fn game_versions(&self) -> Vec<String> {
        let mut games: Vec<String> = self.map.read().by_game.keys().cloned().collect();
        games.sort_by(|a, b| compare_game_versions(a, b));
        games
    }

    fn is_loaded(&self) -> bool {
        self.map.read().loaded
    }
}

struct ParseVersionsTask<S> {
    name: String,
    source: Arc<S>,
    fetch: TaskHandle,
    body: ResultSlot<String>,
    game_version: Option<String>,
    map: Arc<RwLock<VersionMap>>,
}

impl<S: VersionSource> Task for ParseVersionsTask<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<TaskHandle> {
        vec![self.fetch.clone()]
    }

    fn execute<'a>(&'a self, ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
        Box::pin(async move {
            if !ctx.dependencies_succeeded() {
                return Err(TaskError::new("version manifest was not fetched"));
            }
            let body = self
                .body
                .get()
                .ok_or_else(|| TaskError::missing_input("version manifest"))?;

            let versions = self.source.parse(body, self.game_version.as_deref())?;
            let count = versions.len();

            let mut map = self.map.write();
            match &self.game_version {
                Some(game_version) => {
                    map.by_game.insert(game_version.clone(), versions);
                }
                None => {
                    map.by_game.clear();
                    for version in versions {
                        map.by_game
                            .entry(version.game_version.clone())
                            .or_default()
                            .push(version);
                    }
                }
            }
            map.loaded = true;
            drop(map);

            info!(
                loader = %self.source.loader(),
                game_version = self.game_version.as_deref().unwrap_or("*"),
                count,
                "Loaded versions"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::ConcurrencyGuard;
    use crate::download::http::tests::MockHttpClient;
    use crate::download::{DownloadSource, MirrorList};
    use crate::executor::{RetryPolicy, TaskGraphExecutor};

    /// Lines of `game:version`.
    struct LineSource {
        per_game: bool,
    }

    impl VersionSource for LineSource {
        fn loader(&self) -> LoaderKind {
            LoaderKind::Forge
        }

        fn per_game_version(&self) -> bool {
            self.per_game
        }

        fn manifest_url(&self, game_version: Option<&str>) -> String {
            format!("http://meta/{}", game_version.unwrap_or("all"))
        }

        fn parse(&self, body: &str, _game: Option<&str>) -> Result<Vec<RemoteVersion>, VersionListError> {
            Ok(body
                .lines()
                .filter_map(|line| line.split_once(':'))
                .map(|(game, version)| {
                    RemoteVersion::new(LoaderKind::Forge, game, version, format!("http://dl/{}", version))
                })
                .collect())
        }
    }

    fn list(per_game: bool, client: MockHttpClient) -> RemoteVersionList<LineSource> {
        let downloader = Downloader::with_guard(Arc::new(client), ConcurrencyGuard::new(4, "versions"))
            .with_retry(RetryPolicy::None)
            .with_mirrors(MirrorList::without_rules(DownloadSource::Official));
        RemoteVersionList::new(LineSource { per_game }, downloader)
    }

    #[tokio::test]
    async fn test_single_manifest_groups_by_game() {
        let list = list(
            false,
            MockHttpClient::new().with_body("http://meta/all", "1.12.2:a\n1.12.2:b\n1.7.10:c\n1.10:d\n1.9:e"),
        );
        assert!(!list.is_loaded());

        let report = TaskGraphExecutor::default().run(list.refresh(&[])).await;
        assert!(report.is_success(), "{:?}", report.failures);
        assert!(list.is_loaded());
        assert_eq!(list.versions("1.12.2").len(), 2);
        assert_eq!(list.version("1.7.10", "c").unwrap().urls, vec!["http://dl/c"]);
        assert!(list.version("1.7.10", "a").is_none());
        assert_eq!(list.game_versions(), vec!["1.7.10", "1.9", "1.10", "1.12.2"]);
    }

    #[tokio::test]
    async fn test_per_game_fetches_each_requested_version_once() {
        let list = list(
            true,
            MockHttpClient::new()
                .with_body("http://meta/1.12.2", "1.12.2:a")
                .with_body("http://meta/1.7.10", "1.7.10:c"),
        );
        let requested = vec!["1.12.2".to_string(), "1.7.10".to_string(), "1.12.2".to_string()];

        let refresh = list.refresh(&requested);
        assert_eq!(refresh.name(), "Refresh forge versions");
        let report = TaskGraphExecutor::default().run(refresh).await;

        assert!(report.is_success());
        assert_eq!(list.versions("1.12.2")[0].self_version, "a");
        assert_eq!(list.versions("1.7.10")[0].self_version, "c");
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_list_unloaded() {
        let list = list(true, MockHttpClient::new());
        let report = TaskGraphExecutor::default()
            .run(list.refresh(&["1.12.2".to_string()]))
            .await;

        assert!(!report.is_success());
        assert_eq!(report.root_cause().unwrap().task(), "Fetch forge versions for 1.12.2");
        assert!(!list.is_loaded());
    }

    #[tokio::test]
    async fn test_per_game_source_requires_a_game_version() {
        let list = list(true, MockHttpClient::new());
        let err = TaskGraphExecutor::default()
            .run(list.refresh(&[]))
            .await
            .into_result()
            .unwrap_err();
        assert!(err.to_string().contains("listed per game version"));
    }
}
