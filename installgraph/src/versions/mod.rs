//! Installer version lists and the asset index scan.
//!
//! Each list is a leaf producer: refreshing it yields a [`TaskHandle`] for the
//! executor, and the parsed versions become readable once that task
//! succeeds.
//!
//! [`TaskHandle`]: crate::executor::TaskHandle

mod asset_index;
mod error;
mod forge;
mod liteloader;
mod list;
mod optifine;
mod types;

pub use asset_index::{AssetIndexRef, AssetIndexTask, ASSET_INDEX_TASK_NAME, ASSET_OBJECTS_URL};
pub use error::VersionListError;
pub use forge::ForgeSource;
pub use liteloader::{LiteLoaderSource, LITELOADER_MANIFEST};
pub use list::{RemoteVersionList, VersionList, VersionSource};
pub use optifine::OptiFineSource;
pub use types::{compare_game_versions, LoaderKind, RemoteVersion};

use crate::download::Downloader;

/// Creates the version list for `loader` with its default source.
pub fn version_list(loader: LoaderKind, downloader: Downloader) -> Box<dyn VersionList> {
    match loader {
        LoaderKind::Forge => Box::new(RemoteVersionList::new(ForgeSource::new(), downloader)),
        LoaderKind::OptiFine => Box::new(RemoteVersionList::new(OptiFineSource::new(), downloader)),
        LoaderKind::LiteLoader => Box::new(RemoteVersionList::new(LiteLoaderSource::new(), downloader)),
    }
}
