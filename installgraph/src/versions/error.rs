//! Version list errors.

use thiserror::Error;

use crate::executor::TaskError;

use super::LoaderKind;

/// Errors from parsing remote version metadata.
#[derive(Debug, Error)]
pub enum VersionListError {
    /// The document is not the JSON shape the source publishes.
    #[error("malformed {loader} version list: {source}")]
    Malformed {
        loader: LoaderKind,
        #[source]
        source: serde_json::Error,
    },

    /// The source is queried per game version and none was given.
    #[error("{0} versions are listed per game version; none was requested")]
    GameVersionRequired(LoaderKind),
}

impl From<VersionListError> for TaskError {
    fn from(err: VersionListError) -> Self {
        TaskError::new(err.to_string()).with_source(err)
    }
}
