//! Why a task ended in `Failed`.

use std::fmt;
use std::sync::Arc;

use super::task::TaskError;

/// Terminal failure reason recorded on a task.
///
/// `Display` describes the reason only; the task name is available through
/// [`task`](TaskFailure::task).
///
/// Cloning is cheap; the underlying [`TaskError`] is shared.
#[derive(Clone, Debug)]
pub enum TaskFailure {
    /// A prerequisite did not succeed and the task (or meta node) gave up
    /// because of it.
    DependencyFailure {
        /// The task that gave up.
        task: String,
        /// Names of the prerequisites that failed.
        failed: Vec<String>,
    },

    /// The task's own body returned an error.
    Execution {
        /// The failing task.
        task: String,
        /// Underlying error.
        source: Arc<TaskError>,
    },

    /// The dependency graph contains a cycle. Nothing in the pipeline ran.
    CyclicDependency {
        /// Task names along the cycle, first name repeated at the end.
        cycle: Vec<String>,
    },

    /// The pipeline was cancelled before or while the task ran.
    Cancelled {
        /// The cancelled task.
        task: String,
    },
}

impl TaskFailure {
    pub(crate) fn execution(task: impl Into<String>, error: TaskError) -> Self {
        Self::Execution {
            task: task.into(),
            source: Arc::new(error),
        }
    }

    /// Returns the name of the task this failure belongs to.
    ///
    /// For a cycle this is the first task on the cycle.
    pub fn task(&self) -> &str {
        match self {
            Self::DependencyFailure { task, .. }
            | Self::Execution { task, .. }
            | Self::Cancelled { task } => task.as_str(),
            Self::CyclicDependency { cycle } => cycle.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Returns true for [`TaskFailure::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Returns true for failures that only echo an earlier failure.
    pub fn is_dependency_failure(&self) -> bool {
        matches!(self, Self::DependencyFailure { .. })
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyFailure { failed, .. } => {
                write!(f, "dependencies failed: {}", failed.join(", "))
            }
            Self::Execution { source, .. } => write!(f, "{}", source),
            Self::CyclicDependency { cycle } => {
                write!(f, "cyclic dependency: {}", cycle.join(" -> "))
            }
            Self::Cancelled { .. } => f.write_str("cancelled"),
        }
    }
}

impl std::error::Error for TaskFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Execution { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let failure = TaskFailure::execution("Gather asset index", TaskError::new("index file was empty"));
        assert_eq!(failure.to_string(), "index file was empty");
        assert_eq!(failure.task(), "Gather asset index");

        let cycle = TaskFailure::CyclicDependency {
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(cycle.to_string(), "cyclic dependency: A -> B -> A");
        assert_eq!(cycle.task(), "A");

        let dep = TaskFailure::DependencyFailure {
            task: "install".into(),
            failed: vec!["fetch-jar".into(), "fetch-libs".into()],
        };
        assert_eq!(dep.to_string(), "dependencies failed: fetch-jar, fetch-libs");
        assert_eq!(dep.task(), "install");
        assert!(dep.is_dependency_failure());
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let failure = TaskFailure::execution("fetch-jar", TaskError::new("HTTP 404"));
        assert_eq!(failure.source().unwrap().to_string(), "HTTP 404");
        assert!(TaskFailure::Cancelled { task: "x".into() }.source().is_none());
    }
}
