//! Dependency resolution pass.
//!
//! Before anything runs, the executor walks the root's dependency tree depth
//! first and records each node's dependency list. Only this pass calls
//! `Task::dependencies`, and the run works from the recorded snapshot.
//!
//! Nodes on the current walk path are "visiting"; meeting one again means
//! the graph has a cycle, and resolution fails before any body executes.
//! Terminal nodes are leaves: their dependencies are not walked again.
//!
//! Sequence steps run later as roots of their own, so their edges are not
//! recorded here. They are still walked for cycles: a step that leads back
//! to one of its ancestors would otherwise wait on that ancestor forever.

use std::collections::HashMap;

use super::failure::TaskFailure;
use super::handle::{TaskHandle, TaskId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    /// Walked for cycles only, edges not recorded.
    Checked,
    Done,
}

/// Dependency lists captured for one pipeline run.
#[derive(Default)]
pub(crate) struct ResolvedGraph {
    edges: HashMap<TaskId, Vec<TaskHandle>>,
}

impl ResolvedGraph {
    /// Returns the dependencies recorded for `id`.
    ///
    /// Terminal nodes and nodes outside the graph have none.
    pub(crate) fn dependencies_of(&self, id: TaskId) -> &[TaskHandle] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the number of non-terminal nodes reached.
    pub(crate) fn len(&self) -> usize {
        self.edges.len()
    }
}

/// Resolves the dependency tree below `root`.
pub(crate) fn resolve(root: &TaskHandle) -> Result<ResolvedGraph, TaskFailure> {
    let mut graph = ResolvedGraph::default();
    let mut marks = HashMap::new();
    let mut path = Vec::new();
    visit(root, true, &mut marks, &mut path, &mut graph)?;
    Ok(graph)
}

fn visit(
    node: &TaskHandle,
    record: bool,
    marks: &mut HashMap<TaskId, Mark>,
    path: &mut Vec<TaskHandle>,
    graph: &mut ResolvedGraph,
) -> Result<(), TaskFailure> {
    match marks.get(&node.id()) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Checked) if !record => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|h| h.id() == node.id()).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|h| h.name().to_string()).collect();
            cycle.push(node.name().to_string());
            return Err(TaskFailure::CyclicDependency { cycle });
        }
        Some(Mark::Checked) | None => {}
    }

    if node.is_terminal() {
        marks.insert(node.id(), Mark::Done);
        return Ok(());
    }

    marks.insert(node.id(), Mark::Visiting);
    path.push(node.clone());

    let dependencies = node.dependencies();
    for dependency in &dependencies {
        visit(dependency, record, marks, path, graph)?;
    }
    for step in node.steps() {
        visit(step, false, marks, path, graph)?;
    }

    path.pop();
    if record {
        marks.insert(node.id(), Mark::Done);
        graph.edges.insert(node.id(), dependencies);
    } else {
        marks.insert(node.id(), Mark::Checked);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{BoxFuture, Task, TaskContext, TaskError};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Task whose dependencies can be wired after construction.
    struct Wired {
        name: String,
        deps: Arc<Mutex<Vec<TaskHandle>>>,
        calls: Arc<AtomicUsize>,
    }

    impl Task for Wired {
        fn name(&self) -> &str {
            &self.name
        }

        fn dependencies(&self) -> Vec<TaskHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.deps.lock().clone()
        }

        fn execute<'a>(&'a self, _ctx: &'a TaskContext) -> BoxFuture<'a, Result<(), TaskError>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn wired(name: &str) -> (TaskHandle, Arc<Mutex<Vec<TaskHandle>>>, Arc<AtomicUsize>) {
        let deps = Arc::new(Mutex::new(Vec::new()));
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = TaskHandle::new(Wired {
            name: name.to_string(),
            deps: Arc::clone(&deps),
            calls: Arc::clone(&calls),
        });
        (handle, deps, calls)
    }

    #[test]
    fn test_two_node_cycle() {
        let (a, a_deps, _) = wired("A");
        let (b, b_deps, _) = wired("B");
        a_deps.lock().push(b.clone());
        b_deps.lock().push(a.clone());

        let err = resolve(&a).err().unwrap();
        match err {
            TaskFailure::CyclicDependency { cycle } => assert_eq!(cycle, vec!["A", "B", "A"]),
            other => panic!("expected cycle, got {:?}", other),
        }

        // Break the Arc cycle so the test does not leak.
        a_deps.lock().clear();
    }

    #[test]
    fn test_self_cycle() {
        let (a, a_deps, _) = wired("A");
        a_deps.lock().push(a.clone());

        let err = resolve(&a).err().unwrap();
        assert_eq!(err.to_string(), "cyclic dependency: A -> A");
        a_deps.lock().clear();
    }

    #[test]
    fn test_cycle_below_root_names_only_cycle_members() {
        let (root, root_deps, _) = wired("root");
        let (x, x_deps, _) = wired("X");
        let (y, y_deps, _) = wired("Y");
        root_deps.lock().push(x.clone());
        x_deps.lock().push(y.clone());
        y_deps.lock().push(x.clone());

        match resolve(&root) {
            Err(TaskFailure::CyclicDependency { cycle }) => assert_eq!(cycle, vec!["X", "Y", "X"]),
            _ => panic!("expected cycle"),
        }
        x_deps.lock().clear();
    }

    #[test]
    fn test_cycle_through_sequence_step() {
        let (root, root_deps, _) = wired("root");
        let (x, _, _) = wired("x");
        let (y, y_deps, _) = wired("y");
        let chain = x.after(y.clone());
        root_deps.lock().push(chain);
        y_deps.lock().push(root.clone());

        match resolve(&root) {
            Err(TaskFailure::CyclicDependency { cycle }) => {
                assert_eq!(cycle, vec!["root", "x -> y", "y", "root"])
            }
            other => panic!("expected cycle, got {:?}", other.err()),
        }
        y_deps.lock().clear();
    }

    #[test]
    fn test_sequence_steps_are_not_recorded_as_edges() {
        let (root, root_deps, _) = wired("root");
        let (x, _, _) = wired("x");
        let (y, _, _) = wired("y");
        let (shared, _, _) = wired("shared");
        let (z, z_deps, _) = wired("z");
        z_deps.lock().push(shared.clone());
        let chain = x.clone().after(z.clone());
        root_deps.lock().extend([chain.clone(), y.clone(), z.clone()]);

        let graph = resolve(&root).unwrap();
        assert!(graph.dependencies_of(chain.id()).is_empty());
        assert!(graph.dependencies_of(x.id()).is_empty());
        // Reached through a step first, then as a real dependency.
        assert_eq!(graph.dependencies_of(z.id()).len(), 1);
        assert_eq!(graph.len(), 5);
    }

    #[test]
    fn test_diamond_resolves_shared_node_once() {
        let (root, root_deps, _) = wired("root");
        let (left, left_deps, _) = wired("left");
        let (right, right_deps, _) = wired("right");
        let (shared, _, shared_calls) = wired("shared");
        root_deps.lock().extend([left.clone(), right.clone()]);
        left_deps.lock().push(shared.clone());
        right_deps.lock().push(shared.clone());

        let graph = resolve(&root).unwrap();
        assert_eq!(graph.len(), 4);
        assert_eq!(shared_calls.load(Ordering::SeqCst), 1);
        assert_eq!(graph.dependencies_of(root.id()).len(), 2);
        assert!(graph.dependencies_of(shared.id()).is_empty());
    }

    #[test]
    fn test_terminal_nodes_are_not_descended() {
        let (root, root_deps, _) = wired("root");
        let (done, _, done_calls) = wired("done");
        root_deps.lock().push(done.clone());
        done.mark_terminal(&Ok(()));

        let graph = resolve(&root).unwrap();
        assert_eq!(done_calls.load(Ordering::SeqCst), 0);
        assert_eq!(graph.len(), 1);
    }
}
