//! Dependency analysis and topological ordering.
//!
//! A single forward scan over passes in registration order tracks, per
//! resource, the last writer and the readers since that write:
//!
//! - **Read**: edge from the last writer (RAW). A transient resource with no
//!   writer yet is an error; an imported resource already holds data.
//! - **Write**: edges from the last writer (WAW) and from every pending
//!   reader (WAR); the readers are cleared and the pass becomes the writer.
//!
//! Explicit edges added with `RenderGraph::add_dependency` are merged in,
//! then Kahn's algorithm orders the passes. The ready queue is FIFO and
//! seeded in registration order, so identical graphs always yield identical
//! orders.

use std::collections::VecDeque;

use crate::error::{Facility, GraphicsError, GraphicsResult};

use super::pass::{PassHandle, PassNode};
use super::resource::{AccessMode, ResourceLifetime, ResourceTable};

#[derive(Debug, Default, Clone)]
struct AccessTracker {
    last_writer: Option<usize>,
    readers: Vec<usize>,
}

fn push_unique(list: &mut Vec<usize>, value: usize) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Compute the dependency list of every pass.
pub(crate) fn build_dependencies(
    passes: &[PassNode],
    resources: &ResourceTable,
    explicit: &[(PassHandle, PassHandle)],
) -> GraphicsResult<Vec<Vec<usize>>> {
    let mut trackers = vec![AccessTracker::default(); resources.len()];
    let mut dependencies = vec![Vec::new(); passes.len()];

    for (pass_index, node) in passes.iter().enumerate() {
        let deps = &mut dependencies[pass_index];
        for access in &node.accesses {
            let tracker = &mut trackers[access.handle.index() as usize];
            match access.mode {
                AccessMode::Read => {
                    match tracker.last_writer {
                        Some(writer) if writer != pass_index => push_unique(deps, writer),
                        Some(_) => {}
                        None => {
                            let entry = resources.entry(access.handle.index());
                            if entry.lifetime() == ResourceLifetime::Transient {
                                return Err(GraphicsError::invalid_state(
                                    Facility::Graph,
                                    format!(
                                        "read before write: pass '{}' reads transient '{}' \
                                         which no earlier pass writes",
                                        node.pass.name(),
                                        entry.name()
                                    ),
                                ));
                            }
                        }
                    }
                    push_unique(&mut tracker.readers, pass_index);
                }
                AccessMode::Write => {
                    if let Some(writer) = tracker.last_writer
                        && writer != pass_index
                    {
                        push_unique(deps, writer);
                    }
                    for &reader in &tracker.readers {
                        if reader != pass_index {
                            push_unique(deps, reader);
                        }
                    }
                    tracker.readers.clear();
                    tracker.last_writer = Some(pass_index);
                }
            }
        }
    }

    for &(dependent, dependency) in explicit {
        push_unique(&mut dependencies[dependent.index()], dependency.index());
    }

    Ok(dependencies)
}

/// Order passes so every pass follows its dependencies.
///
/// Returns `InvalidState("dependency cycle")` if the graph is not acyclic.
pub(crate) fn topological_sort(dependencies: &[Vec<usize>]) -> GraphicsResult<Vec<usize>> {
    let count = dependencies.len();
    let mut in_degree = vec![0usize; count];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];

    for (pass, deps) in dependencies.iter().enumerate() {
        in_degree[pass] = deps.len();
        for &dep in deps {
            dependents[dep].push(pass);
        }
    }

    let mut ready: VecDeque<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(pass) = ready.pop_front() {
        order.push(pass);
        for &dependent in &dependents[pass] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() < count {
        let stuck: Vec<usize> = (0..count).filter(|&i| in_degree[i] > 0).collect();
        return Err(GraphicsError::invalid_state(
            Facility::Graph,
            format!("dependency cycle among passes {stuck:?}"),
        ));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_linear_chain() {
        let deps = vec![vec![], vec![0], vec![1]];
        assert_eq!(topological_sort(&deps).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_sort_ties_follow_registration_order() {
        // 3 depends on 0, 1 and 2 are independent
        let deps = vec![vec![], vec![], vec![], vec![0]];
        assert_eq!(topological_sort(&deps).unwrap(), vec![0, 1, 2, 3]);

        // 0 depends on 2; 1 is free and registered before 2
        let deps = vec![vec![2], vec![], vec![]];
        assert_eq!(topological_sort(&deps).unwrap(), vec![1, 2, 0]);
    }

    #[test]
    fn test_sort_diamond() {
        let deps = vec![vec![], vec![0], vec![0], vec![1, 2]];
        assert_eq!(topological_sort(&deps).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sort_detects_cycle() {
        let deps = vec![vec![2], vec![0], vec![1]];
        let err = topological_sort(&deps).unwrap_err();
        assert!(err.is_invalid_state());
        assert!(err.message().contains("dependency cycle"));
    }

    #[test]
    fn test_sort_is_deterministic() {
        let deps = vec![vec![], vec![], vec![0, 1], vec![1], vec![2, 3], vec![]];
        let first = topological_sort(&deps).unwrap();
        for _ in 0..16 {
            assert_eq!(topological_sort(&deps).unwrap(), first);
        }
    }

    #[test]
    fn test_push_unique() {
        let mut list = vec![1];
        push_unique(&mut list, 1);
        push_unique(&mut list, 2);
        assert_eq!(list, vec![1, 2]);
    }
}
