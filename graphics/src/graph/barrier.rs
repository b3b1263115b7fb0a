//! Barrier synthesis.
//!
//! Before a pass runs, each resource it touches is transitioned from its
//! tracked state to the state the pass requested. Accesses to the same
//! resource within one pass are merged first: read states are OR-ed
//! together, a write state replaces them. A write in `UNORDERED_ACCESS` to a
//! resource already in that state gets an unordered-access barrier instead,
//! so the previous pass's writes are visible.
//!
//! After the pass, accesses that asked for a distinct final state are
//! transitioned to it.

use crate::backend::GpuResourceId;
use crate::types::ResourceState;

use super::resource::{AccessMode, ResourceAccess, ResourceTable};

/// A hardware synchronization instruction recorded before or after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// State transition.
    Transition {
        resource: GpuResourceId,
        before: ResourceState,
        after: ResourceState,
    },
    /// Orders unordered-access writes to the same resource.
    UnorderedAccess { resource: GpuResourceId },
}

impl Barrier {
    /// Resource the barrier applies to.
    pub fn resource(&self) -> GpuResourceId {
        match *self {
            Self::Transition { resource, .. } | Self::UnorderedAccess { resource } => resource,
        }
    }
}

/// Returns true if moving from `current` to `required` needs a transition.
///
/// Read-to-read needs none when the current state already covers the
/// requested one.
pub(crate) fn needs_transition(current: ResourceState, required: ResourceState) -> bool {
    if current == required {
        return false;
    }
    !(current.is_read_only() && required.is_read_only() && current.contains(required))
}

struct MergedAccess {
    index: u32,
    state: ResourceState,
    write: bool,
}

fn merge_accesses(accesses: &[ResourceAccess]) -> Vec<MergedAccess> {
    let mut merged: Vec<MergedAccess> = Vec::with_capacity(accesses.len());
    for access in accesses {
        let index = access.handle.index();
        let write = access.mode == AccessMode::Write;
        match merged.iter_mut().find(|m| m.index == index) {
            None => merged.push(MergedAccess {
                index,
                state: access.state,
                write,
            }),
            Some(existing) if write => {
                existing.state = access.state;
                existing.write = true;
            }
            Some(existing) if !existing.write => existing.state |= access.state,
            Some(_) => {}
        }
    }
    merged
}

/// Barriers to record before a pass, updating tracked states.
pub(crate) fn pre_pass_barriers(
    accesses: &[ResourceAccess],
    resources: &mut ResourceTable,
) -> Vec<Barrier> {
    let mut barriers = Vec::new();
    for access in merge_accesses(accesses) {
        let entry = resources.entry_mut(access.index);
        let current = entry.current_state();
        if needs_transition(current, access.state) {
            barriers.push(Barrier::Transition {
                resource: entry.gpu(),
                before: current,
                after: access.state,
            });
            entry.set_current_state(access.state);
        } else if access.write && access.state.contains(ResourceState::UNORDERED_ACCESS) {
            barriers.push(Barrier::UnorderedAccess {
                resource: entry.gpu(),
            });
        }
    }
    barriers
}

/// Barriers to record after a pass for accesses with a final state.
pub(crate) fn post_pass_barriers(
    accesses: &[ResourceAccess],
    resources: &mut ResourceTable,
) -> Vec<Barrier> {
    let mut finals: Vec<(u32, ResourceState)> = Vec::new();
    for access in accesses {
        let Some(final_state) = access.final_state else {
            continue;
        };
        let index = access.handle.index();
        match finals.iter_mut().find(|(i, _)| *i == index) {
            Some(existing) => existing.1 = final_state,
            None => finals.push((index, final_state)),
        }
    }

    let mut barriers = Vec::new();
    for (index, final_state) in finals {
        let entry = resources.entry_mut(index);
        let current = entry.current_state();
        if current != final_state {
            barriers.push(Barrier::Transition {
                resource: entry.gpu(),
                before: current,
                after: final_state,
            });
            entry.set_current_state(final_state);
        }
    }
    barriers
}
