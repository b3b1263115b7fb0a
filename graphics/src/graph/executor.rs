//! Graph execution.
//!
//! Passes run in the order computed by `build()`. For every pass the
//! executor:
//!
//! 1. Picks a queue from the pass type, its opt-in and the configuration
//! 2. Leases a queue context and a command context from the backend pools
//! 3. Makes the queue wait on dependencies submitted to *other* queues
//! 4. Records transition barriers, the pass's commands and final-state
//!    barriers
//! 5. Submits and remembers the signalled value
//!
//! Both leases are returned to their pools when they go out of scope, on the
//! error paths as well.

use std::ops::{Deref, DerefMut};

use crate::backend::{BackendContext, CommandContext, QueueContext, QueueType};
use crate::config::GraphicsConfig;
use crate::error::{Facility, GraphicsError, GraphicsResult};
use crate::profiling::profile_scope_dynamic;
use crate::scheduler::SubmitPoint;

use super::barrier::{post_pass_barriers, pre_pass_barriers};
use super::pass::{PassContext, PassNode, PassType};
use super::resource::ResourceTable;
use super::{GraphState, RenderGraph};

/// Queue a pass is scheduled on.
///
/// Render passes always use the graphics queue. Compute and copy passes use
/// their dedicated queue only when they opt in and the configuration enables
/// that queue; otherwise they fall back to graphics.
pub fn select_queue(pass_type: PassType, async_queue: bool, config: &GraphicsConfig) -> QueueType {
    match pass_type {
        PassType::Render => QueueType::Graphics,
        PassType::Compute if async_queue && config.async_compute => QueueType::Compute,
        PassType::Copy if async_queue && config.async_copy => QueueType::Copy,
        PassType::Compute | PassType::Copy => QueueType::Graphics,
    }
}

/// A command context on loan from the command pool.
struct CommandLease<'a> {
    backend: &'a BackendContext,
    context: Option<Box<dyn CommandContext>>,
}

impl<'a> CommandLease<'a> {
    fn acquire(backend: &'a BackendContext, queue: QueueType) -> GraphicsResult<Self> {
        let context = backend.commands.acquire(queue)?;
        Ok(Self {
            backend,
            context: Some(context),
        })
    }
}

impl Deref for CommandLease<'_> {
    type Target = dyn CommandContext;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the context out.
        self.context.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for CommandLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for CommandLease<'_> {
    fn drop(&mut self) {
        if let Some(mut context) = self.context.take() {
            if context.is_open()
                && let Err(err) = context.close()
            {
                log::warn!("Failed to close abandoned command context: {err}");
            }
            self.backend.commands.release(context);
        }
    }
}

/// A queue context on loan from the queue pool.
struct QueueLease<'a> {
    backend: &'a BackendContext,
    context: Option<Box<dyn QueueContext>>,
}

impl<'a> QueueLease<'a> {
    fn acquire(backend: &'a BackendContext, queue: QueueType) -> GraphicsResult<Self> {
        let context = backend.queues.acquire(queue)?;
        Ok(Self {
            backend,
            context: Some(context),
        })
    }
}

impl Deref for QueueLease<'_> {
    type Target = dyn QueueContext;

    fn deref(&self) -> &Self::Target {
        self.context.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for QueueLease<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for QueueLease<'_> {
    fn drop(&mut self) {
        if let Some(context) = self.context.take() {
            self.backend.queues.release(context);
        }
    }
}

/// Cross-queue waits for one pass, keeping the highest value per source queue.
fn cross_queue_waits(
    node: &PassNode,
    queue: QueueType,
    submitted: &[Option<SubmitPoint>],
) -> [Option<SubmitPoint>; QueueType::COUNT] {
    let mut waits: [Option<SubmitPoint>; QueueType::COUNT] = Default::default();
    for &dep in &node.dependencies {
        let Some(point) = &submitted[dep] else {
            continue;
        };
        if point.queue == queue {
            continue;
        }
        let slot = &mut waits[point.queue.index()];
        if slot.as_ref().is_none_or(|w| w.value < point.value) {
            *slot = Some(point.clone());
        }
    }
    waits
}

struct ExecuteFrame<'a> {
    backend: &'a BackendContext,
    config: &'a GraphicsConfig,
    frame: u64,
    slot: usize,
}

impl ExecuteFrame<'_> {
    fn run_pass(
        &self,
        node: &PassNode,
        resources: &mut ResourceTable,
        submitted: &[Option<SubmitPoint>],
    ) -> GraphicsResult<SubmitPoint> {
        let queue = select_queue(node.pass_type, node.async_queue, self.config);
        profile_scope_dynamic!(node.pass.name());

        let mut queue_ctx = QueueLease::acquire(self.backend, queue)?;
        let mut commands = CommandLease::acquire(self.backend, queue)?;

        for point in cross_queue_waits(node, queue, submitted).iter().flatten() {
            queue_ctx.wait(point);
        }

        commands.reset()?;

        let barriers = pre_pass_barriers(&node.accesses, resources);
        if !barriers.is_empty() {
            commands.resource_barriers(&barriers);
        }

        {
            let mut ctx = PassContext {
                frame: self.frame,
                slot: self.slot,
                queue,
                commands: &mut *commands,
                resources: &*resources,
                backend: self.backend,
                config: self.config,
            };
            node.pass
                .execute(&mut ctx)
                .inspect_err(|err| log::error!("Pass '{}' failed: {err}", node.pass.name()))?;
        }

        let barriers = post_pass_barriers(&node.accesses, resources);
        if !barriers.is_empty() {
            commands.resource_barriers(&barriers);
        }

        commands.close()?;
        let value = queue_ctx.submit(&*commands)?;
        Ok(SubmitPoint::new(queue, queue_ctx.fence(), value))
    }
}

impl RenderGraph {
    /// Record and submit every pass in execution order.
    ///
    /// Requires a successful [`build`](Self::build). Stops at the first
    /// failing pass; work submitted before it stays submitted and is
    /// reflected in [`queue_tails`](Self::queue_tails).
    pub fn execute(&mut self) -> GraphicsResult<()> {
        if self.state != GraphState::OrderBuilt {
            return Err(GraphicsError::invalid_state(
                Facility::Graph,
                format!("execute requires a built graph, state is {:?}", self.state),
            ));
        }

        let Self {
            backend,
            config,
            resources,
            passes,
            order,
            frame,
            slot,
            completion,
            queue_tails,
            state,
            ..
        } = self;

        let frame_ctx = ExecuteFrame {
            backend,
            config,
            frame: *frame,
            slot: *slot,
        };

        resources.reset_tracked_states();
        let mut submitted: Vec<Option<SubmitPoint>> = vec![None; passes.len()];

        for &index in order.iter() {
            let node = &passes[index];

            #[cfg(debug_assertions)]
            let start = std::time::Instant::now();

            let point = frame_ctx.run_pass(node, resources, &submitted)?;

            #[cfg(debug_assertions)]
            log::trace!(
                "Pass '{}' recorded on {:?} in {:?}",
                node.pass.name(),
                point.queue,
                start.elapsed()
            );

            if point.queue == QueueType::Graphics {
                *completion = Some(point.clone());
            }
            queue_tails[point.queue.index()] = Some(point.clone());
            submitted[index] = Some(point);
        }

        *state = GraphState::Executed;
        Ok(())
    }
}
