//! Render graph scheduling and execution

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::pass::{Access, PassBuilder, PassHandle, RenderPass};
use super::{GraphResource, RenderGraphRegistry, ResourceHandle, VirtualResource};
use crate::context::CommandContext;
use crate::device::RenderDevice;
use crate::error::{FrameGraphError, Result};
use crate::state::Subresource;
use crate::types::ResourceState;

/// One entry of a handle's access FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AccessRecord {
    pub(crate) pass: usize,
    pub(crate) access: Access,
}

/// A batch of passes whose transitions are recorded as one barrier batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyLevel {
    passes: Vec<usize>,
    reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
}

impl DependencyLevel {
    /// Indices of the level's passes, in declaration order.
    pub fn passes(&self) -> &[usize] {
        &self.passes
    }

    /// Handles read with automatic transitions.
    pub fn reads(&self) -> &[ResourceHandle] {
        &self.reads
    }

    /// Handles written with automatic transitions.
    pub fn writes(&self) -> &[ResourceHandle] {
        &self.writes
    }
}

/// Per-handle bookkeeping of the scheduling walk.
#[derive(Debug, Default)]
struct HandleQueue {
    records: VecDeque<AccessRecord>,
    /// Readers released but not scheduled yet.
    outstanding_readers: HashSet<usize>,
    /// Writer released but not scheduled yet.
    pending_writer: Option<usize>,
}

impl HandleQueue {
    /// Pop every record that may proceed, reporting the popped passes.
    fn release(&mut self, mut on_release: impl FnMut(usize)) {
        while let Some(&record) = self.records.front() {
            let proceed = match record.access {
                Access::Read => self.pending_writer.map_or(true, |writer| writer == record.pass),
                Access::Write => {
                    self.pending_writer.is_none()
                        && self
                            .outstanding_readers
                            .iter()
                            .all(|&reader| reader == record.pass)
                }
            };
            if !proceed {
                break;
            }
            self.records.pop_front();
            match record.access {
                Access::Read => {
                    self.outstanding_readers.insert(record.pass);
                }
                Access::Write => self.pending_writer = Some(record.pass),
            }
            on_release(record.pass);
        }
    }

    fn retire_pass(&mut self, pass: usize) {
        self.outstanding_readers.remove(&pass);
        if self.pending_writer == Some(pass) {
            self.pending_writer = None;
        }
    }
}

/// Scheduling failure: the handles whose queues could not drain and the
/// passes left unscheduled.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Unresolved {
    pub(crate) handles: Vec<usize>,
    pub(crate) passes: Vec<usize>,
}

/// Batch passes into dependency levels from per-handle access FIFOs.
///
/// `fifos[h]` lists the accesses to handle `h` in declaration order. A read is
/// released unless another pass's write is released but not scheduled; a
/// write is released only once every earlier reader and writer has been
/// scheduled. A pass is ready once all of its records are released. Returns
/// the pass indices of each level.
pub(crate) fn schedule(
    pass_count: usize,
    fifos: &[VecDeque<AccessRecord>],
) -> std::result::Result<Vec<Vec<usize>>, Unresolved> {
    let mut queues: Vec<HandleQueue> = fifos
        .iter()
        .map(|records| HandleQueue {
            records: records.clone(),
            ..HandleQueue::default()
        })
        .collect();

    let mut remaining = vec![0usize; pass_count];
    let mut touched: Vec<Vec<usize>> = vec![Vec::new(); pass_count];
    for (handle, records) in fifos.iter().enumerate() {
        for record in records {
            remaining[record.pass] += 1;
            if !touched[record.pass].contains(&handle) {
                touched[record.pass].push(handle);
            }
        }
    }

    let mut ready_passes: Vec<usize> = (0..pass_count)
        .filter(|&pass| remaining[pass] == 0)
        .collect();
    let mut ready_handles: VecDeque<usize> = (0..queues.len()).collect();
    let mut queued = vec![true; queues.len()];
    let mut scheduled = vec![false; pass_count];
    let mut levels = Vec::new();

    loop {
        while let Some(handle) = ready_handles.pop_front() {
            queued[handle] = false;
            queues[handle].release(|pass| {
                remaining[pass] -= 1;
                if remaining[pass] == 0 {
                    ready_passes.push(pass);
                }
            });
        }

        if ready_passes.is_empty() {
            break;
        }
        let mut level = std::mem::take(&mut ready_passes);
        level.sort_unstable();

        for &pass in &level {
            scheduled[pass] = true;
            for &handle in &touched[pass] {
                queues[handle].retire_pass(pass);
                if !queued[handle] {
                    queued[handle] = true;
                    ready_handles.push_back(handle);
                }
            }
        }
        levels.push(level);
    }

    let handles: Vec<usize> = queues
        .iter()
        .enumerate()
        .filter(|(_, queue)| !queue.records.is_empty())
        .map(|(handle, _)| handle)
        .collect();
    if handles.is_empty() {
        Ok(levels)
    } else {
        Err(Unresolved {
            handles,
            passes: (0..pass_count).filter(|&pass| !scheduled[pass]).collect(),
        })
    }
}

/// The render graph describes one frame's GPU work.
///
/// # Construction
///
/// Declare resources, then add passes that read and write them:
///
/// ```ignore
/// let mut graph = RenderGraph::new();
/// let hdr = graph.create::<Texture>(hdr_desc);
/// let backbuffer = graph.import(swapchain_texture.clone());
///
/// graph.add_pass("scene").write(hdr).execute(draw_scene);
/// graph.add_pass("tonemap").read(hdr).write(backbuffer).execute(tonemap);
/// ```
///
/// # Execution
///
/// [`execute`](Self::execute) schedules the passes into dependency levels,
/// realizes the declared resources and, level by level, records the required
/// transitions as one barrier batch followed by every pass callback of the
/// level in declaration order. [`reset`](Self::reset) starts the next frame;
/// realized resources are kept in the registry and reused while their
/// descriptors stay the same.
#[derive(Debug)]
pub struct RenderGraph {
    passes: Vec<RenderPass>,
    registry: RenderGraphRegistry,
    /// Access FIFOs, one per declared handle, in first-access order.
    fifos: Vec<VecDeque<AccessRecord>>,
    fifo_handles: Vec<ResourceHandle>,
    fifo_lookup: HashMap<ResourceHandle, usize>,
    levels: Vec<DependencyLevel>,
    scheduled: bool,
}

impl RenderGraph {
    /// Create an empty graph at epoch 1.
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            registry: RenderGraphRegistry::new(1),
            fifos: Vec::new(),
            fifo_handles: Vec::new(),
            fifo_lookup: HashMap::new(),
            levels: Vec::new(),
            scheduled: false,
        }
    }

    /// Current frame epoch.
    pub fn epoch(&self) -> u64 {
        self.registry.epoch()
    }

    /// Declare a resource realized from `descriptor` for this frame.
    pub fn create<T: VirtualResource>(&mut self, descriptor: T::Descriptor) -> ResourceHandle {
        self.registry.declare::<T>(descriptor)
    }

    /// Make an existing object available to passes.
    ///
    /// Importing the same object again returns the same handle.
    pub fn import<T: GraphResource>(&mut self, object: Arc<T>) -> ResourceHandle {
        self.registry.import(object)
    }

    /// Start declaring a pass.
    pub fn add_pass(&mut self, name: impl Into<String>) -> PassBuilder<'_> {
        let index = self.passes.len();
        self.passes.push(RenderPass::new(name.into(), index));
        self.scheduled = false;
        PassBuilder::new(self, PassHandle(index as u32))
    }

    pub(crate) fn pass_mut(&mut self, pass: PassHandle) -> &mut RenderPass {
        &mut self.passes[pass.index()]
    }

    pub(crate) fn declare_access(
        &mut self,
        pass: PassHandle,
        handle: ResourceHandle,
        access: Access,
        untracked: bool,
    ) {
        assert!(
            self.registry.contains(handle),
            "handle {:?} does not belong to the current frame (epoch {})",
            handle,
            self.registry.epoch()
        );
        if !self.passes[pass.index()].declare(handle, access, untracked) {
            return;
        }
        let fifo = match self.fifo_lookup.get(&handle) {
            Some(&fifo) => fifo,
            None => {
                self.fifos.push(VecDeque::new());
                self.fifo_handles.push(handle);
                self.fifo_lookup.insert(handle, self.fifos.len() - 1);
                self.fifos.len() - 1
            }
        };
        self.fifos[fifo].push_back(AccessRecord {
            pass: pass.index(),
            access,
        });
        self.scheduled = false;
    }

    /// Passes declared this frame, in declaration order.
    pub fn passes(&self) -> &[RenderPass] {
        &self.passes
    }

    /// The registry resolving this graph's handles.
    pub fn registry(&self) -> &RenderGraphRegistry {
        &self.registry
    }

    /// Mutable access to the registry, e.g. to [`trim`](RenderGraphRegistry::trim) it.
    pub fn registry_mut(&mut self) -> &mut RenderGraphRegistry {
        &mut self.registry
    }

    /// Dependency levels computed by the last [`setup`](Self::setup).
    pub fn levels(&self) -> &[DependencyLevel] {
        &self.levels
    }

    /// Build the dependency levels.
    ///
    /// # Errors
    ///
    /// Returns [`FrameGraphError::UnresolvedDependencies`] if some passes can
    /// never become ready.
    pub fn setup(&mut self) -> Result<()> {
        if self.scheduled {
            return Ok(());
        }

        for (fifo, handle) in self.fifos.iter().zip(&self.fifo_handles) {
            if let Some(first) = fifo.front() {
                if first.access == Access::Read && !handle.is_imported() {
                    log::warn!(
                        "Pass '{}' reads {:?} before any pass writes it",
                        self.passes[first.pass].name(),
                        handle
                    );
                }
            }
        }

        let levels = schedule(self.passes.len(), &self.fifos).map_err(|unresolved| {
            let error = FrameGraphError::UnresolvedDependencies {
                handles: unresolved
                    .handles
                    .iter()
                    .map(|&fifo| self.fifo_handles[fifo])
                    .collect(),
                passes: unresolved
                    .passes
                    .iter()
                    .map(|&pass| self.passes[pass].name().to_owned())
                    .collect(),
            };
            log::error!("{}", error);
            error
        })?;

        self.levels = levels
            .into_iter()
            .map(|passes| self.build_level(passes))
            .collect();
        self.scheduled = true;
        log::debug!(
            "Scheduled {} passes into {} dependency levels",
            self.passes.len(),
            self.levels.len()
        );
        Ok(())
    }

    fn build_level(&self, passes: Vec<usize>) -> DependencyLevel {
        let mut reads = Vec::new();
        let mut writes = Vec::new();
        for &index in &passes {
            let pass = &self.passes[index];
            for &handle in pass.reads() {
                if !pass.is_untracked(handle) && !reads.contains(&handle) {
                    reads.push(handle);
                }
            }
            for &handle in pass.writes() {
                if !pass.is_untracked(handle) && !writes.contains(&handle) {
                    writes.push(handle);
                }
            }
        }
        DependencyLevel {
            passes,
            reads,
            writes,
        }
    }

    /// Schedule, realize and record every pass into `ctx`.
    ///
    /// Before each level the resources it accesses are transitioned as one
    /// barrier batch: written resources to their write state, the others to
    /// their read state. Each callback is wrapped in a debug event named
    /// after its pass.
    pub fn execute(&mut self, device: &RenderDevice, ctx: &mut CommandContext) -> Result<()> {
        self.setup()?;
        self.registry.realize(device)?;

        let Self {
            passes,
            registry,
            levels,
            ..
        } = self;

        for (depth, level) in levels.iter().enumerate() {
            // A handle both read and written within the level takes its write state.
            let requests = level
                .writes
                .iter()
                .map(|&handle| (handle, Access::Write))
                .chain(
                    level
                        .reads
                        .iter()
                        .filter(|handle| !level.writes.contains(handle))
                        .map(|&handle| (handle, Access::Read)),
                );

            let mut transitions = 0;
            for (handle, access) in requests {
                let Some(object) = registry.object(handle) else {
                    panic!("handle {:?} has no realized object", handle);
                };
                let Some((info, read_state, write_state)) = object.access_states() else {
                    continue;
                };
                let state: ResourceState = match access {
                    Access::Read => read_state,
                    Access::Write => write_state,
                };
                ctx.transition(&info, Subresource::All, state);
                transitions += 1;
            }
            ctx.flush_barriers();
            log::trace!(
                "Level {}: {} passes, {} transitions requested",
                depth,
                level.passes.len(),
                transitions
            );

            for &index in &level.passes {
                let pass = &mut passes[index];
                ctx.begin_event(pass.name());
                let result = pass.run(registry, ctx);
                ctx.end_event();
                result?;
            }
        }
        Ok(())
    }

    /// Start a new frame.
    ///
    /// Passes and declarations are dropped and the epoch advances, so handles
    /// declared before the reset become stale. Imports stay valid.
    pub fn reset(&mut self) {
        self.passes.clear();
        self.fifos.clear();
        self.fifo_handles.clear();
        self.fifo_lookup.clear();
        self.levels.clear();
        self.scheduled = false;
        // A 64-bit epoch never wraps, so stale handles never validate again.
        self.registry.begin_epoch(self.registry.epoch() + 1);
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}
