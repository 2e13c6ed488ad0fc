//! Render pass definitions for the render graph

use std::collections::HashMap;
use std::fmt;

use super::{RenderGraph, RenderGraphRegistry, ResourceHandle, ResourceType};
use crate::context::CommandContext;
use crate::error::Result;

/// Deferred pass body, invoked once per graph execution.
pub type PassCallback =
    Box<dyn FnMut(&RenderGraphRegistry, &mut CommandContext) -> Result<()> + Send>;

/// Handle to a pass in the render graph.
///
/// Only valid within the frame of the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassHandle(pub(crate) u32);

impl PassHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a pass accesses a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

/// A named unit of GPU work with declared reads and writes.
pub struct RenderPass {
    name: String,
    index: usize,
    reads: Vec<ResourceHandle>,
    writes: Vec<ResourceHandle>,
    /// `true` when every declaration of the handle skipped automatic barriers.
    untracked: HashMap<ResourceHandle, bool>,
    callback: Option<PassCallback>,
}

impl RenderPass {
    pub(crate) fn new(name: String, index: usize) -> Self {
        Self {
            name,
            index,
            reads: Vec::new(),
            writes: Vec::new(),
            untracked: HashMap::new(),
            callback: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaration order within the frame.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reads(&self) -> &[ResourceHandle] {
        &self.reads
    }

    pub fn writes(&self) -> &[ResourceHandle] {
        &self.writes
    }

    /// Every handle the pass reads or writes, each once.
    pub fn accesses(&self) -> impl Iterator<Item = ResourceHandle> + '_ {
        self.reads.iter().copied().chain(
            self.writes
                .iter()
                .copied()
                .filter(move |handle| !self.reads.contains(handle)),
        )
    }

    /// Whether the graph skips automatic transitions of `handle` for this pass.
    pub fn is_untracked(&self, handle: ResourceHandle) -> bool {
        self.untracked.get(&handle).copied().unwrap_or(false)
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Record an access; returns `false` if it was already declared.
    pub(crate) fn declare(
        &mut self,
        handle: ResourceHandle,
        access: Access,
        untracked: bool,
    ) -> bool {
        self.untracked
            .entry(handle)
            .and_modify(|all_untracked| *all_untracked &= untracked)
            .or_insert(untracked);

        let set = match access {
            Access::Read => &mut self.reads,
            Access::Write => &mut self.writes,
        };
        if set.contains(&handle) {
            return false;
        }
        set.push(handle);
        true
    }

    pub(crate) fn set_callback(&mut self, callback: PassCallback) {
        self.callback = Some(callback);
    }

    pub(crate) fn run(
        &mut self,
        registry: &RenderGraphRegistry,
        ctx: &mut CommandContext,
    ) -> Result<()> {
        match self.callback.as_mut() {
            Some(callback) => callback(registry, ctx),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPass")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Declares the accesses of a pass being added to a [`RenderGraph`].
///
/// # Example
///
/// ```ignore
/// let shadow = graph.create::<Texture>(shadow_desc);
/// graph
///     .add_pass("lighting")
///     .read(shadow)
///     .write(hdr)
///     .execute(move |registry, ctx| {
///         let hdr = registry.get::<Texture>(hdr);
///         ctx.draw(3, 1);
///         Ok(())
///     });
/// ```
pub struct PassBuilder<'a> {
    graph: &'a mut RenderGraph,
    pass: PassHandle,
}

impl<'a> PassBuilder<'a> {
    pub(crate) fn new(graph: &'a mut RenderGraph, pass: PassHandle) -> Self {
        Self { graph, pass }
    }

    /// The pass being declared.
    pub fn handle(&self) -> PassHandle {
        self.pass
    }

    /// Declare a read; the graph transitions the resource to a
    /// shader-readable state before the pass's level.
    pub fn read(self, handle: ResourceHandle) -> Self {
        self.declare(handle, Access::Read, false)
    }

    /// Declare a write; the graph transitions the resource to a writable
    /// state before the pass's level.
    pub fn write(self, handle: ResourceHandle) -> Self {
        self.declare(handle, Access::Write, false)
    }

    /// Declare a read that orders the pass but leaves transitions to the
    /// callback.
    pub fn read_untracked(self, handle: ResourceHandle) -> Self {
        self.declare(handle, Access::Read, true)
    }

    /// Declare a write that orders the pass but leaves transitions to the
    /// callback.
    pub fn write_untracked(self, handle: ResourceHandle) -> Self {
        self.declare(handle, Access::Write, true)
    }

    /// Set the pass body and finish the declaration.
    pub fn execute<F>(self, callback: F) -> PassHandle
    where
        F: FnMut(&RenderGraphRegistry, &mut CommandContext) -> Result<()> + Send + 'static,
    {
        self.graph.pass_mut(self.pass).set_callback(Box::new(callback));
        self.pass
    }

    fn declare(self, handle: ResourceHandle, access: Access, untracked: bool) -> Self {
        assert!(handle.is_valid(), "pass declared an access to an invalid handle");
        assert!(
            matches!(handle.ty(), ResourceType::Buffer | ResourceType::Texture),
            "{:?} cannot be read or written by a pass; only buffers and textures are tracked",
            handle
        );
        self.graph.declare_access(self.pass, handle, access, untracked);
        self
    }
}
