//! Command recording context.

use crate::backend::{Command, CommandList};
use crate::descriptor::{CpuDescriptorHandle, DynamicDescriptorRange, DynamicSuballocator};
use crate::error::Result;
use crate::resources::{Buffer, Texture};
use crate::state::{ResourceStateTracker, Subresource, TrackingInfo};
use crate::types::{QueueType, ResourceState};

/// Records commands for one queue.
///
/// A context owns a [`ResourceStateTracker`], so state transitions requested
/// while recording resolve locally where possible and are reconciled with the
/// global state table when the context is submitted through
/// [`RenderDevice::submit`](crate::RenderDevice::submit). It also owns the
/// per-context dynamic descriptor suballocators, whose chunks are released on
/// submission.
///
/// Contexts record serially but several may record concurrently on different
/// threads.
///
/// # Example
///
/// ```ignore
/// let mut ctx = device.create_context(QueueType::Graphics);
/// ctx.transition_texture(&target, ResourceState::RENDER_TARGET);
/// ctx.clear_render_target(target.view_handle(rtv), [0.0, 0.0, 0.0, 1.0]);
/// device.submit(QueueType::Graphics, &mut [ctx])?;
/// ```
#[derive(Debug)]
pub struct CommandContext {
    queue: QueueType,
    commands: Vec<Command>,
    tracker: ResourceStateTracker,
    dynamic_views: DynamicSuballocator,
    dynamic_samplers: DynamicSuballocator,
    event_depth: u32,
}

impl CommandContext {
    pub(crate) fn new(
        queue: QueueType,
        dynamic_views: DynamicSuballocator,
        dynamic_samplers: DynamicSuballocator,
    ) -> Self {
        Self {
            queue,
            commands: Vec::new(),
            tracker: ResourceStateTracker::new(),
            dynamic_views,
            dynamic_samplers,
            event_depth: 0,
        }
    }

    /// Queue this context records for.
    pub fn queue_type(&self) -> QueueType {
        self.queue
    }

    // ------------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------------

    /// Request a state for every subresource of a texture.
    pub fn transition_texture(&mut self, texture: &Texture, state: ResourceState) {
        self.transition(&texture.tracking_info(), Subresource::All, state);
    }

    /// Request a state for one subresource of a texture.
    pub fn transition_texture_subresource(
        &mut self,
        texture: &Texture,
        subresource: u32,
        state: ResourceState,
    ) {
        self.transition(
            &texture.tracking_info(),
            Subresource::Index(subresource),
            state,
        );
    }

    /// Request a state for a buffer.
    pub fn transition_buffer(&mut self, buffer: &Buffer, state: ResourceState) {
        self.transition(&buffer.tracking_info(), Subresource::All, state);
    }

    /// Request a state for any tracked (sub)resource.
    ///
    /// Barriers are batched until the next command is recorded or
    /// [`flush_barriers`](Self::flush_barriers) is called.
    pub fn transition(
        &mut self,
        info: &TrackingInfo,
        subresource: Subresource,
        state: ResourceState,
    ) {
        if self.queue == QueueType::Copy {
            assert!(
                (ResourceState::COPY_SOURCE | ResourceState::COPY_DEST).contains(state),
                "{:?} is not reachable on a copy queue",
                state
            );
        }
        self.tracker.transition(info, subresource, state);
    }

    /// Record the batched barriers as one command.
    pub fn flush_barriers(&mut self) {
        let barriers = self.tracker.take_barriers();
        if !barriers.is_empty() {
            log::trace!("Flushing {} barriers on {:?} context", barriers.len(), self.queue);
            self.commands.push(Command::Barriers(barriers));
        }
    }

    /// The context's state tracker.
    pub fn tracker(&self) -> &ResourceStateTracker {
        &self.tracker
    }

    // ------------------------------------------------------------------------
    // Debug markers
    // ------------------------------------------------------------------------

    /// Open a named debug region.
    pub fn begin_event(&mut self, name: &str) {
        self.event_depth += 1;
        self.commands.push(Command::BeginEvent(name.to_owned()));
    }

    /// Close the innermost debug region.
    pub fn end_event(&mut self) {
        assert!(self.event_depth > 0, "end_event without matching begin_event");
        self.event_depth -= 1;
        self.commands.push(Command::EndEvent);
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Bind the shader-visible heaps dynamic descriptors come from.
    pub fn bind_descriptor_heaps(&mut self) {
        let heaps = vec![
            self.dynamic_views.heap().raw(),
            self.dynamic_samplers.heap().raw(),
        ];
        self.commands.push(Command::SetDescriptorHeaps(heaps));
    }

    /// Clear a render target view.
    pub fn clear_render_target(&mut self, view: CpuDescriptorHandle, color: [f32; 4]) {
        self.assert_queue(QueueType::Graphics, "clear_render_target");
        self.flush_barriers();
        self.commands.push(Command::ClearRenderTarget { view, color });
    }

    /// Clear a depth-stencil view.
    pub fn clear_depth_stencil(&mut self, view: CpuDescriptorHandle, depth: f32, stencil: u8) {
        self.assert_queue(QueueType::Graphics, "clear_depth_stencil");
        self.flush_barriers();
        self.commands
            .push(Command::ClearDepthStencil { view, depth, stencil });
    }

    /// Record a non-indexed draw.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        self.assert_queue(QueueType::Graphics, "draw");
        self.flush_barriers();
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
        });
    }

    /// Record a compute dispatch.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        assert!(self.queue != QueueType::Copy, "dispatch recorded on a copy queue");
        self.flush_barriers();
        self.commands.push(Command::Dispatch { x, y, z });
    }

    /// Copy a whole buffer, transitioning both sides.
    pub fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer) {
        assert!(
            dst.size() >= src.size(),
            "copy destination {:?} is smaller than source {:?}",
            dst.label(),
            src.label()
        );
        self.transition_buffer(src, ResourceState::COPY_SOURCE);
        self.transition_buffer(dst, ResourceState::COPY_DEST);
        self.flush_barriers();
        self.commands.push(Command::CopyResource {
            src: src.id(),
            dst: dst.id(),
        });
    }

    /// Copy a whole texture, transitioning both sides.
    pub fn copy_texture(&mut self, src: &Texture, dst: &Texture) {
        assert!(
            src.descriptor().size == dst.descriptor().size && src.format() == dst.format(),
            "copy between mismatched textures {:?} and {:?}",
            src.label(),
            dst.label()
        );
        self.transition_texture(src, ResourceState::COPY_SOURCE);
        self.transition_texture(dst, ResourceState::COPY_DEST);
        self.flush_barriers();
        self.commands.push(Command::CopyResource {
            src: src.id(),
            dst: dst.id(),
        });
    }

    // ------------------------------------------------------------------------
    // Dynamic descriptors
    // ------------------------------------------------------------------------

    /// Allocate shader-visible CBV/SRV/UAV descriptors valid until this
    /// context's work completes on the GPU.
    pub fn allocate_dynamic_descriptors(&mut self, count: u32) -> Result<DynamicDescriptorRange> {
        self.dynamic_views.allocate(count)
    }

    /// Allocate shader-visible sampler descriptors valid until this context's
    /// work completes on the GPU.
    pub fn allocate_dynamic_samplers(&mut self, count: u32) -> Result<DynamicDescriptorRange> {
        self.dynamic_samplers.allocate(count)
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Commands recorded since the last submission.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Close recording and hand the command stream over for execution.
    pub(crate) fn close(&mut self) -> CommandList {
        assert_eq!(
            self.event_depth, 0,
            "context closed with {} open debug events",
            self.event_depth
        );
        self.flush_barriers();
        CommandList::new(std::mem::take(&mut self.commands))
    }

    /// Forget local states and release dynamic descriptors once the recorded
    /// work has been handed to the queue.
    pub(crate) fn finish_submission(&mut self) {
        self.tracker.reset();
        self.dynamic_views.release_allocations();
        self.dynamic_samplers.release_allocations();
    }

    fn assert_queue(&self, expected: QueueType, command: &str) {
        assert!(
            self.queue == expected,
            "{} requires a {:?} context, got {:?}",
            command,
            expected,
            self.queue
        );
    }
}

static_assertions::assert_impl_all!(CommandContext: Send);
