//! Vulkan translation of tracked states and transition barriers using ash
//!
//! Tracked states follow the D3D12 model. Vulkan splits the same information
//! into an image layout, an access mask and a pipeline stage mask; the
//! functions here derive all three from a [`ResourceState`] and turn
//! [`TransitionBarrier`]s into synchronization2 barrier structures.

use ash::vk;

use crate::state::{Subresource, TransitionBarrier};
use crate::types::{ResourceState, TextureDescriptor, TextureFormat};

/// Convert a texture format.
pub fn convert_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8Unorm => vk::Format::R8_UNORM,
        TextureFormat::R32Float => vk::Format::R32_SFLOAT,
        TextureFormat::R32Uint => vk::Format::R32_UINT,
        TextureFormat::Rg16Float => vk::Format::R16G16_SFLOAT,
        TextureFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::Rgba8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        TextureFormat::Rg11B10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
        TextureFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::Depth32Float => vk::Format::D32_SFLOAT,
        TextureFormat::Depth24PlusStencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth32FloatStencil8 => vk::Format::D32_SFLOAT_S8_UINT,
    }
}

/// Image layout a texture must be in for `state`.
///
/// Combined read states without a dedicated layout fall back to `GENERAL`.
pub fn image_layout(state: ResourceState) -> vk::ImageLayout {
    const SHADER_READ: ResourceState = ResourceState::ALL_SHADER_RESOURCE;

    if state.is_common() {
        return vk::ImageLayout::GENERAL;
    }
    if state == ResourceState::RENDER_TARGET {
        return vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
    }
    if state == ResourceState::DEPTH_WRITE {
        return vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
    }
    if state == ResourceState::COPY_SOURCE || state == ResourceState::RESOLVE_SOURCE {
        return vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
    }
    if state == ResourceState::COPY_DEST || state == ResourceState::RESOLVE_DEST {
        return vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    }
    if state.contains(ResourceState::DEPTH_READ)
        && (ResourceState::DEPTH_READ | SHADER_READ).contains(state)
    {
        return vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL;
    }
    if SHADER_READ.contains(state) {
        return vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
    }
    vk::ImageLayout::GENERAL
}

/// Memory accesses performed in `state`.
pub fn access_flags(state: ResourceState) -> vk::AccessFlags2 {
    const MAPPING: &[(ResourceState, vk::AccessFlags2)] = &[
        (
            ResourceState::VERTEX_AND_CONSTANT_BUFFER,
            vk::AccessFlags2::from_raw(
                vk::AccessFlags2::VERTEX_ATTRIBUTE_READ.as_raw()
                    | vk::AccessFlags2::UNIFORM_READ.as_raw(),
            ),
        ),
        (ResourceState::INDEX_BUFFER, vk::AccessFlags2::INDEX_READ),
        (
            ResourceState::RENDER_TARGET,
            vk::AccessFlags2::from_raw(
                vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
                    | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
            ),
        ),
        (
            ResourceState::UNORDERED_ACCESS,
            vk::AccessFlags2::from_raw(
                vk::AccessFlags2::SHADER_READ.as_raw() | vk::AccessFlags2::SHADER_WRITE.as_raw(),
            ),
        ),
        (
            ResourceState::DEPTH_WRITE,
            vk::AccessFlags2::from_raw(
                vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
            ),
        ),
        (ResourceState::DEPTH_READ, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ),
        (ResourceState::NON_PIXEL_SHADER_RESOURCE, vk::AccessFlags2::SHADER_READ),
        (ResourceState::PIXEL_SHADER_RESOURCE, vk::AccessFlags2::SHADER_READ),
        (ResourceState::INDIRECT_ARGUMENT, vk::AccessFlags2::INDIRECT_COMMAND_READ),
        (ResourceState::COPY_DEST, vk::AccessFlags2::TRANSFER_WRITE),
        (ResourceState::COPY_SOURCE, vk::AccessFlags2::TRANSFER_READ),
        (ResourceState::RESOLVE_DEST, vk::AccessFlags2::TRANSFER_WRITE),
        (ResourceState::RESOLVE_SOURCE, vk::AccessFlags2::TRANSFER_READ),
    ];

    if state.is_common() {
        return vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE;
    }
    MAPPING
        .iter()
        .filter(|(bit, _)| state.contains(*bit))
        .fold(vk::AccessFlags2::NONE, |flags, (_, access)| flags | *access)
}

/// Pipeline stages that access a resource in `state`.
pub fn stage_flags(state: ResourceState) -> vk::PipelineStageFlags2 {
    if state.is_common() {
        return vk::PipelineStageFlags2::ALL_COMMANDS;
    }

    let mut stages = vk::PipelineStageFlags2::NONE;
    if state.contains(ResourceState::VERTEX_AND_CONSTANT_BUFFER) {
        stages |= vk::PipelineStageFlags2::VERTEX_INPUT
            | vk::PipelineStageFlags2::VERTEX_SHADER
            | vk::PipelineStageFlags2::FRAGMENT_SHADER
            | vk::PipelineStageFlags2::COMPUTE_SHADER;
    }
    if state.contains(ResourceState::INDEX_BUFFER) {
        stages |= vk::PipelineStageFlags2::INDEX_INPUT;
    }
    if state.contains(ResourceState::RENDER_TARGET) {
        stages |= vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
    }
    if state.contains(ResourceState::UNORDERED_ACCESS) {
        stages |=
            vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER;
    }
    if state.intersects(ResourceState::DEPTH_WRITE | ResourceState::DEPTH_READ) {
        stages |= vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
    }
    if state.contains(ResourceState::NON_PIXEL_SHADER_RESOURCE) {
        stages |= vk::PipelineStageFlags2::PRE_RASTERIZATION_SHADERS
            | vk::PipelineStageFlags2::COMPUTE_SHADER;
    }
    if state.contains(ResourceState::PIXEL_SHADER_RESOURCE) {
        stages |= vk::PipelineStageFlags2::FRAGMENT_SHADER;
    }
    if state.contains(ResourceState::INDIRECT_ARGUMENT) {
        stages |= vk::PipelineStageFlags2::DRAW_INDIRECT;
    }
    if state.intersects(ResourceState::COPY_DEST | ResourceState::COPY_SOURCE) {
        stages |= vk::PipelineStageFlags2::COPY;
    }
    if state.intersects(ResourceState::RESOLVE_DEST | ResourceState::RESOLVE_SOURCE) {
        stages |= vk::PipelineStageFlags2::RESOLVE;
    }
    stages
}

fn format_aspects(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth_stencil() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Subresource range covered by `subresource` of a texture.
///
/// Flat indices decompose as mip, then array layer, then plane; plane 1 of a
/// depth-stencil format is its stencil aspect.
pub fn subresource_range(
    descriptor: &TextureDescriptor,
    subresource: Subresource,
) -> vk::ImageSubresourceRange {
    match subresource {
        Subresource::All => vk::ImageSubresourceRange {
            aspect_mask: format_aspects(descriptor.format),
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        },
        Subresource::Index(index) => {
            let mips = descriptor.mip_level_count.max(1);
            let layers = descriptor.array_layer_count();
            let mip = index % mips;
            let layer = (index / mips) % layers;
            let plane = index / (mips * layers);
            let aspect_mask = match (descriptor.format.is_depth_stencil(), plane) {
                (false, _) => vk::ImageAspectFlags::COLOR,
                (true, 0) => vk::ImageAspectFlags::DEPTH,
                (true, _) => vk::ImageAspectFlags::STENCIL,
            };
            vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: mip,
                level_count: 1,
                base_array_layer: layer,
                layer_count: 1,
            }
        }
    }
}

/// Translate a texture transition.
pub fn image_barrier(
    barrier: &TransitionBarrier,
    image: vk::Image,
    descriptor: &TextureDescriptor,
) -> vk::ImageMemoryBarrier2<'static> {
    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(stage_flags(barrier.before))
        .src_access_mask(access_flags(barrier.before))
        .dst_stage_mask(stage_flags(barrier.after))
        .dst_access_mask(access_flags(barrier.after))
        .old_layout(image_layout(barrier.before))
        .new_layout(image_layout(barrier.after))
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(descriptor, barrier.subresource))
}

/// Translate a buffer transition; buffers have no layout or subresources.
pub fn buffer_barrier(
    barrier: &TransitionBarrier,
    buffer: vk::Buffer,
) -> vk::BufferMemoryBarrier2<'static> {
    vk::BufferMemoryBarrier2::default()
        .src_stage_mask(stage_flags(barrier.before))
        .src_access_mask(access_flags(barrier.before))
        .dst_stage_mask(stage_flags(barrier.after))
        .dst_access_mask(access_flags(barrier.after))
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
}
