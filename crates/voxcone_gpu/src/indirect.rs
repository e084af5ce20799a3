//! Indirect draw and dispatch calls.

use crate::{
    buffer::{GPUBuffer, GPUBufferType},
    device::GraphicsDevice,
};
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;

/// Argument buffer layout for `draw_indexed_indirect` commands.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct DrawIndexedIndirectArgs {
    /// The number of indices to draw.
    pub index_count: u32,
    /// The number of instances to draw.
    pub instance_count: u32,
    /// The first index within the index buffer.
    pub first_index: u32,
    /// The value added to the vertex index before indexing into the vertex
    /// buffer.
    pub base_vertex: i32,
    /// The instance ID of the first instance to draw.
    ///
    /// Has to be 0, unless
    /// [`Features::INDIRECT_FIRST_INSTANCE`](wgpu::Features::INDIRECT_FIRST_INSTANCE)
    /// is enabled.
    pub first_instance: u32,
}

/// Argument buffer layout for `dispatch_workgroups_indirect` commands.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
pub struct DispatchIndirectArgs {
    /// The number of workgroups to dispatch in the X dimension.
    pub x: u32,
    /// The number of workgroups to dispatch in the Y dimension.
    pub y: u32,
    /// The number of workgroups to dispatch in the Z dimension.
    pub z: u32,
}

impl DrawIndexedIndirectArgs {
    /// Byte offset of the `instance_count` field.
    pub const INSTANCE_COUNT_OFFSET: u64 = 4;
}

impl DispatchIndirectArgs {
    /// Arguments for dispatching no workgroups along X and one along each of
    /// the other dimensions, so that incrementing `x` adds one workgroup.
    pub const EMPTY_ROW: Self = Self { x: 0, y: 1, z: 1 };
}

impl GPUBuffer {
    /// Creates a new GPU buffer for draw call arguments for use with
    /// [`wgpu::RenderPass::draw_indexed_indirect`]. The buffer can also be
    /// bound as a storage buffer so that the arguments can be written by
    /// compute shaders.
    pub fn new_draw_indexed_indirect_buffer(
        graphics_device: &GraphicsDevice,
        indirect_draw_args: &[DrawIndexedIndirectArgs],
        label: Cow<'static, str>,
    ) -> Self {
        let bytes = bytemuck::cast_slice(indirect_draw_args);
        Self::new(
            graphics_device,
            bytes,
            GPUBufferType::Indirect.usage(),
            label,
        )
    }

    /// Creates a new GPU buffer for dispatch arguments for use with
    /// [`wgpu::ComputePass::dispatch_workgroups_indirect`]. The buffer can also
    /// be bound as a storage buffer so that the arguments can be written by
    /// compute shaders.
    pub fn new_dispatch_indirect_buffer(
        graphics_device: &GraphicsDevice,
        indirect_dispatch_args: &[DispatchIndirectArgs],
        label: Cow<'static, str>,
    ) -> Self {
        let bytes = bytemuck::cast_slice(indirect_dispatch_args);
        Self::new(
            graphics_device,
            bytes,
            GPUBufferType::Indirect.usage(),
            label,
        )
    }
}
