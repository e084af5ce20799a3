//! Push constants.

use std::mem;

/// Creates a [`PushConstantRange`](wgpu::PushConstantRange) covering a value of
/// type `T` at the beginning of push constant memory for the given stages.
///
/// # Panics
/// If the size of `T` does not fit in a `u32`.
pub fn create_push_constant_range<T>(stages: wgpu::ShaderStages) -> wgpu::PushConstantRange {
    let size = u32::try_from(mem::size_of::<T>()).expect("Push constant size overflows `u32`");
    wgpu::PushConstantRange {
        stages,
        range: 0..size,
    }
}
