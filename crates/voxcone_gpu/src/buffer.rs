//! Buffers on the GPU and readback of their contents.

use crate::device::GraphicsDevice;
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::{borrow::Cow, sync::Arc};
use wgpu::util::DeviceExt;

/// A [`wgpu::Buffer`] together with its size and a label used for naming
/// derived objects.
#[derive(Debug)]
pub struct GPUBuffer {
    buffer: wgpu::Buffer,
    size: usize,
    label: Cow<'static, str>,
}

/// The role of a GPU buffer, determining its default usage flags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GPUBufferType {
    Vertex,
    Index,
    /// Also copyable to a readback buffer for inspecting what was written.
    Uniform,
    /// Read and written by shaders, and copyable in both directions so that
    /// tests can read it back.
    Storage,
    /// Written by the GPU through a copy and then mapped for reading on the
    /// CPU.
    Readback,
    /// Arguments for indirect draws or dispatches that shaders also write.
    Indirect,
}

impl GPUBuffer {
    /// Creates a buffer initialized with the given bytes. The buffer can
    /// always be written to from the queue.
    ///
    /// # Panics
    /// If `bytes` is empty.
    pub fn new(
        graphics_device: &GraphicsDevice,
        bytes: &[u8],
        usage: wgpu::BufferUsages,
        label: Cow<'static, str>,
    ) -> Self {
        assert!(!bytes.is_empty(), "Tried to create empty GPU buffer {label}");

        let buffer = graphics_device
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                contents: bytes,
                usage: usage | wgpu::BufferUsages::COPY_DST,
                label: Some(&format!("{label} buffer")),
            });

        Self {
            buffer,
            size: bytes.len(),
            label,
        }
    }

    /// Creates a buffer of `size` bytes without initial contents.
    ///
    /// # Panics
    /// If `size` is zero.
    pub fn new_uninitialized(
        graphics_device: &GraphicsDevice,
        size: usize,
        usage: wgpu::BufferUsages,
        label: Cow<'static, str>,
    ) -> Self {
        assert_ne!(size, 0, "Tried to create empty GPU buffer {label}");

        let buffer = graphics_device
            .device()
            .create_buffer(&wgpu::BufferDescriptor {
                size: size as wgpu::BufferAddress,
                usage,
                mapped_at_creation: false,
                label: Some(&format!("{label} buffer")),
            });

        Self {
            buffer,
            size,
            label,
        }
    }

    /// Creates a buffer of `size` bytes that other buffers and textures can be
    /// copied into before it is mapped with [`Self::map_and_read`].
    pub fn new_readback(
        graphics_device: &GraphicsDevice,
        size: usize,
        label: Cow<'static, str>,
    ) -> Self {
        Self::new_uninitialized(
            graphics_device,
            size,
            GPUBufferType::Readback.usage(),
            label,
        )
    }

    pub fn label(&self) -> &Cow<'static, str> {
        &self.label
    }

    /// The size of the buffer in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// A slice covering the whole buffer.
    pub fn slice(&self) -> wgpu::BufferSlice<'_> {
        self.buffer.slice(..)
    }

    /// Queues a write of the given bytes over the whole buffer.
    ///
    /// # Panics
    /// If the number of bytes differs from the buffer size.
    pub fn write(&self, graphics_device: &GraphicsDevice, bytes: &[u8]) {
        assert_eq!(
            bytes.len(),
            self.size,
            "Write does not cover GPU buffer {}",
            self.label
        );
        graphics_device.queue().write_buffer(&self.buffer, 0, bytes);
    }

    /// Creates a bind group entry for the whole buffer at the given binding.
    pub fn create_bind_group_entry(&self, binding: u32) -> wgpu::BindGroupEntry<'_> {
        wgpu::BindGroupEntry {
            binding,
            resource: self.buffer.as_entire_binding(),
        }
    }

    /// Maps the buffer for reading, waits until the mapping is done and
    /// returns a copy of its contents. The buffer is unmapped again before
    /// returning.
    ///
    /// # Errors
    /// Returns an error if the mapping fails.
    pub fn map_and_read(&self, graphics_device: &GraphicsDevice) -> Result<Vec<u8>> {
        let slice = self.slice();

        let outcome = Arc::new(Mutex::new(None));
        let callback_outcome = Arc::clone(&outcome);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            *callback_outcome.lock() = Some(result);
        });

        graphics_device.wait_until_idle();

        let mapping = outcome.lock().take();
        match mapping {
            Some(Ok(())) => {}
            Some(Err(error)) => {
                return Err(anyhow!("Failed to map {} buffer: {error}", self.label));
            }
            None => return Err(anyhow!("Mapping of {} buffer never completed", self.label)),
        }

        let bytes = slice.get_mapped_range().to_vec();
        self.buffer.unmap();
        Ok(bytes)
    }
}

impl GPUBufferType {
    pub fn usage(&self) -> wgpu::BufferUsages {
        use wgpu::BufferUsages as U;
        match self {
            Self::Vertex => U::VERTEX,
            Self::Index => U::INDEX,
            Self::Uniform => U::UNIFORM | U::COPY_SRC,
            Self::Storage => U::STORAGE | U::COPY_SRC | U::COPY_DST,
            Self::Readback => U::MAP_READ | U::COPY_DST,
            Self::Indirect => U::INDIRECT | U::STORAGE | U::COPY_SRC | U::COPY_DST,
        }
    }
}

/// Records a copy of the whole source buffer into the start of the
/// destination buffer.
///
/// # Panics
/// If the source is larger than the destination.
pub fn encode_buffer_to_buffer_copy_command(
    command_encoder: &mut wgpu::CommandEncoder,
    source: &GPUBuffer,
    destination: &GPUBuffer,
) {
    assert!(
        source.size() <= destination.size(),
        "Buffer {} does not fit in {}",
        source.label(),
        destination.label()
    );
    command_encoder.copy_buffer_to_buffer(
        source.buffer(),
        0,
        destination.buffer(),
        0,
        source.size() as wgpu::BufferAddress,
    );
}

/// Reads back `n_bytes` bytes starting at `byte_offset` in the given buffer,
/// which needs the `COPY_SRC` usage. Blocks until all previously submitted
/// work and the copy have finished.
///
/// # Errors
/// Returns an error if the readback buffer can not be mapped.
pub fn read_buffer_bytes(
    graphics_device: &GraphicsDevice,
    source: &wgpu::Buffer,
    byte_offset: u64,
    n_bytes: usize,
    label: Cow<'static, str>,
) -> Result<Vec<u8>> {
    let readback = GPUBuffer::new_readback(graphics_device, n_bytes, label);

    let mut command_encoder =
        graphics_device
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{} readback encoder", readback.label())),
            });
    command_encoder.copy_buffer_to_buffer(
        source,
        byte_offset,
        readback.buffer(),
        0,
        n_bytes as wgpu::BufferAddress,
    );
    graphics_device.queue().submit([command_encoder.finish()]);

    readback.map_and_read(graphics_device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_make_uniform_storage_and_indirect_buffers_readable_back() {
        for buffer_type in [
            GPUBufferType::Uniform,
            GPUBufferType::Storage,
            GPUBufferType::Indirect,
        ] {
            assert!(buffer_type.usage().contains(wgpu::BufferUsages::COPY_SRC));
        }
        assert!(
            GPUBufferType::Readback
                .usage()
                .contains(wgpu::BufferUsages::MAP_READ)
        );
    }

    #[test]
    fn should_allow_shader_writes_to_indirect_buffers() {
        assert!(
            GPUBufferType::Indirect
                .usage()
                .contains(wgpu::BufferUsages::INDIRECT | wgpu::BufferUsages::STORAGE)
        );
    }
}
