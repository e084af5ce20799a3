//! Graphics device.

use anyhow::{Result, anyhow};

/// Interface to a connected graphics device.
#[derive(Debug)]
pub struct GraphicsDevice {
    /// The connection to the graphics device.
    device: wgpu::Device,
    /// The queue where we put commands to execute on the device.
    queue: wgpu::Queue,
    /// The adapter used to connect to the device.
    adapter: wgpu::Adapter,
}

impl GraphicsDevice {
    /// Opens a connection to a graphics device with the given requirements for
    /// the features and limits of the device and optionally the surface the
    /// device must be compatible with. Any of the given optional features that
    /// the adapter supports are enabled in addition to the required ones.
    ///
    /// # Errors
    /// Returns an error if:
    /// - A compatible graphics device can not be found.
    /// - The adapter lacks any of the required features.
    /// - The connection request fails.
    pub async fn connect(
        wgpu_instance: &wgpu::Instance,
        required_features: wgpu::Features,
        optional_features: wgpu::Features,
        required_limits: wgpu::Limits,
        memory_hints: wgpu::MemoryHints,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self> {
        let adapter = Self::create_adapter(wgpu_instance, compatible_surface).await?;

        let adapter_features = adapter.features();

        let missing_features = required_features.difference(adapter_features);
        if !missing_features.is_empty() {
            return Err(anyhow!(
                "Adapter {} is missing required features: {:?}",
                adapter.get_info().name,
                missing_features
            ));
        }

        let available_optional_features = optional_features.intersection(adapter_features);
        let unavailable_optional_features = optional_features.difference(adapter_features);
        if !unavailable_optional_features.is_empty() {
            log::info!(
                "Optional features not supported by adapter: {:?}",
                unavailable_optional_features
            );
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    required_features: required_features | available_optional_features,
                    required_limits,
                    memory_hints,
                    label: None,
                },
                None,
            )
            .await?;

        log::info!("Connected to graphics device: {}", adapter.get_info().name);

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }

    /// Returns a reference to the underlying [`wgpu::Device`].
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the underlying [`wgpu::Queue`].
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Returns a reference to the [`wgpu::Adapter`] used to connect to the
    /// device.
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Whether all the given features are enabled on the device.
    pub fn supports_features(&self, features: wgpu::Features) -> bool {
        self.device.features().contains(features)
    }

    /// Blocks until the device has finished all submitted work.
    pub fn wait_until_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    /// Creates a handle to a graphics device that is compatible with the given
    /// surface, if provided.
    ///
    /// # Errors
    /// Returns an error if a compatible graphics device can not be found.
    async fn create_adapter(
        wgpu_instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<wgpu::Adapter> {
        wgpu_instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false, // Do not fallback to software rendering system
            })
            .await
            .ok_or_else(|| anyhow!("Could not find compatible adapter"))
    }
}

/// Creates a new instance of `wgpu` allowing all backends.
pub fn create_wgpu_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}
