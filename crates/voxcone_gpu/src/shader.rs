//! Shader compilation.

pub mod template;

use crate::device::GraphicsDevice;
use anyhow::{Result, anyhow};
use naga::{Module, ShaderStage};
use std::{borrow::Cow, fmt};

/// A compiled graphics program.
#[derive(Debug)]
pub struct Shader {
    module: wgpu::ShaderModule,
    entry_point_names: EntryPointNames,
    source_code: Option<String>,
}

#[derive(Clone, Debug, Default)]
struct EntryPointNames {
    vertex: Option<String>,
    fragment: Option<String>,
    compute: Vec<String>,
}

impl Shader {
    /// Creates a new shader by reading the source from the given WGSL code.
    ///
    /// # Errors
    /// Returns an error if the source code fails to parse.
    pub fn from_wgsl_source(
        graphics_device: &GraphicsDevice,
        source: String,
        label: &str,
    ) -> Result<Self> {
        let naga_module = naga::front::wgsl::parse_str(&source)
            .map_err(|err| anyhow!("Parsing WGSL for shader {label} failed:\n{}", err.emit_to_string(&source)))?;

        Ok(Self::from_naga_module(
            graphics_device,
            naga_module,
            label,
            Some(source),
        ))
    }

    /// Creates a new shader from the given [`Module`].
    pub fn from_naga_module(
        graphics_device: &GraphicsDevice,
        naga_module: Module,
        label: &str,
        source_code: Option<String>,
    ) -> Self {
        let entry_point_names = EntryPointNames::from_naga_module(&naga_module);

        log::debug!("Creating shader module {label}");

        let module = graphics_device
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
                label: Some(label),
            });

        Self {
            module,
            entry_point_names,
            source_code,
        }
    }

    /// Returns a reference to the compiled shader module.
    pub fn module(&self) -> &wgpu::ShaderModule {
        &self.module
    }

    /// Returns the name of the vertex entry point function, or [`None`] if
    /// there is no vertex entry point.
    pub fn vertex_entry_point_name(&self) -> Option<&str> {
        self.entry_point_names.vertex.as_deref()
    }

    /// Returns the name of the fragment entry point function, or [`None`] if
    /// there is no fragment entry point.
    pub fn fragment_entry_point_name(&self) -> Option<&str> {
        self.entry_point_names.fragment.as_deref()
    }

    /// Whether the shader has a compute entry point with the given name.
    pub fn has_compute_entry_point(&self, name: &str) -> bool {
        self.entry_point_names
            .compute
            .iter()
            .any(|entry_point| entry_point == name)
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match &self.source_code {
                Some(source) => source,
                None => "<Source code unavailable>",
            }
        )
    }
}

impl EntryPointNames {
    fn from_naga_module(module: &Module) -> Self {
        let mut entry_point_names = Self::default();
        for entry_point in &module.entry_points {
            match entry_point.stage {
                ShaderStage::Vertex => {
                    entry_point_names.vertex = Some(entry_point.name.clone());
                }
                ShaderStage::Fragment => {
                    entry_point_names.fragment = Some(entry_point.name.clone());
                }
                ShaderStage::Compute => {
                    entry_point_names.compute.push(entry_point.name.clone());
                }
            }
        }
        entry_point_names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_find_entry_points_of_each_stage() {
        let module = naga::front::wgsl::parse_str(
            "
            @vertex
            fn vs() -> @builtin(position) vec4f { return vec4f(0.0); }

            @fragment
            fn fs() -> @location(0) vec4f { return vec4f(1.0); }

            @compute @workgroup_size(1)
            fn first() {}

            @compute @workgroup_size(1)
            fn second() {}
            ",
        )
        .unwrap();

        let names = EntryPointNames::from_naga_module(&module);
        assert_eq!(names.vertex.as_deref(), Some("vs"));
        assert_eq!(names.fragment.as_deref(), Some("fs"));
        assert_eq!(names.compute, vec!["first".to_string(), "second".to_string()]);
    }
}
