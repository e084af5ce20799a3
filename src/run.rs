//! Demo driver running voxelization cycles on a procedural mesh.

use crate::gpu;
use anyhow::{Context, Result};
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, Translation3, Vector3};
use std::{borrow::Cow, f32::consts::PI};
use voxcone_gpu::{bind_group_layout::BindGroupLayoutRegistry, device::GraphicsDevice, wgpu};
use voxcone_voxel::{
    VisualizationTargetConfig, VoxelEngine, VoxelEngineConfig, VoxelResolution,
    mesh::{MeshMaterial, Vertex, VoxelizableMesh},
    reference::occupied_voxel_count,
    resolution::mip_extent,
};

const TARGET_SIZE: u32 = 512;
const SPHERE_STACKS: u32 = 48;
const SPHERE_SECTORS: u32 = 96;
const CHECKER_SIZE: u32 = 8;

/// Mip levels larger than this are not read back for logging.
const MAX_LOGGED_LEVEL_EXTENT: u32 = 64;

/// Voxelizes a textured sphere filling most of the grid, draws the voxels into
/// an offscreen target and logs occupancy statistics. If `revoxelize_to` is
/// given, the engine is then rebuilt at that resolution and the cycle is
/// repeated.
///
/// # Errors
/// Returns an error if the graphics device can not be connected, the engine
/// or mesh can not be created, or a readback fails.
pub fn run(config: VoxelEngineConfig, revoxelize_to: Option<VoxelResolution>) -> Result<()> {
    let graphics_device = gpu::connect_headless()?;
    let bind_group_layout_registry = BindGroupLayoutRegistry::new();
    let target = VisualizationTargetConfig::default();

    let mut engine = VoxelEngine::new(
        &graphics_device,
        &bind_group_layout_registry,
        config,
        target,
    )?;

    let mesh = create_sphere_mesh(
        &graphics_device,
        &bind_group_layout_registry,
        engine.center(),
        0.4 * engine.bounds().length(),
    )?;

    let estimated_records = engine.check_large_triangle_capacity(&mesh);
    log::info!(
        "Sphere has {} triangles and needs an estimated {estimated_records} large triangle records",
        mesh.triangle_count()
    );

    engine.set_camera_view_projection(camera_view_projection(&engine));

    let offscreen_target = OffscreenTarget::new(&graphics_device, &target);

    run_cycle(&graphics_device, &engine, &mesh, &offscreen_target, 0)?;

    if let Some(resolution) = revoxelize_to {
        engine.revoxelize(&graphics_device, &bind_group_layout_registry, resolution)?;
        run_cycle(&graphics_device, &engine, &mesh, &offscreen_target, 1)?;
    }

    Ok(())
}

fn run_cycle(
    graphics_device: &GraphicsDevice,
    engine: &VoxelEngine,
    mesh: &VoxelizableMesh,
    offscreen_target: &OffscreenTarget,
    frame_index: usize,
) -> Result<()> {
    engine.update_uniform_buffers(graphics_device, frame_index);

    let mut command_encoder =
        graphics_device
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Voxelization cycle encoder"),
            });

    engine.record_voxelization_cycle(
        &mut command_encoder,
        std::slice::from_ref(mesh),
        frame_index,
    )?;

    {
        let mut render_pass = offscreen_target.begin_render_pass(&mut command_encoder);
        engine.visualize_voxel_grid(&mut render_pass, frame_index);
    }

    graphics_device
        .queue()
        .submit(std::iter::once(command_encoder.finish()));
    graphics_device.wait_until_idle();

    log_results(graphics_device, engine)
}

fn log_results(graphics_device: &GraphicsDevice, engine: &VoxelEngine) -> Result<()> {
    let resolution = engine.resolution();
    log::info!("Voxelized sphere into {resolution} grid");

    if let Some(records) = engine.read_large_triangle_record_count(graphics_device)? {
        log::info!("Compute voxelizer produced {records} large triangle records");
    }

    if let Some(visualizer) = engine.visualizer() {
        log::info!(
            "Visualization draws {} voxel instances (capacity {})",
            visualizer.read_instance_count(graphics_device)?,
            visualizer.instance_capacity()
        );
    }

    let voxels_per_side = resolution.voxels_per_side();
    for level in 0..resolution.mip_level_count() {
        let extent = mip_extent(voxels_per_side, level);
        if extent > MAX_LOGGED_LEVEL_EXTENT {
            continue;
        }
        let texels = engine
            .volume()
            .read_mip_level(graphics_device, level)
            .with_context(|| format!("Failed to read mip level {level} for logging"))?;
        log::info!(
            "Mip level {level} ({extent}^3): {} occupied voxels",
            occupied_voxel_count(&texels)
        );
    }

    Ok(())
}

fn camera_view_projection(engine: &VoxelEngine) -> Matrix4<f32> {
    let center = engine.center();
    let distance = 1.5 * engine.bounds().length();
    let eye = center + Vector3::new(0.6, 0.5, 0.8).normalize() * distance;

    let view = Isometry3::look_at_rh(&eye, center, &Vector3::y());
    let projection = Perspective3::new(1.0, PI / 3.0, 0.01 * distance, 4.0 * distance);

    projection.as_matrix() * view.to_homogeneous()
}

/// Creates a UV sphere with a checkered material, centered on the given point
/// with the given radius.
///
/// # Errors
/// See [`VoxelizableMesh::new`] and [`MeshMaterial::from_rgba8`].
pub fn create_sphere_mesh(
    graphics_device: &GraphicsDevice,
    bind_group_layout_registry: &BindGroupLayoutRegistry,
    center: &Point3<f32>,
    radius: f32,
) -> Result<VoxelizableMesh> {
    let (vertices, indices) = uv_sphere(SPHERE_STACKS, SPHERE_SECTORS);

    let material = MeshMaterial::from_rgba8(
        graphics_device,
        bind_group_layout_registry,
        CHECKER_SIZE,
        CHECKER_SIZE,
        &checker_texels(CHECKER_SIZE),
        "Sphere",
    )?;

    let model_transform = Translation3::from(center.coords).to_homogeneous()
        * Matrix4::new_scaling(radius);

    VoxelizableMesh::new(
        graphics_device,
        bind_group_layout_registry,
        &vertices,
        &indices,
        model_transform,
        material,
        Cow::Borrowed("Sphere"),
    )
}

/// Generates the vertices and triangle indices of a unit sphere with the
/// given number of stacks and sectors. The poles have one triangle per
/// sector.
pub fn uv_sphere(stacks: u32, sectors: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(((stacks + 1) * (sectors + 1)) as usize);

    for stack in 0..=stacks {
        let polar = PI * stack as f32 / stacks as f32;
        for sector in 0..=sectors {
            let azimuth = 2.0 * PI * sector as f32 / sectors as f32;
            let position = [
                polar.sin() * azimuth.cos(),
                polar.cos(),
                polar.sin() * azimuth.sin(),
            ];
            vertices.push(Vertex::new(
                position,
                position,
                [
                    sector as f32 / sectors as f32,
                    stack as f32 / stacks as f32,
                ],
            ));
        }
    }

    let mut indices = Vec::with_capacity((6 * stacks * sectors) as usize);

    for stack in 0..stacks {
        for sector in 0..sectors {
            let upper = stack * (sectors + 1) + sector;
            let lower = upper + sectors + 1;
            if stack != 0 {
                indices.extend_from_slice(&[upper, lower, upper + 1]);
            }
            if stack != stacks - 1 {
                indices.extend_from_slice(&[upper + 1, lower, lower + 1]);
            }
        }
    }

    (vertices, indices)
}

fn checker_texels(size: u32) -> Vec<[u8; 4]> {
    (0..size * size)
        .map(|index| {
            if (index % size + index / size) % 2 == 0 {
                [230, 90, 40, 255]
            } else {
                [40, 120, 220, 255]
            }
        })
        .collect()
}

#[derive(Debug)]
struct OffscreenTarget {
    _color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
}

impl OffscreenTarget {
    fn new(graphics_device: &GraphicsDevice, target: &VisualizationTargetConfig) -> Self {
        let create_texture = |format, label| {
            let texture = graphics_device
                .device()
                .create_texture(&wgpu::TextureDescriptor {
                    size: wgpu::Extent3d {
                        width: TARGET_SIZE,
                        height: TARGET_SIZE,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                    label: Some(label),
                });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        };

        let (color_texture, color_view) =
            create_texture(target.color_format, "Offscreen color texture");
        let depth = target
            .depth_format
            .map(|format| create_texture(format, "Offscreen depth texture"));

        Self {
            _color_texture: color_texture,
            color_view,
            depth,
        }
    }

    fn begin_render_pass<'a>(
        &self,
        command_encoder: &'a mut wgpu::CommandEncoder,
    ) -> wgpu::RenderPass<'a> {
        command_encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: self.depth.as_ref().map(|(_, view)| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            label: Some("Voxel visualization pass"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn should_generate_sphere_with_valid_indices() {
        let (vertices, indices) = uv_sphere(8, 16);
        assert_eq!(indices.len() % 3, 0);
        assert_eq!(indices.len() / 3, (16 * (2 * 8 - 2)) as usize);
        assert!(indices.iter().all(|&index| (index as usize) < vertices.len()));
    }

    #[test]
    fn should_place_sphere_vertices_on_unit_sphere() {
        let (vertices, _) = uv_sphere(6, 12);
        for vertex in vertices {
            let length = Vector3::from(vertex.position).norm();
            assert_abs_diff_eq!(length, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn should_alternate_checker_colors() {
        let texels = checker_texels(4);
        assert_ne!(texels[0], texels[1]);
        assert_ne!(texels[0], texels[4]);
        assert_eq!(texels[0], texels[5]);
    }
}
