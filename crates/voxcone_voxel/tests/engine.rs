//! Voxel engine tests running on the GPU. Each test is skipped when no
//! suitable graphics adapter is available, unless `VOXCONE_REQUIRE_GPU` is
//! set.

mod common;

use anyhow::anyhow;
use approx::assert_abs_diff_eq;
use common::{
    connect, create_engine, repeated_triangle_mesh, skip_unless_gpu_required, submit,
    unit_voxel_config,
};
use nalgebra::Point3;
use rand::{Rng, SeedableRng, rngs::StdRng};
use voxcone_gpu::{bind_group_layout::BindGroupLayoutRegistry, wgpu};
use voxcone_voxel::{
    VoxelEngine, VoxelResolution, VoxelizationStrategy,
    config::ConeTracingParameters,
    reference::{Texel, is_occupied, linear_voxel_index, mip_chain, occupied_voxel_count},
    triangle::{
        LARGE_TRIANGLE_CAPACITY, is_small_triangle, large_triangle_record_count,
        triangle_voxel_span,
    },
};

fn single_voxel_volume(voxels_per_side: u32, coords: [u32; 3], texel: Texel) -> Vec<Texel> {
    let mut texels = vec![[0; 4]; (voxels_per_side as usize).pow(3)];
    texels[linear_voxel_index(voxels_per_side, coords[0], coords[1], coords[2])] = texel;
    texels
}

#[test]
fn should_compact_single_occupied_voxel_into_one_instance() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let engine = create_engine(
        &graphics_device,
        &registry,
        unit_voxel_config(VoxelizationStrategy::Rasterization),
    );

    let color = [255, 128, 0, 255];
    engine
        .volume()
        .write_base_level(&graphics_device, &single_voxel_volume(64, [3, 5, 7], color))
        .unwrap();

    engine.update_uniform_buffers(&graphics_device, 0);
    submit(&graphics_device, |encoder| {
        engine.dispatch_visualization_reset(encoder);
        engine.dispatch_visualization_compute(encoder, 0);
    });

    let instances = engine
        .visualizer()
        .unwrap()
        .read_instances(&graphics_device)
        .unwrap();

    assert_eq!(instances.len(), 1);
    assert_abs_diff_eq!(instances[0].position[0], 3.5, epsilon = 1e-4);
    assert_abs_diff_eq!(instances[0].position[1], 5.5, epsilon = 1e-4);
    assert_abs_diff_eq!(instances[0].position[2], 7.5, epsilon = 1e-4);
    assert_eq!(instances[0].color, color);
}

#[test]
fn should_give_same_instance_count_for_repeated_reset_and_compaction() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let engine = create_engine(
        &graphics_device,
        &registry,
        unit_voxel_config(VoxelizationStrategy::Rasterization),
    );

    let mut texels = single_voxel_volume(64, [0, 0, 0], [10, 20, 30, 255]);
    texels[linear_voxel_index(64, 63, 63, 63)] = [1, 2, 3, 4];
    engine
        .volume()
        .write_base_level(&graphics_device, &texels)
        .unwrap();

    engine.update_uniform_buffers(&graphics_device, 0);
    let visualizer = engine.visualizer().unwrap();

    for _ in 0..3 {
        submit(&graphics_device, |encoder| {
            engine.dispatch_visualization_reset(encoder);
            engine.dispatch_visualization_compute(encoder, 0);
        });
        assert_eq!(visualizer.read_instance_count(&graphics_device).unwrap(), 2);
    }

    submit(&graphics_device, |encoder| {
        engine.dispatch_visualization_reset(encoder);
    });
    assert_eq!(visualizer.read_instance_count(&graphics_device).unwrap(), 0);
}

#[test]
fn should_generate_same_mip_chain_as_reference_every_time() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let engine = create_engine(
        &graphics_device,
        &registry,
        unit_voxel_config(VoxelizationStrategy::Rasterization),
    );

    let mut rng = StdRng::seed_from_u64(7);
    let base_level: Vec<Texel> = (0..64 * 64 * 64)
        .map(|_| {
            if rng.random_bool(0.2) {
                [rng.random(), rng.random(), rng.random(), 255]
            } else {
                [0; 4]
            }
        })
        .collect();
    engine
        .volume()
        .write_base_level(&graphics_device, &base_level)
        .unwrap();

    let expected = mip_chain(&base_level, 64);

    for _ in 0..2 {
        submit(&graphics_device, |encoder| engine.generate_mip_maps(encoder));

        for (level, expected_level) in expected.iter().enumerate().skip(1) {
            let actual_level = engine
                .volume()
                .read_mip_level(&graphics_device, level as u32)
                .unwrap();
            assert_eq!(actual_level.len(), expected_level.len());
            for (actual, expected) in actual_level.iter().zip(expected_level) {
                for (a, e) in actual.iter().zip(expected) {
                    assert!(a.abs_diff(*e) <= 1, "Level {level}: {actual:?} != {expected:?}");
                }
            }
        }
    }
}

#[test]
fn should_voxelize_small_triangle_and_clear_it_in_next_cycle() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();

    for strategy in [
        VoxelizationStrategy::Compute,
        VoxelizationStrategy::Rasterization,
    ] {
        let engine = create_engine(&graphics_device, &registry, unit_voxel_config(strategy));

        let mesh = repeated_triangle_mesh(
            &graphics_device,
            &registry,
            [[10.2, 10.2, 10.5], [12.8, 10.2, 10.5], [10.2, 12.8, 10.5]],
            1,
            [0, 255, 0, 255],
        );

        engine.update_uniform_buffers(&graphics_device, 0);
        submit(&graphics_device, |encoder| {
            engine
                .record_voxelization_cycle(encoder, std::slice::from_ref(&mesh), 0)
                .unwrap();
        });

        let base_level = engine.volume().read_mip_level(&graphics_device, 0).unwrap();
        let occupied = occupied_voxel_count(&base_level);
        assert!(occupied > 0, "{strategy:?} voxelized nothing");

        for texel in base_level.iter().filter(|texel| texel[3] > 0) {
            assert_eq!(texel[1], 255);
        }

        let instance_count = engine
            .visualizer()
            .unwrap()
            .read_instance_count(&graphics_device)
            .unwrap();
        assert_eq!(instance_count as usize, occupied);

        submit(&graphics_device, |encoder| {
            engine.record_voxelization_cycle(encoder, &[], 0).unwrap();
        });
        let base_level = engine.volume().read_mip_level(&graphics_device, 0).unwrap();
        assert_eq!(occupied_voxel_count(&base_level), 0);
    }
}

fn record_count_for_large_triangles(triangle_count: u32) -> Option<u32> {
    let graphics_device = connect()?;
    let registry = BindGroupLayoutRegistry::new();
    let engine = create_engine(
        &graphics_device,
        &registry,
        unit_voxel_config(VoxelizationStrategy::Compute),
    );

    // Span of 8 voxels gives one record per triangle
    let mesh = repeated_triangle_mesh(
        &graphics_device,
        &registry,
        [[20.5, 20.5, 20.5], [27.5, 20.5, 20.5], [20.5, 27.5, 20.5]],
        triangle_count,
        [255; 4],
    );
    assert_eq!(
        engine.check_large_triangle_capacity(&mesh),
        u64::from(triangle_count)
    );

    engine.update_uniform_buffers(&graphics_device, 0);
    submit(&graphics_device, |encoder| {
        let mut pass = engine.begin_voxelization(encoder, 0);
        engine.voxelize(&mut pass, &mesh, 0).unwrap();
        engine.end_voxelization(pass);
    });

    engine
        .read_large_triangle_record_count(&graphics_device)
        .unwrap()
}

#[test]
fn should_record_every_large_triangle_below_capacity() {
    if let Some(count) = record_count_for_large_triangles(LARGE_TRIANGLE_CAPACITY - 1) {
        assert_eq!(count, LARGE_TRIANGLE_CAPACITY - 1);
    }
}

#[test]
fn should_drop_large_triangles_beyond_capacity() {
    if let Some(count) = record_count_for_large_triangles(LARGE_TRIANGLE_CAPACITY + 1) {
        assert_eq!(count, LARGE_TRIANGLE_CAPACITY);
    }
}

#[test]
fn should_rebuild_resources_when_revoxelizing() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let mut engine = create_engine(
        &graphics_device,
        &registry,
        unit_voxel_config(VoxelizationStrategy::Compute),
    );
    let original_width = engine.voxel_width();

    engine
        .revoxelize(&graphics_device, &registry, VoxelResolution::R128)
        .unwrap();

    assert_eq!(engine.resolution(), VoxelResolution::R128);
    assert_eq!(engine.volume().mip_level_count(), 8);
    assert_abs_diff_eq!(engine.voxel_width(), 0.5 * original_width);
    assert_eq!(engine.config().strategy, VoxelizationStrategy::Compute);

    let mesh = repeated_triangle_mesh(
        &graphics_device,
        &registry,
        [[1.1, 1.1, 1.1], [1.4, 1.1, 1.1], [1.1, 1.4, 1.1]],
        1,
        [255; 4],
    );
    engine.update_uniform_buffers(&graphics_device, 1);
    submit(&graphics_device, |encoder| {
        engine
            .record_voxelization_cycle(encoder, std::slice::from_ref(&mesh), 1)
            .unwrap();
    });
    let base_level = engine.volume().read_mip_level(&graphics_device, 0).unwrap();
    assert_eq!(base_level.len(), 128 * 128 * 128);
    assert!(occupied_voxel_count(&base_level) > 0);

    engine
        .revoxelize(&graphics_device, &registry, VoxelResolution::R64)
        .unwrap();
    assert_eq!(engine.resolution(), VoxelResolution::R64);
    assert_abs_diff_eq!(engine.voxel_width(), original_width);
}

fn mip_extents(engine: &VoxelEngine) -> Vec<wgpu::Extent3d> {
    let texture = engine.volume().texture();
    (0..texture.mip_level_count())
        .map(|level| {
            texture
                .size()
                .mip_level_size(level, wgpu::TextureDimension::D3)
        })
        .collect()
}

#[test]
fn should_keep_observable_state_when_revoxelizing_to_same_resolution() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let mut config = unit_voxel_config(VoxelizationStrategy::Rasterization);
    config.second_corner = [64.0, 32.0, 16.0];
    let mut engine = create_engine(&graphics_device, &registry, config);

    let resolution = engine.resolution();
    let aabb_min = *engine.aabb_min();
    let aabb_max = *engine.aabb_max();
    let center = *engine.center();
    let voxel_width = engine.voxel_width();
    let extents = mip_extents(&engine);

    assert_eq!(aabb_min, Point3::new(0.0, -16.0, -24.0));
    assert_eq!(aabb_max, Point3::new(64.0, 48.0, 40.0));
    assert_eq!(extents.len(), 7);
    assert_eq!(extents.last().unwrap().width, 1);

    engine
        .volume()
        .write_base_level(
            &graphics_device,
            &single_voxel_volume(64, [1, 2, 3], [255; 4]),
        )
        .unwrap();

    for _ in 0..2 {
        engine
            .revoxelize(&graphics_device, &registry, resolution)
            .unwrap();

        assert_eq!(engine.resolution(), resolution);
        assert_eq!(*engine.aabb_min(), aabb_min);
        assert_eq!(*engine.aabb_max(), aabb_max);
        assert_eq!(*engine.center(), center);
        assert_abs_diff_eq!(engine.voxel_width(), voxel_width);
        assert_eq!(mip_extents(&engine), extents);
    }

    // The volume is recreated, so earlier contents are gone
    let base_level = engine.volume().read_mip_level(&graphics_device, 0).unwrap();
    assert_eq!(occupied_voxel_count(&base_level), 0);
}

#[test]
fn should_voxelize_large_triangle_through_subdivision_pass() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let engine = create_engine(
        &graphics_device,
        &registry,
        unit_voxel_config(VoxelizationStrategy::Compute),
    );

    // Right triangle in the plane through the centers of the z = 20 voxels,
    // with no edge touching a voxel boundary
    let positions: [[f32; 3]; 3] = [[20.3, 20.3, 20.5], [31.6, 20.3, 20.5], [20.3, 31.6, 20.5]];
    let span = triangle_voxel_span(&positions.map(Point3::from), 64);
    assert_eq!(span, 12);
    assert!(!is_small_triangle(span));

    let mesh = repeated_triangle_mesh(&graphics_device, &registry, positions, 1, [0, 0, 255, 255]);

    engine.update_uniform_buffers(&graphics_device, 0);
    submit(&graphics_device, |encoder| {
        engine
            .record_voxelization_cycle(encoder, std::slice::from_ref(&mesh), 0)
            .unwrap();
    });

    assert_eq!(
        engine
            .read_large_triangle_record_count(&graphics_device)
            .unwrap(),
        Some(large_triangle_record_count(span))
    );

    let base_level = engine.volume().read_mip_level(&graphics_device, 0).unwrap();
    for z in 0..64 {
        for y in 0..64 {
            for x in 0..64 {
                let expected = z == 20 && x >= 20 && y >= 20 && x + y <= 51;
                let texel = base_level[linear_voxel_index(64, x, y, z)];
                assert_eq!(is_occupied(&texel), expected, "Voxel ({x}, {y}, {z}): {texel:?}");
                if expected {
                    assert_eq!(texel, [0, 0, 255, 255]);
                }
            }
        }
    }
    assert_eq!(occupied_voxel_count(&base_level), 78);
}

#[test]
fn should_write_updated_cone_tracing_parameters_to_grid_uniform() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let mut engine = create_engine(
        &graphics_device,
        &registry,
        unit_voxel_config(VoxelizationStrategy::Rasterization),
    );

    let parameters = ConeTracingParameters {
        ambient_occlusion_enabled: true,
        occlusion_visualization_enabled: true,
        occlusion_decay_factor: 0.25,
        surface_offset: 2.5,
        cone_cutoff: 30.0,
    };
    engine.set_cone_tracing_parameters(parameters.clone());
    assert_eq!(engine.config().cone_tracing, parameters);

    engine.update_uniform_buffers(&graphics_device, 1);

    let written = engine
        .uniforms()
        .read_grid_uniform(&graphics_device, 1)
        .unwrap();
    assert_eq!(written, engine.grid_uniform());
    assert_eq!(written.ambient_occlusion_enabled, 1);
    assert_eq!(written.occlusion_visualization_enabled, 1);
    assert_abs_diff_eq!(written.occlusion_decay_factor, 0.25);
    assert_abs_diff_eq!(written.surface_offset, 2.5);
    assert_abs_diff_eq!(written.cone_cutoff, 30.0);

    // The other frame keeps its data until it is updated
    let untouched = engine
        .uniforms()
        .read_grid_uniform(&graphics_device, 0)
        .unwrap();
    assert_abs_diff_eq!(
        untouched.surface_offset,
        ConeTracingParameters::default().surface_offset
    );
}

#[test]
fn should_create_and_drop_visualizer_when_toggling_visualization() {
    let Some(graphics_device) = connect() else {
        return;
    };
    let registry = BindGroupLayoutRegistry::new();
    let mut config = unit_voxel_config(VoxelizationStrategy::Rasterization);
    config.visualization.enabled = false;
    let mut engine = create_engine(&graphics_device, &registry, config);
    assert!(engine.visualizer().is_none());

    engine
        .volume()
        .write_base_level(
            &graphics_device,
            &single_voxel_volume(64, [8, 8, 8], [255; 4]),
        )
        .unwrap();
    engine.update_uniform_buffers(&graphics_device, 0);

    let record_compaction = |engine: &VoxelEngine| {
        submit(&graphics_device, |encoder| {
            engine.dispatch_visualization_reset(encoder);
            engine.dispatch_visualization_compute(encoder, 0);
        });
    };

    // Nothing to record while disabled
    record_compaction(&engine);

    engine
        .set_visualization_enabled(&graphics_device, true)
        .unwrap();
    assert!(engine.config().visualization.enabled);
    record_compaction(&engine);
    assert_eq!(
        engine
            .visualizer()
            .unwrap()
            .read_instance_count(&graphics_device)
            .unwrap(),
        1
    );

    engine
        .revoxelize(&graphics_device, &registry, VoxelResolution::R64)
        .unwrap();
    assert!(engine.visualizer().is_some());

    engine
        .set_visualization_enabled(&graphics_device, false)
        .unwrap();
    assert!(engine.visualizer().is_none());
    assert!(!engine.config().visualization.enabled);
    record_compaction(&engine);

    engine
        .revoxelize(&graphics_device, &registry, VoxelResolution::R64)
        .unwrap();
    assert!(engine.visualizer().is_none());
}

#[test]
fn should_skip_when_connection_fails_and_gpu_is_optional() {
    let device = skip_unless_gpu_required::<()>(Err(anyhow!("no adapter")), false);
    assert!(device.is_none());
}

#[test]
#[should_panic(expected = "No usable GPU")]
fn should_fail_when_connection_fails_and_gpu_is_required() {
    skip_unless_gpu_required::<()>(Err(anyhow!("no adapter")), true);
}
