//! Lumen headless demo
//!
//! Draws a pool of instanced cubes and runs a compute pass into the
//! offscreen target for a few frames, then prints the renderer statistics.
//!
//! Shaders are compiled ahead of time:
//!
//! ```text
//! glslc shaders/instanced.vert -o shaders/instanced.vert.spv
//! glslc shaders/instanced.frag -o shaders/instanced.frag.spv
//! glslc shaders/counter.comp -o shaders/counter.comp.spv
//! ```

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use lumen_gpu::glam::{Mat4, Vec3};
use lumen_gpu::lumen::device::{
    Descriptor, DescriptorKind, GraphicsDevice, ShaderStageFlags, TextureFormat, VertexFormat, VertexInputRate,
};
use lumen_gpu::lumen::log::set_min_severity;
use lumen_gpu::lumen::pipeline::{Pipeline, VertexBinding};
use lumen_gpu::lumen::resource::{BufferChain, BufferSlot};
use lumen_gpu::lumen::{Config, Renderer, Result};
use lumen_gpu::{engine_error, engine_info};
use lumen_gpu_vulkan::VulkanDevice;

const SOURCE: &str = "lumen_demo";
const FRAMES: u32 = 8;
const CUBES: u32 = 16;
const COUNTERS: u32 = 256;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

fn cube_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(8);
    for i in 0..8u32 {
        let x = if i & 1 == 0 { -0.5 } else { 0.5 };
        let y = if i & 2 == 0 { -0.5 } else { 0.5 };
        let z = if i & 4 == 0 { -0.5 } else { 0.5 };
        vertices.push(Vertex { position: [x, y, z], color: [x + 0.5, y + 0.5, z + 0.5] });
    }
    let indices = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    (vertices, indices)
}

fn cube_transform(index: u32, frame: u32) -> Mat4 {
    let column = (index % 4) as f32 - 1.5;
    let row = (index / 4) as f32 - 1.5;
    let angle = frame as f32 * 0.1 + index as f32;
    Mat4::from_translation(Vec3::new(column * 1.5, row * 1.5, 0.0)) * Mat4::from_rotation_y(angle)
}

fn camera(width: u32, height: u32) -> Mat4 {
    let aspect = width as f32 / height as f32;
    Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0)
        * Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y)
}

fn shader(name: &str) -> String {
    format!("{}/shaders/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn run() -> Result<()> {
    let config = Config::default()
        .with_app_name("Lumen Demo")
        .with_extent(800, 600)
        .with_depth(TextureFormat::D32_SFLOAT)
        .with_clear_color([0.05, 0.05, 0.08, 1.0]);
    set_min_severity(config.log_severity);

    let device = Arc::new(VulkanDevice::new(&config)?);
    engine_info!(SOURCE, "Running on {}", device.device_name());
    let device: Arc<dyn GraphicsDevice> = device;
    let mut renderer = Renderer::new(device, config)?;
    let extent = renderer.extent();

    // ===== MESH + MODELS =====

    let (vertices, indices) = cube_mesh();
    let vertex_buffer = renderer.create_vertex_buffer(&vertices)?;
    let index_buffer = renderer.create_index_buffer(&indices)?;
    let pool = renderer.create_model_pool(vertex_buffer, index_buffer, CUBES)?;

    let transforms = renderer.create_storage_buffer(&[], BufferChain::Double, 64, CUBES, false)?;
    let mut models = Vec::with_capacity(CUBES as usize);
    {
        let mut pool = pool.lock();
        pool.attach_buffer(1, transforms)?;
        for _ in 0..CUBES {
            let model = pool.create_model()?;
            pool.set_model_transform(&model, 1, cube_transform(model.index(), 0))?;
            models.push(model);
        }
    }

    // ===== CAMERA =====

    let camera_buffer = renderer.create_uniform_buffer(
        bytemuck::bytes_of(&camera(extent.width, extent.height)),
        BufferChain::Single,
        64,
        1,
        true,
    )?;
    let camera_pool = renderer.create_descriptor_pool(
        vec![Descriptor::new(DescriptorKind::UniformBuffer, ShaderStageFlags::VERTEX, 0)],
        1,
    )?;
    let camera_set = camera_pool.create_descriptor_set()?;
    camera_set.lock().attach_buffer(0, &camera_buffer, BufferSlot::Primary)?;

    let mut graphics = renderer.create_graphics_pipeline(shader("instanced.vert.spv"), shader("instanced.frag.spv"));
    graphics.attach_vertex_binding(VertexBinding::packed(
        0,
        VertexInputRate::Vertex,
        0,
        &[VertexFormat::Vec3, VertexFormat::Vec3],
    ))?;
    graphics.attach_vertex_binding(VertexBinding::packed(1, VertexInputRate::Instance, 2, &[VertexFormat::Mat4]))?;
    graphics.attach_descriptor_set(0, camera_set)?;
    graphics.attach_model_pool(Arc::clone(&pool));

    // ===== COMPUTE =====

    let counters = renderer.create_storage_buffer(&[], BufferChain::Single, 4, COUNTERS, true)?;
    let counter_pool = renderer.create_descriptor_pool(
        vec![Descriptor::new(DescriptorKind::StorageBuffer, ShaderStageFlags::COMPUTE, 0)],
        1,
    )?;
    let counter_set = counter_pool.create_descriptor_set()?;
    counter_set.lock().attach_buffer(0, &counters, BufferSlot::Primary)?;

    let mut compute = renderer.create_compute_pipeline(shader("counter.comp.spv"), 64, 1, 1)?;
    compute.attach_descriptor_set(0, counter_set)?;
    compute.attach_dispatch_buffer(Arc::clone(&counters));

    // ===== FRAMES =====

    for frame in 0..FRAMES {
        {
            let mut pool = pool.lock();
            for model in &models {
                if pool.is_live(model) {
                    pool.set_model_transform(model, 1, cube_transform(model.index(), frame))?;
                }
            }
            // Halfway through, drop one cube and spawn a replacement in its slot
            if frame == FRAMES / 2 {
                let removed = models.remove(0);
                pool.destroy_model(removed)?;
                let model = pool.create_model()?;
                pool.set_model_transform(&model, 1, cube_transform(model.index(), frame))?;
                models.push(model);
            }
            // Hide the first cube for the last frames without touching the recording
            if frame == FRAMES - 2 {
                pool.set_model_active(&models[0], false)?;
            }
        }

        let mut pipelines: [&mut dyn Pipeline; 2] = [&mut graphics, &mut compute];
        let recorded = renderer.prepare_frame(&mut pipelines)?;
        renderer.submit_frame()?;
        engine_info!(SOURCE, "Frame {} submitted (recorded: {})", frame, recorded);
    }

    renderer.device().wait_idle()?;

    let first = counters.lock().get_data_count(BufferSlot::Primary, 1)?.to_vec();
    let first: u32 = bytemuck::pod_read_unaligned(&first[..4]);
    let stats = renderer.stats();
    engine_info!(SOURCE, "{} frames, {} recordings, {} commands in the last one, counter[0] = {}",
        stats.frames, stats.recordings, stats.draws_last_recording, first);

    #[cfg(feature = "vulkan-validation")]
    lumen_gpu_vulkan::print_validation_stats_report();

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        engine_error!(SOURCE, "Demo failed: {}", e);
        std::process::exit(1);
    }
}
