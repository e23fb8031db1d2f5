//! Integration tests for VulkanDevice
//!
//! These tests verify that VulkanDevice correctly implements the GraphicsDevice trait.
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test --test vulkan_device_tests -- --ignored

use std::sync::Arc;

use lumen_gpu::lumen::device::{
    BufferDesc, BufferUsage, Descriptor, DescriptorKind, GraphicsDevice, MemoryLocation, ShaderModuleDesc,
    ShaderStage, ShaderStageFlags, TextureDesc, TextureFormat, TextureUsage,
};
use lumen_gpu::lumen::resource::{BufferChain, BufferKind, BufferSlot, Texture};
use lumen_gpu::lumen::{Config, Error, Renderer};
use lumen_gpu_vulkan::VulkanDevice;
use serial_test::serial;

fn create_test_device() -> Arc<VulkanDevice> {
    Arc::new(VulkanDevice::new(&Config::default().with_validation(false)).unwrap())
}

// ============================================================================
// DEVICE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_device_limits() {
    let device = create_test_device();
    let limits = device.limits();

    assert!(limits.min_uniform_offset_alignment.is_power_of_two());
    assert!(limits.min_storage_offset_alignment.is_power_of_two());
    assert!(limits.max_bound_descriptor_sets >= 4);
    assert!(limits.max_vertex_attributes >= 16);
    assert!(!limits.ray_tracing);
    assert!(!device.device_name().is_empty());
}

// ============================================================================
// BUFFER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_host_visible_buffer_write_read() {
    let device = create_test_device();
    let buffer = device
        .create_buffer(&BufferDesc {
            size: 64,
            usage: BufferUsage::UNIFORM,
            location: MemoryLocation::HostVisible,
            label: "test".to_string(),
        })
        .unwrap();

    let data: Vec<u8> = (0..64).collect();
    buffer.write(0, &data).unwrap();

    let mut out = vec![0u8; 16];
    buffer.read(16, &mut out).unwrap();
    assert_eq!(out, (16..32).collect::<Vec<u8>>());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_mapped_write_out_of_range() {
    let device = create_test_device();
    let buffer = device.create_buffer(&BufferDesc::staging(16)).unwrap();

    let result = buffer.write(8, &[0u8; 16]);
    assert!(matches!(result, Err(Error::ContractViolation(_))));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_device_local_buffer_is_not_mappable() {
    let device = create_test_device();
    let buffer = device
        .create_buffer(&BufferDesc {
            size: 16,
            usage: BufferUsage::STORAGE,
            location: MemoryLocation::DeviceLocal,
            label: "device_local".to_string(),
        })
        .unwrap();

    assert!(buffer.write(0, &[0u8; 4]).is_err());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_copy_buffer_round_trip() {
    let device = create_test_device();
    let staging = device.create_buffer(&BufferDesc::staging(32)).unwrap();
    let readback = device.create_buffer(&BufferDesc::readback(32)).unwrap();
    let device_local = device
        .create_buffer(&BufferDesc {
            size: 32,
            usage: BufferUsage::STORAGE,
            location: MemoryLocation::DeviceLocal,
            label: "device_local".to_string(),
        })
        .unwrap();

    let data: Vec<u8> = (100..132).collect();
    staging.write(0, &data).unwrap();
    device.copy_buffer(staging.as_ref(), 0, device_local.as_ref(), 0, 32).unwrap();
    device.copy_buffer(device_local.as_ref(), 8, readback.as_ref(), 0, 16).unwrap();

    let mut out = vec![0u8; 16];
    readback.read(0, &mut out).unwrap();
    assert_eq!(out, (108..124).collect::<Vec<u8>>());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_copy_buffer_out_of_range() {
    let device = create_test_device();
    let a = device.create_buffer(&BufferDesc::staging(16)).unwrap();
    let b = device.create_buffer(&BufferDesc::staging(8)).unwrap();

    let result = device.copy_buffer(a.as_ref(), 0, b.as_ref(), 0, 16);
    assert!(matches!(result, Err(Error::ContractViolation(_))));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_double_buffer_transfer_and_readback() {
    let device = create_test_device();
    let renderer = Renderer::new(device, Config::default().with_validation(false).with_extent(64, 64)).unwrap();

    let data: Vec<u8> = (0..16u32).flat_map(|v| v.to_le_bytes()).collect();
    let buffer = renderer
        .create_storage_buffer(&data, BufferChain::Double, 4, 16, true)
        .unwrap();

    let mut guard = buffer.lock();
    assert_eq!(guard.kind(), BufferKind::Storage);
    guard.write_value(3, &42u32).unwrap();
    guard.set_data(BufferSlot::Secondary).unwrap();
    guard.transfer(BufferSlot::Secondary, BufferSlot::Primary).unwrap();

    guard.host_data_mut().fill(0);
    guard.get_data(BufferSlot::Primary).unwrap();
    assert_eq!(guard.read_value::<u32>(3).unwrap(), 42);
    assert_eq!(guard.read_value::<u32>(4).unwrap(), 4);
}

// ============================================================================
// TEXTURE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_create_texture() {
    let device = create_test_device();
    let texture = device
        .create_texture(&TextureDesc {
            width: 256,
            height: 128,
            format: TextureFormat::R8G8B8A8_UNORM,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            label: "test".to_string(),
        })
        .unwrap();

    assert_eq!(texture.width(), 256);
    assert_eq!(texture.height(), 128);
    assert_eq!(texture.format(), TextureFormat::R8G8B8A8_UNORM);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_texture_upload() {
    let device = create_test_device();
    let pixels: Vec<u8> = (0..64).collect();

    let texture = Texture::from_pixels(device.as_ref(), &pixels, TextureFormat::R8G8B8A8_UNORM, 4, 4).unwrap();
    assert_eq!(texture.extent().width, 4);
    assert_eq!(texture.format(), TextureFormat::R8G8B8A8_UNORM);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_texture_upload_too_small() {
    let device = create_test_device();
    let staging = device.create_buffer(&BufferDesc::staging(16)).unwrap();
    let texture = device
        .create_texture(&TextureDesc {
            width: 4,
            height: 4,
            format: TextureFormat::R8G8B8A8_UNORM,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            label: "test".to_string(),
        })
        .unwrap();

    let result = device.copy_buffer_to_texture(staging.as_ref(), texture.as_ref());
    assert!(matches!(result, Err(Error::ContractViolation(_))));
}

// ============================================================================
// SHADER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_shader_rejects_unaligned_code() {
    let device = create_test_device();
    let result = device.create_shader_module(&ShaderModuleDesc {
        code: &[0x03, 0x02, 0x23],
        stage: ShaderStage::Vertex,
        entry_point: "main",
    });
    assert!(matches!(result, Err(Error::ContractViolation(_))));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_shader_rejects_invalid_spirv() {
    let device = create_test_device();
    let result = device.create_shader_module(&ShaderModuleDesc {
        code: &[0u8; 16],
        stage: ShaderStage::Fragment,
        entry_point: "main",
    });
    assert!(result.is_err());
}

// ============================================================================
// DESCRIPTOR TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_descriptor_set_with_uniform_buffer() {
    let device = create_test_device();
    let renderer = Renderer::new(device, Config::default().with_validation(false).with_extent(64, 64)).unwrap();

    let pool = renderer
        .create_descriptor_pool(
            vec![Descriptor::new(DescriptorKind::UniformBuffer, ShaderStageFlags::VERTEX, 0)],
            2,
        )
        .unwrap();
    let uniforms = renderer.create_uniform_buffer(&[0u8; 64], BufferChain::Single, 64, 1, true).unwrap();

    let set = pool.create_descriptor_set().unwrap();
    let mut guard = set.lock();
    assert!(!guard.is_complete());
    guard.attach_buffer(0, &uniforms, BufferSlot::Primary).unwrap();
    guard.update_set().unwrap();
    assert!(guard.is_ready());
}

// ============================================================================
// RENDERER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_renderer_empty_frame() {
    let device = create_test_device();
    let mut renderer = Renderer::new(device, Config::default().with_validation(false).with_extent(64, 64)).unwrap();

    renderer.render_frame(&mut []).unwrap();
    renderer.render_frame(&mut []).unwrap();

    let stats = renderer.stats();
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.recordings, 1);
    assert_eq!(stats.draws_last_recording, 0);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_renderer_resize() {
    let device = create_test_device();
    let mut renderer = Renderer::new(
        device,
        Config::default().with_validation(false).with_extent(64, 64).with_depth(TextureFormat::D32_SFLOAT),
    )
    .unwrap();

    renderer.render_frame(&mut []).unwrap();
    renderer.rebuild(32, 16).unwrap();
    renderer.render_frame(&mut []).unwrap();

    assert_eq!(renderer.extent().width, 32);
    assert_eq!(renderer.color_target().extent().height, 16);
    assert_eq!(renderer.stats().recordings, 2);
}
