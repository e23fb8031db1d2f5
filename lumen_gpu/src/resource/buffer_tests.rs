use super::*;
use crate::device::mock_device::{mock_buffer, MockDevice};
use glam::{Mat4, Vec3};

fn mock() -> (Arc<MockDevice>, Arc<dyn GraphicsDevice>) {
    let mock = Arc::new(MockDevice::new());
    let device: Arc<dyn GraphicsDevice> = mock.clone();
    (mock, device)
}

fn slot_bytes(buffer: &Buffer, slot: BufferSlot) -> Vec<u8> {
    mock_buffer(buffer.device_buffer(slot).unwrap().as_ref()).unwrap().contents()
}

fn uniform_info(chain: BufferChain, count: u32) -> BufferInfo {
    BufferInfo::new(BufferKind::Uniform, chain, 64, count)
}

// ============================================================================
// CREATION
// ============================================================================

#[test]
fn test_slot_size_is_aligned_per_kind() {
    let (_mock, device) = mock();

    // 3 x 64 = 192 bytes, uniform alignment 256
    let uniform = Buffer::new(Arc::clone(&device), uniform_info(BufferChain::Single, 3), &[]).unwrap();
    assert_eq!(uniform.aligned_size(), 256);
    assert_eq!(uniform.host_data().len(), 192);

    // 12 bytes vertex buffer keeps 4-byte alignment
    let vertex = Buffer::new(device, BufferInfo::new(BufferKind::Vertex, BufferChain::Single, 12, 1), &[]).unwrap();
    assert_eq!(vertex.aligned_size(), 12);
}

#[test]
fn test_chain_decides_slot_count() {
    let (mock, device) = mock();
    let single = Buffer::new(Arc::clone(&device), uniform_info(BufferChain::Single, 4), &[]).unwrap();
    let double = Buffer::new(device, uniform_info(BufferChain::Double, 4), &[]).unwrap();

    assert!(single.slot(BufferSlot::Secondary).is_err());
    assert!(double.slot(BufferSlot::Secondary).is_ok());
    assert_eq!(mock.live_buffers(), 3);
}

#[test]
fn test_initial_data_reaches_every_slot() {
    let (_mock, device) = mock();
    let data: Vec<u8> = (0..128u32).map(|i| i as u8).collect();
    let buffer = Buffer::new(device, uniform_info(BufferChain::Double, 2), &data).unwrap();

    assert_eq!(&slot_bytes(&buffer, BufferSlot::Primary)[..128], &data[..]);
    assert_eq!(&slot_bytes(&buffer, BufferSlot::Secondary)[..128], &data[..]);
    assert!(!buffer.is_host_dirty());
}

#[test]
fn test_initial_data_too_long_is_rejected() {
    let (_mock, device) = mock();
    let err = Buffer::new(device, uniform_info(BufferChain::Single, 1), &[0u8; 65]).err().unwrap();
    assert!(err.is_contract_violation());
}

#[test]
fn test_zero_sized_buffer_is_rejected() {
    let (_mock, device) = mock();
    assert!(Buffer::new(device, uniform_info(BufferChain::Single, 0), &[]).is_err());
}

// ============================================================================
// UPLOAD
// ============================================================================

#[test]
fn test_secondary_on_single_is_contract_violation() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Single, 2), &[]).unwrap();
    let err = buffer.set_data(BufferSlot::Secondary).unwrap_err();
    assert!(err.is_contract_violation());
}

#[test]
fn test_set_data_releases_staging() {
    let (mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Single, 2), &[]).unwrap();
    let live_before = mock.live_buffers();
    let created_before = mock.buffers_created();

    buffer.write_value(0, &Mat4::IDENTITY).unwrap();
    buffer.set_data(BufferSlot::Primary).unwrap();

    assert_eq!(mock.buffers_created(), created_before + 1);
    assert_eq!(mock.live_buffers(), live_before);
}

#[test]
fn test_set_data_range_touches_only_range() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(
        device,
        BufferInfo::new(BufferKind::Storage, BufferChain::Single, 4, 4),
        &[],
    ).unwrap();

    for i in 0..4u32 {
        buffer.write_value(i, &(i + 10)).unwrap();
    }
    buffer.set_data_range(BufferSlot::Primary, 1, 2).unwrap();

    let bytes = slot_bytes(&buffer, BufferSlot::Primary);
    let words: &[u32] = bytemuck::cast_slice(&bytes[..16]);
    assert_eq!(words, &[0, 11, 12, 0]);
    // Partial upload keeps the mirror dirty
    assert!(buffer.is_host_dirty());
}

#[test]
fn test_set_data_range_out_of_bounds() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Single, 4), &[]).unwrap();
    assert!(buffer.set_data_range(BufferSlot::Primary, 3, 2).unwrap_err().is_contract_violation());
}

#[test]
fn test_set_data_count_uploads_prefix() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(
        device,
        BufferInfo::new(BufferKind::Vertex, BufferChain::Single, 4, 3),
        &[],
    ).unwrap();
    buffer.host_data_mut().copy_from_slice(&[1u8; 12]);
    buffer.set_data_count(BufferSlot::Primary, 2).unwrap();

    let bytes = slot_bytes(&buffer, BufferSlot::Primary);
    assert_eq!(&bytes[..8], &[1u8; 8]);
    assert_eq!(&bytes[8..12], &[0u8; 4]);
}

// ============================================================================
// DOUBLE BUFFER PROTOCOL
// ============================================================================

#[test]
fn test_secondary_upload_then_transfer_reaches_primary() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Double, 8), &[]).unwrap();

    let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    buffer.write_value(2, &m).unwrap();
    buffer.set_data(BufferSlot::Secondary).unwrap();

    // Primary is untouched until the transfer
    assert_ne!(slot_bytes(&buffer, BufferSlot::Primary)[..512], buffer.host_data()[..]);

    buffer.transfer(BufferSlot::Secondary, BufferSlot::Primary).unwrap();
    assert_eq!(slot_bytes(&buffer, BufferSlot::Primary)[..512], buffer.host_data()[..]);
}

#[test]
fn test_transfer_requires_double_and_distinct_slots() {
    let (_mock, device) = mock();
    let mut single = Buffer::new(Arc::clone(&device), uniform_info(BufferChain::Single, 1), &[]).unwrap();
    assert!(single.transfer(BufferSlot::Primary, BufferSlot::Secondary).unwrap_err().is_contract_violation());

    let mut double = Buffer::new(device, uniform_info(BufferChain::Double, 1), &[]).unwrap();
    assert!(double.transfer(BufferSlot::Primary, BufferSlot::Primary).unwrap_err().is_contract_violation());
}

// ============================================================================
// READBACK
// ============================================================================

#[test]
fn test_get_data_requires_modifiable() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Single, 1), &[]).unwrap();
    assert!(buffer.get_data(BufferSlot::Primary).unwrap_err().is_contract_violation());
}

#[test]
fn test_get_data_restores_mirror_from_device() {
    let (_mock, device) = mock();
    let info = uniform_info(BufferChain::Single, 2).modifiable(true);
    let mut buffer = Buffer::new(device, info, &[]).unwrap();

    buffer.write_value(1, &Mat4::IDENTITY).unwrap();
    buffer.set_data(BufferSlot::Primary).unwrap();

    // Scribble over the mirror, then read the device copy back
    buffer.write_value(1, &Mat4::ZERO).unwrap();
    buffer.get_data(BufferSlot::Primary).unwrap();
    assert_eq!(buffer.read_value::<Mat4>(1).unwrap(), Mat4::IDENTITY);
}

#[test]
fn test_get_data_range_returns_requested_bytes() {
    let (_mock, device) = mock();
    let info = BufferInfo::new(BufferKind::Storage, BufferChain::Single, 4, 4).modifiable(true);
    let data: Vec<u8> = bytemuck::cast_slice(&[5u32, 6, 7, 8]).to_vec();
    let mut buffer = Buffer::new(device, info, &data).unwrap();

    let bytes = buffer.get_data_range(BufferSlot::Primary, 2, 2).unwrap().to_vec();
    assert_eq!(bytemuck::cast_slice::<u8, u32>(&bytes), &[7, 8]);
}

// ============================================================================
// RESIZE
// ============================================================================

#[test]
fn test_resize_preserves_leading_contents() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Double, 2), &[]).unwrap();
    let m = Mat4::from_scale(Vec3::splat(2.0));
    buffer.write_value(1, &m).unwrap();
    buffer.set_data(BufferSlot::Primary).unwrap();
    buffer.set_data(BufferSlot::Secondary).unwrap();
    let old_primary = Arc::clone(buffer.device_buffer(BufferSlot::Primary).unwrap());

    buffer.resize(6).unwrap();

    assert_eq!(buffer.element_count(), 6);
    assert_eq!(buffer.generation(), 1);
    assert_eq!(buffer.host_data().len(), 6 * 64);
    assert_eq!(buffer.read_value::<Mat4>(1).unwrap(), m);
    assert_eq!(buffer.read_value::<Mat4>(5).unwrap(), Mat4::ZERO);
    assert!(!Arc::ptr_eq(&old_primary, buffer.device_buffer(BufferSlot::Primary).unwrap()));

    for slot in [BufferSlot::Primary, BufferSlot::Secondary] {
        let bytes = slot_bytes(&buffer, slot);
        assert_eq!(&bytes[64..128], bytemuck::bytes_of(&m));
    }
}

#[test]
fn test_resize_to_zero_is_rejected() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Single, 2), &[]).unwrap();
    assert!(buffer.resize(0).unwrap_err().is_contract_violation());
}

// ============================================================================
// HOST MIRROR
// ============================================================================

#[test]
fn test_write_element_bounds() {
    let (_mock, device) = mock();
    let mut buffer = Buffer::new(device, uniform_info(BufferChain::Single, 2), &[]).unwrap();
    assert!(buffer.write_element(2, &[0u8; 4]).is_err());
    assert!(buffer.write_element(0, &[0u8; 65]).is_err());
    assert!(buffer.write_element(1, &[9u8; 64]).is_ok());
    assert_eq!(buffer.element_bytes(1).unwrap(), &[9u8; 64]);
}

#[test]
fn test_kind_usage_flags() {
    assert!(BufferKind::Uniform.usage().contains(BufferUsage::UNIFORM | BufferUsage::VERTEX));
    assert!(!BufferKind::Uniform.usage().contains(BufferUsage::STORAGE));
    assert!(BufferKind::Index.usage().contains(BufferUsage::INDEX | BufferUsage::TRANSFER_DST));
    assert!(BufferKind::Indirect.usage().contains(BufferUsage::INDIRECT));
    assert_eq!(align_up(0, 4), 0);
    assert_eq!(align_up(13, 4), 16);
}
