/// Device texture trait and formats

use std::any::Any;
use bitflags::bitflags;

/// Texel formats supported by the layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R32_SFLOAT,
    R32G32B32A32_SFLOAT,
    D32_SFLOAT,
}

impl TextureFormat {
    /// Bytes per texel
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::R32_SFLOAT
            | TextureFormat::D32_SFLOAT => 4,
            TextureFormat::R32G32B32A32_SFLOAT => 16,
        }
    }

    /// Whether this is a depth format
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::D32_SFLOAT)
    }
}

bitflags! {
    /// How a device texture may be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED          = 1 << 0;
        const STORAGE          = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC     = 1 << 4;
        const TRANSFER_DST     = 1 << 5;
    }
}

/// Descriptor for creating a device texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub label: String,
}

impl TextureDesc {
    /// Size of tightly packed texel data in bytes
    pub fn byte_size(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// A device image with its default view
pub trait DeviceTexture: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn format(&self) -> TextureFormat;
    fn usage(&self) -> TextureUsage;
    /// Downcast support for backends
    fn as_any(&self) -> &dyn Any;
}
