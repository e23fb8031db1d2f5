/// Resource-level texture: a device image filled through a staging buffer

use std::sync::Arc;

use crate::device::{BufferDesc, DeviceTexture, Extent2D, GraphicsDevice, TextureDesc, TextureFormat, TextureUsage};
use crate::error::Result;
use crate::{engine_bail_violation, engine_debug};

pub struct Texture {
    texture: Arc<dyn DeviceTexture>,
    format: TextureFormat,
    extent: Extent2D,
}

impl Texture {
    /// Create a sampled texture from tightly packed pixels
    pub fn from_pixels(
        device: &dyn GraphicsDevice,
        pixels: &[u8],
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let desc = TextureDesc {
            width,
            height,
            format,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
            label: "texture".to_string(),
        };
        if width == 0 || height == 0 {
            engine_bail_violation!("lumen::Texture", "Texture extent must be non-zero ({}x{})", width, height);
        }
        if pixels.len() as u64 != desc.byte_size() {
            engine_bail_violation!("lumen::Texture",
                "Pixel data is {} bytes, {}x{} {:?} needs {}",
                pixels.len(), width, height, format, desc.byte_size());
        }

        let texture = device.create_texture(&desc)?;
        let staging = device.create_buffer(&BufferDesc::staging(desc.byte_size()))?;
        staging.write(0, pixels)?;
        device.copy_buffer_to_texture(staging.as_ref(), texture.as_ref())?;

        engine_debug!("lumen::Texture", "Uploaded {}x{} {:?} texture", width, height, format);

        Ok(Self { texture, format, extent: Extent2D::new(width, height) })
    }

    /// Create an empty attachment (offscreen color or depth target)
    pub fn attachment(device: &dyn GraphicsDevice, format: TextureFormat, extent: Extent2D) -> Result<Self> {
        if extent.width == 0 || extent.height == 0 {
            engine_bail_violation!("lumen::Texture",
                "Attachment extent must be non-zero ({}x{})", extent.width, extent.height);
        }
        let usage = if format.is_depth() {
            TextureUsage::DEPTH_ATTACHMENT
        } else {
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLED | TextureUsage::TRANSFER_SRC
        };
        let texture = device.create_texture(&TextureDesc {
            width: extent.width,
            height: extent.height,
            format,
            usage,
            label: "attachment".to_string(),
        })?;
        Ok(Self { texture, format, extent })
    }

    pub fn device_texture(&self) -> &Arc<dyn DeviceTexture> {
        &self.texture
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }
}
