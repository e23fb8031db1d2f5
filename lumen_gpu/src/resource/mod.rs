/// Resource layer: buffers, textures, descriptors and model pools built on a GraphicsDevice

mod buffer;
mod descriptor;
mod indirect;
mod model_pool;
mod texture;

pub use buffer::{
    align_up, Buffer, BufferChain, BufferData, BufferInfo, BufferKind, BufferSlot, SharedBuffer,
};
pub use descriptor::{BoundResource, DescriptorPool, DescriptorSet, PoolId, SharedDescriptorSet};
pub use indirect::{
    padded_len, DrawIndexedIndirectCommand, DrawIndirectCommand, IndirectCommands, INDIRECT_ARRAY_PADDING,
};
pub use model_pool::{Model, ModelPool, SharedModelPool};
pub use texture::Texture;
