/// Descriptor pools and descriptor sets.
///
/// A DescriptorPool owns a fixed, ordered list of binding declarations, the
/// device layout compiled from them, and room for `max_sets` live sets.
/// A DescriptorSet holds the resources attached to each binding; attaching
/// only records the resource, `update_set` writes the current device
/// handles of every attached resource into the device set.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

use crate::device::{
    AccelerationStructure, BufferUsage, Descriptor, DescriptorKind, DescriptorResource, DescriptorWrite,
    DeviceBuffer, DeviceDescriptorLayout, DeviceDescriptorPool, DeviceDescriptorSet, DeviceTexture,
    GraphicsDevice, TextureUsage,
};
use crate::error::Result;
use crate::resource::{BufferSlot, SharedBuffer, Texture};
use crate::{engine_bail_violation, engine_debug, engine_violation};

/// Descriptor set shared between model pools and pipelines
pub type SharedDescriptorSet = Arc<Mutex<DescriptorSet>>;

/// Identity of a pool (and therefore of its layout)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

// ===== POOL =====

pub struct DescriptorPool {
    id: PoolId,
    device: Arc<dyn GraphicsDevice>,
    descriptors: Vec<Descriptor>,
    layout: Arc<dyn DeviceDescriptorLayout>,
    pool: Arc<dyn DeviceDescriptorPool>,
    max_sets: u32,
    live_sets: Arc<AtomicU32>,
}

impl DescriptorPool {
    pub fn new(device: Arc<dyn GraphicsDevice>, mut descriptors: Vec<Descriptor>, max_sets: u32) -> Result<Self> {
        if descriptors.is_empty() {
            engine_bail_violation!("lumen::DescriptorPool", "Descriptor pool needs at least one descriptor");
        }
        if max_sets == 0 {
            engine_bail_violation!("lumen::DescriptorPool", "Descriptor pool needs max_sets >= 1");
        }

        descriptors.sort_by_key(|d| d.binding);
        if let Some(pair) = descriptors.windows(2).find(|w| w[0].binding == w[1].binding) {
            engine_bail_violation!("lumen::DescriptorPool", "Binding {} declared twice", pair[0].binding);
        }

        let layout = device.create_descriptor_layout(&descriptors)?;
        let pool = device.create_descriptor_pool(layout.as_ref(), max_sets)?;
        let id = PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed));

        engine_debug!("lumen::DescriptorPool", "Created pool {:?} ({} bindings, {} sets)",
            id, descriptors.len(), max_sets);

        Ok(Self {
            id,
            device,
            descriptors,
            layout,
            pool,
            max_sets,
            live_sets: Arc::new(AtomicU32::new(0)),
        })
    }

    /// Allocate a set with this pool's layout
    pub fn create_descriptor_set(&self) -> Result<SharedDescriptorSet> {
        let live = self.live_sets.load(Ordering::Acquire);
        if live >= self.max_sets {
            engine_bail_violation!("lumen::DescriptorPool",
                "Pool {:?} is exhausted ({} of {} sets live)", self.id, live, self.max_sets);
        }

        let set = self.device.allocate_descriptor_set(self.pool.as_ref(), self.layout.as_ref())?;
        self.live_sets.fetch_add(1, Ordering::AcqRel);

        Ok(Arc::new(Mutex::new(DescriptorSet {
            set,
            device: Arc::clone(&self.device),
            pool_id: self.id,
            descriptors: self.descriptors.clone(),
            layout: Arc::clone(&self.layout),
            _pool: Arc::clone(&self.pool),
            live_sets: Arc::clone(&self.live_sets),
            bound: BTreeMap::new(),
            written: BTreeMap::new(),
            pending: true,
        })))
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn layout(&self) -> &Arc<dyn DeviceDescriptorLayout> {
        &self.layout
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Sets allocated from this pool and not yet dropped
    pub fn live_sets(&self) -> u32 {
        self.live_sets.load(Ordering::Acquire)
    }
}

// ===== SET =====

/// Resource attached to one binding
#[derive(Clone)]
pub enum BoundResource {
    Buffer { buffer: SharedBuffer, slot: BufferSlot },
    Texture(Arc<Texture>),
    AccelerationStructure(Arc<dyn AccelerationStructure>),
}

enum Resolved {
    Buffer { buffer: Arc<dyn DeviceBuffer>, range: u64, generation: u64 },
    Texture(Arc<dyn DeviceTexture>),
    AccelerationStructure(Arc<dyn AccelerationStructure>),
}

pub struct DescriptorSet {
    // Declared first so the device set is freed before the pool reference drops
    set: Box<dyn DeviceDescriptorSet>,
    device: Arc<dyn GraphicsDevice>,
    pool_id: PoolId,
    descriptors: Vec<Descriptor>,
    layout: Arc<dyn DeviceDescriptorLayout>,
    _pool: Arc<dyn DeviceDescriptorPool>,
    live_sets: Arc<AtomicU32>,
    bound: BTreeMap<u32, BoundResource>,
    /// Buffer generation last written per binding
    written: BTreeMap<u32, u64>,
    pending: bool,
}

impl DescriptorSet {
    fn declared(&self, binding: u32) -> Result<Descriptor> {
        self.descriptors
            .iter()
            .find(|d| d.binding == binding)
            .copied()
            .ok_or_else(|| engine_violation!("lumen::DescriptorSet",
                "Binding {} is not declared in the pool layout", binding))
    }

    /// Attach one slot of a buffer to a uniform or storage binding
    pub fn attach_buffer(&mut self, binding: u32, buffer: &SharedBuffer, slot: BufferSlot) -> Result<()> {
        let descriptor = self.declared(binding)?;
        let required = match descriptor.kind {
            DescriptorKind::UniformBuffer => BufferUsage::UNIFORM,
            DescriptorKind::StorageBuffer => BufferUsage::STORAGE,
            other => {
                engine_bail_violation!("lumen::DescriptorSet",
                    "Binding {} expects {:?}, a buffer was attached", binding, other);
            }
        };

        {
            let guard = buffer.lock();
            if !guard.usage().contains(required) {
                engine_bail_violation!("lumen::DescriptorSet",
                    "Binding {} is {:?} but the buffer is a {:?} buffer",
                    binding, descriptor.kind, guard.kind());
            }
            guard.slot(slot)?;
        }

        self.bound.insert(binding, BoundResource::Buffer { buffer: Arc::clone(buffer), slot });
        self.pending = true;
        Ok(())
    }

    /// Attach a texture to a sampled or storage image binding
    pub fn attach_texture(&mut self, binding: u32, texture: &Arc<Texture>) -> Result<()> {
        let descriptor = self.declared(binding)?;
        let required = match descriptor.kind {
            DescriptorKind::SampledImage => TextureUsage::SAMPLED,
            DescriptorKind::StorageImage => TextureUsage::STORAGE,
            other => {
                engine_bail_violation!("lumen::DescriptorSet",
                    "Binding {} expects {:?}, a texture was attached", binding, other);
            }
        };
        if !texture.device_texture().usage().contains(required) {
            engine_bail_violation!("lumen::DescriptorSet",
                "Binding {} is {:?} but the texture lacks {:?} usage", binding, descriptor.kind, required);
        }

        self.bound.insert(binding, BoundResource::Texture(Arc::clone(texture)));
        self.pending = true;
        Ok(())
    }

    /// Attach an acceleration structure built outside this layer
    pub fn attach_acceleration_structure(
        &mut self,
        binding: u32,
        structure: Arc<dyn AccelerationStructure>,
    ) -> Result<()> {
        let descriptor = self.declared(binding)?;
        if descriptor.kind != DescriptorKind::AccelerationStructure {
            engine_bail_violation!("lumen::DescriptorSet",
                "Binding {} expects {:?}, an acceleration structure was attached", binding, descriptor.kind);
        }
        self.bound.insert(binding, BoundResource::AccelerationStructure(structure));
        self.pending = true;
        Ok(())
    }

    /// Write the current device handle of every attached resource.
    ///
    /// Calling it twice in a row leaves the device set in the same state.
    pub fn update_set(&mut self) -> Result<()> {
        let mut resolved = Vec::with_capacity(self.bound.len());
        for (&binding, resource) in &self.bound {
            let kind = self.declared(binding)?.kind;
            let entry = match resource {
                BoundResource::Buffer { buffer, slot } => {
                    let guard = buffer.lock();
                    Resolved::Buffer {
                        buffer: Arc::clone(guard.device_buffer(*slot)?),
                        range: guard.info().byte_len(),
                        generation: guard.generation(),
                    }
                }
                BoundResource::Texture(texture) => Resolved::Texture(Arc::clone(texture.device_texture())),
                BoundResource::AccelerationStructure(structure) => {
                    Resolved::AccelerationStructure(Arc::clone(structure))
                }
            };
            resolved.push((binding, kind, entry));
        }

        let writes: Vec<DescriptorWrite> = resolved
            .iter()
            .map(|(binding, kind, entry)| DescriptorWrite {
                binding: *binding,
                kind: *kind,
                resource: match entry {
                    Resolved::Buffer { buffer, range, .. } => DescriptorResource::Buffer {
                        buffer: buffer.as_ref(),
                        offset: 0,
                        range: *range,
                    },
                    Resolved::Texture(texture) => DescriptorResource::Texture(texture.as_ref()),
                    Resolved::AccelerationStructure(structure) => {
                        DescriptorResource::AccelerationStructure(structure.as_ref())
                    }
                },
            })
            .collect();

        if !writes.is_empty() {
            self.device.update_descriptor_set(self.set.as_ref(), &writes)?;
        }

        self.written = resolved
            .iter()
            .filter_map(|(binding, _, entry)| match entry {
                Resolved::Buffer { generation, .. } => Some((*binding, *generation)),
                _ => None,
            })
            .collect();
        self.pending = false;
        Ok(())
    }

    /// Every declared binding has a resource attached
    pub fn is_complete(&self) -> bool {
        self.descriptors.iter().all(|d| self.bound.contains_key(&d.binding))
    }

    /// An attached buffer was reallocated since the last update
    pub fn is_stale(&self) -> bool {
        self.bound.iter().any(|(binding, resource)| match resource {
            BoundResource::Buffer { buffer, .. } => {
                self.written.get(binding) != Some(&buffer.lock().generation())
            }
            _ => false,
        })
    }

    /// `update_set` must run before the set can be bound
    pub fn needs_update(&self) -> bool {
        self.pending || self.is_stale()
    }

    /// Complete and up to date: safe to bind
    pub fn is_ready(&self) -> bool {
        self.is_complete() && !self.needs_update()
    }

    pub fn device_set(&self) -> &dyn DeviceDescriptorSet {
        self.set.as_ref()
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool_id
    }

    pub fn layout(&self) -> &Arc<dyn DeviceDescriptorLayout> {
        &self.layout
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn bound_resource(&self, binding: u32) -> Option<&BoundResource> {
        self.bound.get(&binding)
    }
}

impl Drop for DescriptorSet {
    fn drop(&mut self) {
        self.live_sets.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[path = "descriptor_tests.rs"]
mod tests;
