/// Pool of models sharing one mesh, drawn with a single indirect command.
///
/// Every model owns one slot index. The index selects its record in the
/// indirect array (`first_instance == index`) and its element in every
/// attached per-instance buffer. Destroyed models leave a hole whose record
/// draws zero instances; the next `create_model` fills the lowest hole.

use std::collections::BTreeMap;
use std::sync::Arc;
use bytemuck::Pod;
use glam::Mat4;
use parking_lot::Mutex;

use crate::device::{BufferUsage, CommandList, DevicePipeline, GraphicsDevice, IndexType};
use crate::error::Result;
use crate::resource::{
    padded_len, Buffer, BufferChain, BufferInfo, BufferKind, BufferSlot, IndirectCommands,
    SharedBuffer, SharedDescriptorSet,
};
use crate::utils::{ChangeCursor, ChangeTracker, SlotAllocator};
use crate::{engine_bail_violation, engine_debug, engine_trace, engine_violation};

/// Model pool shared between the application and graphics pipelines
pub type SharedModelPool = Arc<Mutex<ModelPool>>;

/// Capacity after growing a full pool so it holds slot `index`, or `None` past `u32::MAX`
fn grown_capacity(capacity: u32, index: u32) -> Option<u32> {
    let needed = index.checked_add(1)?;
    Some(capacity.saturating_mul(2).max(needed))
}

/// Handle to one model of a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Model {
    index: u32,
    generation: u32,
}

impl Model {
    /// Slot index (record and per-instance element)
    pub fn index(&self) -> u32 {
        self.index
    }
}

pub struct ModelPool {
    device: Arc<dyn GraphicsDevice>,
    vertex_buffer: SharedBuffer,
    index_buffer: Option<SharedBuffer>,
    index_type: IndexType,
    instance_buffers: BTreeMap<u32, SharedBuffer>,
    descriptor_sets: BTreeMap<u32, SharedDescriptorSet>,
    slots: SlotAllocator,
    generations: Vec<u32>,
    capacity: u32,
    /// Vertices (or indices) drawn per model
    element_count: u32,
    commands: IndirectCommands,
    indirect: Option<Buffer>,
    indirect_dirty: bool,
    changes: ChangeTracker,
}

impl ModelPool {
    pub fn new(
        device: Arc<dyn GraphicsDevice>,
        vertex_buffer: SharedBuffer,
        index_buffer: Option<SharedBuffer>,
        capacity: u32,
    ) -> Result<Self> {
        if capacity == 0 {
            engine_bail_violation!("lumen::ModelPool", "Model pool capacity must be non-zero");
        }

        let vertex_count = {
            let vertex = vertex_buffer.lock();
            if vertex.kind() != BufferKind::Vertex {
                engine_bail_violation!("lumen::ModelPool",
                    "Expected a Vertex buffer, got {:?}", vertex.kind());
            }
            vertex.element_count()
        };

        let (element_count, index_type, commands) = match &index_buffer {
            Some(index) => {
                let index = index.lock();
                if index.kind() != BufferKind::Index {
                    engine_bail_violation!("lumen::ModelPool",
                        "Expected an Index buffer, got {:?}", index.kind());
                }
                let index_type = match index.element_size() {
                    2 => IndexType::U16,
                    4 => IndexType::U32,
                    other => {
                        engine_bail_violation!("lumen::ModelPool",
                            "Index elements must be 2 or 4 bytes (got {})", other);
                    }
                };
                (index.element_count(), index_type, IndirectCommands::Indexed(Vec::new()))
            }
            None => (vertex_count, IndexType::U32, IndirectCommands::Vertex(Vec::new())),
        };

        engine_debug!("lumen::ModelPool", "Created {} model pool (capacity {}, {} elements per model)",
            if commands.is_indexed() { "indexed" } else { "vertex" }, capacity, element_count);

        Ok(Self {
            device,
            vertex_buffer,
            index_buffer,
            index_type,
            instance_buffers: BTreeMap::new(),
            descriptor_sets: BTreeMap::new(),
            slots: SlotAllocator::new(),
            generations: Vec::new(),
            capacity,
            element_count,
            commands,
            indirect: None,
            indirect_dirty: true,
            changes: ChangeTracker::new(),
        })
    }

    /// Wrap into a [`SharedModelPool`]
    pub fn into_shared(self) -> SharedModelPool {
        Arc::new(Mutex::new(self))
    }

    // ===== MODELS =====

    /// Take the lowest free slot, growing the pool when it is full
    pub fn create_model(&mut self) -> Result<Model> {
        let index = self.slots.alloc();
        if index >= self.capacity {
            let grown = match grown_capacity(self.capacity, index) {
                Some(capacity) => self.grow(capacity),
                None => Err(engine_violation!("lumen::ModelPool",
                    "Model pool cannot grow past {} slots", self.capacity)),
            };
            if let Err(e) = grown {
                self.slots.free(index);
                return Err(e);
            }
        }

        if self.generations.len() <= index as usize {
            self.generations.resize(index as usize + 1, 0);
        }
        let generation = self.generations[index as usize].wrapping_add(1);
        self.generations[index as usize] = generation;

        if self.commands.len() <= index as usize {
            self.commands.resize(index as usize + 1);
        }
        self.commands.set_slot(index, self.element_count, true);
        self.indirect_dirty = true;
        self.changes.mark();

        engine_trace!("lumen::ModelPool", "Created model {} (generation {})", index, generation);
        Ok(Model { index, generation })
    }

    /// Free the model's slot; its record stops drawing
    pub fn destroy_model(&mut self, model: Model) -> Result<()> {
        self.validate(&model)?;
        self.slots.free(model.index);
        self.commands.set_slot(model.index, self.element_count, false);
        self.indirect_dirty = true;
        self.changes.mark();
        engine_trace!("lumen::ModelPool", "Destroyed model {}", model.index);
        Ok(())
    }

    /// Enable or disable drawing `model` without releasing its slot.
    ///
    /// Only the indirect record changes, so already recorded commands stay valid.
    pub fn set_model_active(&mut self, model: &Model, active: bool) -> Result<()> {
        self.validate(model)?;
        if self.is_active(model) == active {
            return Ok(());
        }
        self.commands.set_slot(model.index, self.element_count, active);
        self.indirect_dirty = true;
        engine_trace!("lumen::ModelPool", "Model {} active: {}", model.index, active);
        Ok(())
    }

    /// Whether `model` is live and drawn
    pub fn is_active(&self, model: &Model) -> bool {
        self.is_live(model) && self.commands.instance_count(model.index) == Some(1)
    }

    /// Whether `model` still refers to a live slot of this pool
    pub fn is_live(&self, model: &Model) -> bool {
        self.slots.is_allocated(model.index)
            && self.generations.get(model.index as usize) == Some(&model.generation)
    }

    fn validate(&self, model: &Model) -> Result<()> {
        if !self.is_live(model) {
            engine_bail_violation!("lumen::ModelPool",
                "Model {} (generation {}) is not live in this pool", model.index, model.generation);
        }
        Ok(())
    }

    fn grow(&mut self, new_capacity: u32) -> Result<()> {
        for buffer in self.instance_buffers.values() {
            let mut buffer = buffer.lock();
            if buffer.element_count() < new_capacity {
                buffer.resize(new_capacity)?;
            }
        }
        engine_debug!("lumen::ModelPool", "Grew model pool {} -> {}", self.capacity, new_capacity);
        self.capacity = new_capacity;
        self.changes.mark();
        Ok(())
    }

    // ===== PER-INSTANCE DATA =====

    fn instance_buffer_at(&self, binding: u32) -> Result<&SharedBuffer> {
        match self.instance_buffers.get(&binding) {
            Some(buffer) => Ok(buffer),
            None => {
                engine_bail_violation!("lumen::ModelPool", "No per-instance buffer at binding {}", binding);
            }
        }
    }

    /// Write the model's element of the buffer at `binding` (host mirror only)
    pub fn set_model_data(&mut self, model: &Model, binding: u32, bytes: &[u8]) -> Result<()> {
        self.validate(model)?;
        self.instance_buffer_at(binding)?.lock().write_element(model.index, bytes)
    }

    pub fn set_model_value<T: Pod>(&mut self, model: &Model, binding: u32, value: &T) -> Result<()> {
        self.set_model_data(model, binding, bytemuck::bytes_of(value))
    }

    pub fn set_model_transform(&mut self, model: &Model, binding: u32, transform: Mat4) -> Result<()> {
        self.set_model_value(model, binding, &transform)
    }

    /// Host mirror bytes of the model's element at `binding`
    pub fn model_data(&self, model: &Model, binding: u32) -> Result<Vec<u8>> {
        self.validate(model)?;
        let buffer = self.instance_buffer_at(binding)?.lock();
        Ok(buffer.element_bytes(model.index)?.to_vec())
    }

    pub fn model_value<T: Pod>(&self, model: &Model, binding: u32) -> Result<T> {
        self.validate(model)?;
        self.instance_buffer_at(binding)?.lock().read_value(model.index)
    }

    // ===== ATTACH =====

    /// Register a per-instance vertex stream at `binding` (0 is the mesh)
    pub fn attach_buffer(&mut self, binding: u32, buffer: SharedBuffer) -> Result<()> {
        if binding == 0 {
            engine_bail_violation!("lumen::ModelPool", "Binding 0 is reserved for the vertex buffer");
        }
        {
            let mut guard = buffer.lock();
            if !guard.usage().contains(BufferUsage::VERTEX) {
                engine_bail_violation!("lumen::ModelPool",
                    "{:?} buffers cannot be bound as a per-instance stream", guard.kind());
            }
            if guard.element_count() < self.capacity {
                guard.resize(self.capacity)?;
            }
        }
        self.instance_buffers.insert(binding, buffer);
        self.changes.mark();
        Ok(())
    }

    /// Register a descriptor set bound at `set_index` when the pool is drawn
    pub fn attach_descriptor_set(&mut self, set_index: u32, set: SharedDescriptorSet) {
        self.descriptor_sets.insert(set_index, set);
        self.changes.mark();
    }

    /// Vertices drawn per model in a non-indexed pool
    pub fn set_vertex_draw_count(&mut self, count: u32) -> Result<()> {
        if self.commands.is_indexed() {
            engine_bail_violation!("lumen::ModelPool", "Indexed pools draw the whole index buffer");
        }
        self.element_count = count;
        self.commands.set_element_count(count);
        self.indirect_dirty = true;
        Ok(())
    }

    // ===== FRAME =====

    /// Push pending host changes to the device
    pub fn flush(&mut self) -> Result<()> {
        if self.indirect_dirty {
            self.upload_indirect()?;
        }

        let streams = std::iter::once(&self.vertex_buffer)
            .chain(self.index_buffer.iter())
            .chain(self.instance_buffers.values());
        for buffer in streams {
            let mut buffer = buffer.lock();
            if !buffer.is_host_dirty() {
                continue;
            }
            match buffer.chain() {
                BufferChain::Double => {
                    buffer.set_data(BufferSlot::Secondary)?;
                    buffer.transfer(BufferSlot::Secondary, BufferSlot::Primary)?;
                }
                BufferChain::Single => buffer.set_data(BufferSlot::Primary)?,
            }
        }
        Ok(())
    }

    fn upload_indirect(&mut self) -> Result<()> {
        let records = padded_len(self.commands.len() as u32);
        let stride = self.commands.stride() as u64;

        let reallocate = self.indirect.as_ref().map_or(true, |b| b.element_count() != records);
        if reallocate {
            let info = BufferInfo::new(BufferKind::Indirect, BufferChain::Single, stride, records);
            self.indirect = Some(Buffer::new(Arc::clone(&self.device), info, &[])?);
            // Recorded draws point at the old allocation
            self.changes.mark();
        }

        if let Some(indirect) = self.indirect.as_mut() {
            let bytes = self.commands.as_bytes();
            let host = indirect.host_data_mut();
            host[..bytes.len()].copy_from_slice(bytes);
            host[bytes.len()..].fill(0);
            indirect.set_data(BufferSlot::Primary)?;
        }
        self.indirect_dirty = false;
        Ok(())
    }

    /// Edge-triggered structural change check for one poller
    pub fn has_changed(&self, cursor: &mut ChangeCursor) -> bool {
        self.changes.poll(cursor)
    }

    /// Bind the pool's sets and streams and draw every record.
    ///
    /// Returns the number of draw commands emitted.
    pub fn record(&self, cmd: &mut dyn CommandList, pipeline: &dyn DevicePipeline) -> Result<u32> {
        if self.slots.is_empty() {
            return Ok(0);
        }
        if self.indirect_dirty {
            engine_bail_violation!("lumen::ModelPool", "Model pool has unflushed changes");
        }
        let indirect = match &self.indirect {
            Some(indirect) => indirect,
            None => engine_bail_violation!("lumen::ModelPool", "Model pool was never flushed"),
        };

        for (&set_index, set) in &self.descriptor_sets {
            let set = set.lock();
            if !set.is_ready() {
                engine_bail_violation!("lumen::ModelPool",
                    "Descriptor set {} is not ready (attach every binding and run update_set)", set_index);
            }
            cmd.bind_descriptor_sets(pipeline, set_index, &[set.device_set()])?;
        }

        {
            let vertex = self.vertex_buffer.lock();
            cmd.bind_vertex_buffer(0, vertex.device_buffer(BufferSlot::Primary)?.as_ref(), 0)?;
        }
        for (&binding, buffer) in &self.instance_buffers {
            let buffer = buffer.lock();
            cmd.bind_vertex_buffer(binding, buffer.device_buffer(BufferSlot::Primary)?.as_ref(), 0)?;
        }
        if let Some(index) = &self.index_buffer {
            let index = index.lock();
            cmd.bind_index_buffer(index.device_buffer(BufferSlot::Primary)?.as_ref(), 0, self.index_type)?;
        }

        let draws = self.commands.len() as u32;
        let stride = self.commands.stride();
        let records = indirect.device_buffer(BufferSlot::Primary)?;
        let indexed = self.commands.is_indexed();

        if self.device.limits().multi_draw_indirect {
            if indexed {
                cmd.draw_indexed_indirect(records.as_ref(), 0, draws, stride)?;
            } else {
                cmd.draw_indirect(records.as_ref(), 0, draws, stride)?;
            }
            return Ok(1);
        }

        for i in 0..draws {
            let offset = i as u64 * stride as u64;
            if indexed {
                cmd.draw_indexed_indirect(records.as_ref(), offset, 1, stride)?;
            } else {
                cmd.draw_indirect(records.as_ref(), offset, 1, stride)?;
            }
        }
        Ok(draws)
    }

    // ===== ACCESSORS =====

    pub fn vertex_buffer(&self) -> &SharedBuffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> Option<&SharedBuffer> {
        self.index_buffer.as_ref()
    }

    pub fn instance_buffer(&self, binding: u32) -> Option<&SharedBuffer> {
        self.instance_buffers.get(&binding)
    }

    pub fn descriptor_set(&self, set_index: u32) -> Option<&SharedDescriptorSet> {
        self.descriptor_sets.get(&set_index)
    }

    /// Pool-wide sets keyed by set index
    pub fn descriptor_sets(&self) -> &BTreeMap<u32, SharedDescriptorSet> {
        &self.descriptor_sets
    }

    /// Live models
    pub fn live_count(&self) -> u32 {
        self.slots.len()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn indirect_commands(&self) -> &IndirectCommands {
        &self.commands
    }

    /// Device copy of the indirect array (after the first flush)
    pub fn indirect_buffer(&self) -> Option<&Buffer> {
        self.indirect.as_ref()
    }

    pub fn is_indexed(&self) -> bool {
        self.commands.is_indexed()
    }

    /// Element type the index buffer is bound with
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }
}

#[cfg(test)]
#[path = "model_pool_tests.rs"]
mod tests;
