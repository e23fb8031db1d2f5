/// State shared by every pipeline variant: build state, error flag,
/// descriptor layouts and sets, and the compiled device pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::device::{CommandList, DeviceDescriptorLayout, DevicePipeline, GraphicsDevice};
use crate::error::Result;
use crate::pipeline::PipelineState;
use crate::resource::{DescriptorPool, PoolId, SharedDescriptorSet};
use crate::{engine_bail_violation, engine_debug, engine_error};

struct LayoutSlot {
    pool_id: PoolId,
    layout: Arc<dyn DeviceDescriptorLayout>,
}

pub(crate) struct PipelineCore {
    device: Arc<dyn GraphicsDevice>,
    source: &'static str,
    state: PipelineState,
    has_error: bool,
    /// Recorded commands are out of date
    changed: bool,
    priority: i32,
    layouts: BTreeMap<u32, LayoutSlot>,
    sets: BTreeMap<u32, SharedDescriptorSet>,
    device_pipeline: Option<Arc<dyn DevicePipeline>>,
}

impl PipelineCore {
    pub(crate) fn new(device: Arc<dyn GraphicsDevice>, source: &'static str) -> Self {
        Self {
            device,
            source,
            state: PipelineState::Unbuilt,
            has_error: false,
            changed: true,
            priority: 0,
            layouts: BTreeMap::new(),
            sets: BTreeMap::new(),
            device_pipeline: None,
        }
    }

    pub(crate) fn device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.device
    }

    pub(crate) fn state(&self) -> PipelineState {
        self.state
    }

    pub(crate) fn has_error(&self) -> bool {
        self.has_error
    }

    pub(crate) fn priority(&self) -> i32 {
        self.priority
    }

    pub(crate) fn set_priority(&mut self, priority: i32) {
        self.priority = priority;
        self.changed = true;
    }

    /// Configuration changed: a built pipeline needs a rebuild
    pub(crate) fn mark_dirty(&mut self) {
        if self.state == PipelineState::Built {
            self.state = PipelineState::Dirty;
        }
        self.changed = true;
    }

    /// Recorded commands are stale but the device pipeline is still valid
    pub(crate) fn mark_changed(&mut self) {
        self.changed = true;
    }

    #[cfg(test)]
    pub(crate) fn device_pipeline(&self) -> Option<&Arc<dyn DevicePipeline>> {
        self.device_pipeline.as_ref()
    }

    /// Consume the own change flag
    pub(crate) fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    // ===== DESCRIPTORS =====

    pub(crate) fn attach_descriptor_pool(&mut self, pool: &DescriptorPool) -> Result<u32> {
        let index = self.layouts.keys().next_back().map_or(0, |last| last + 1);
        self.layouts.insert(index, LayoutSlot { pool_id: pool.id(), layout: Arc::clone(pool.layout()) });
        self.mark_dirty();
        Ok(index)
    }

    pub(crate) fn attach_descriptor_set(&mut self, set_index: u32, set: SharedDescriptorSet) -> Result<()> {
        {
            let guard = set.lock();
            self.layouts.entry(set_index).or_insert_with(|| LayoutSlot {
                pool_id: guard.pool_id(),
                layout: Arc::clone(guard.layout()),
            });
        }
        self.sets.insert(set_index, set);
        self.mark_dirty();
        Ok(())
    }

    /// Layouts in set order, checked against the attached sets.
    ///
    /// `extra` holds sets bound by someone else (model pools) with this
    /// pipeline's layout; they declare their index when nothing else does.
    fn resolve_layouts(&self, extra: &[(u32, SharedDescriptorSet)]) -> Result<Vec<Arc<dyn DeviceDescriptorLayout>>> {
        let mut extra_layouts: BTreeMap<u32, LayoutSlot> = BTreeMap::new();
        let attached = self.sets.iter().map(|(&index, set)| (index, set));
        let pooled = extra.iter().map(|(index, set)| (*index, set));

        for (index, set) in attached.chain(pooled) {
            let guard = set.lock();
            let declared = self.layouts.get(&index).or_else(|| extra_layouts.get(&index));
            match declared {
                Some(slot) if slot.pool_id != guard.pool_id() => {
                    engine_bail_violation!(self.source,
                        "Set {} comes from pool {:?} but the layout was declared by pool {:?}",
                        index, guard.pool_id(), slot.pool_id);
                }
                Some(_) => {}
                None => {
                    extra_layouts.insert(index, LayoutSlot {
                        pool_id: guard.pool_id(),
                        layout: Arc::clone(guard.layout()),
                    });
                }
            }
        }

        let mut merged: BTreeMap<u32, Arc<dyn DeviceDescriptorLayout>> = extra_layouts
            .into_iter()
            .map(|(index, slot)| (index, slot.layout))
            .collect();
        for (&index, slot) in &self.layouts {
            merged.insert(index, Arc::clone(&slot.layout));
        }
        let limit = self.device.limits().max_bound_descriptor_sets;
        if merged.len() > limit as usize {
            engine_bail_violation!(self.source,
                "Pipeline layout uses {} descriptor sets but the device binds at most {}", merged.len(), limit);
        }
        for (expected, &index) in merged.keys().enumerate() {
            if index != expected as u32 {
                engine_bail_violation!(self.source,
                    "Descriptor set indices must be contiguous from 0 (missing set {})", expected);
            }
        }
        Ok(merged.into_values().collect())
    }

    /// Write every attached set plus `extra`
    fn update_all_sets(&self, extra: &[(u32, SharedDescriptorSet)]) -> Result<()> {
        for set in self.sets.values().chain(extra.iter().map(|(_, set)| set)) {
            set.lock().update_set()?;
        }
        Ok(())
    }

    /// Update sets whose attachments changed; returns whether any was updated
    pub(crate) fn refresh_sets(&mut self) -> Result<bool> {
        let mut updated = false;
        for set in self.sets.values() {
            let mut set = set.lock();
            if set.needs_update() {
                set.update_set()?;
                updated = true;
            }
        }
        if updated {
            self.changed = true;
        }
        Ok(updated)
    }

    // ===== BUILD =====

    pub(crate) fn begin_build(&self) -> Result<()> {
        if self.state != PipelineState::Unbuilt {
            engine_bail_violation!(self.source, "build() on a pipeline that is already built (use rebuild)");
        }
        Ok(())
    }

    /// Drop the device pipeline ahead of a rebuild
    pub(crate) fn begin_rebuild(&mut self) -> Result<()> {
        if self.state == PipelineState::Unbuilt {
            engine_bail_violation!(self.source, "rebuild() on a pipeline that was never built");
        }
        self.device_pipeline = None;
        Ok(())
    }

    /// Resolve layouts and write every set; the variant creates the device pipeline next
    pub(crate) fn prepare(&self, extra: &[(u32, SharedDescriptorSet)]) -> Result<Vec<Arc<dyn DeviceDescriptorLayout>>> {
        let layouts = self.resolve_layouts(extra)?;
        self.update_all_sets(extra)?;
        Ok(layouts)
    }

    /// Record the outcome of a build or rebuild
    pub(crate) fn finish_build(&mut self, result: Result<Arc<dyn DevicePipeline>>) -> Result<()> {
        match result {
            Ok(pipeline) => {
                self.device_pipeline = Some(pipeline);
                self.state = PipelineState::Built;
                self.has_error = false;
                self.changed = true;
                engine_debug!(self.source, "Pipeline built ({} descriptor sets)", self.layouts.len());
                Ok(())
            }
            Err(e) => {
                self.device_pipeline = None;
                self.state = PipelineState::Unbuilt;
                self.has_error = true;
                self.changed = true;
                engine_error!(self.source, "Pipeline build failed: {}", e);
                Err(e)
            }
        }
    }

    // ===== RECORD =====

    /// Bind the device pipeline and every pipeline-level set
    pub(crate) fn bind(&self, cmd: &mut dyn CommandList) -> Result<&Arc<dyn DevicePipeline>> {
        let pipeline = match (&self.device_pipeline, self.state) {
            (Some(pipeline), PipelineState::Built) => pipeline,
            (_, state) => {
                engine_bail_violation!(self.source, "Recording a pipeline in state {:?}", state);
            }
        };

        cmd.bind_pipeline(pipeline.as_ref())?;
        for (&index, set) in &self.sets {
            let set = set.lock();
            if !set.is_ready() {
                engine_bail_violation!(self.source,
                    "Descriptor set {} is not ready (attach every binding and run update_set)", index);
            }
            cmd.bind_descriptor_sets(pipeline.as_ref(), index, &[set.device_set()])?;
        }
        Ok(pipeline)
    }
}
