/// Indirect draw records, one per model slot

use bytemuck::{Pod, Zeroable};

/// Device indirect arrays are sized in steps of this many records
pub const INDIRECT_ARRAY_PADDING: u32 = 16;

/// Record count for `len` live slots, rounded up to the padding step
pub fn padded_len(len: u32) -> u32 {
    len.div_ceil(INDIRECT_ARRAY_PADDING).max(1) * INDIRECT_ARRAY_PADDING
}

/// Non-indexed draw record (matches VkDrawIndirectCommand)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Indexed draw record (matches VkDrawIndexedIndirectCommand)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// Host-side indirect array; the variant follows whether the pool has an index buffer
#[derive(Debug, Clone, PartialEq)]
pub enum IndirectCommands {
    Indexed(Vec<DrawIndexedIndirectCommand>),
    Vertex(Vec<DrawIndirectCommand>),
}

impl IndirectCommands {
    pub fn len(&self) -> usize {
        match self {
            IndirectCommands::Indexed(v) => v.len(),
            IndirectCommands::Vertex(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, IndirectCommands::Indexed(_))
    }

    /// Byte stride of one record
    pub fn stride(&self) -> u32 {
        match self {
            IndirectCommands::Indexed(_) => std::mem::size_of::<DrawIndexedIndirectCommand>() as u32,
            IndirectCommands::Vertex(_) => std::mem::size_of::<DrawIndirectCommand>() as u32,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndirectCommands::Indexed(v) => bytemuck::cast_slice(v),
            IndirectCommands::Vertex(v) => bytemuck::cast_slice(v),
        }
    }

    /// Grow (or shrink) to `len` records; new records draw nothing
    pub fn resize(&mut self, len: usize) {
        match self {
            IndirectCommands::Indexed(v) => v.resize(len, DrawIndexedIndirectCommand::default()),
            IndirectCommands::Vertex(v) => v.resize(len, DrawIndirectCommand::default()),
        }
    }

    /// Point record `slot` at the whole mesh with one instance (`live`) or none
    pub fn set_slot(&mut self, slot: u32, element_count: u32, live: bool) {
        let instance_count = live as u32;
        match self {
            IndirectCommands::Indexed(v) => {
                if let Some(record) = v.get_mut(slot as usize) {
                    *record = DrawIndexedIndirectCommand {
                        index_count: element_count,
                        instance_count,
                        first_index: 0,
                        vertex_offset: 0,
                        first_instance: slot,
                    };
                }
            }
            IndirectCommands::Vertex(v) => {
                if let Some(record) = v.get_mut(slot as usize) {
                    *record = DrawIndirectCommand {
                        vertex_count: element_count,
                        instance_count,
                        first_vertex: 0,
                        first_instance: slot,
                    };
                }
            }
        }
    }

    /// Instance count of record `slot` (0 for holes)
    pub fn instance_count(&self, slot: u32) -> Option<u32> {
        match self {
            IndirectCommands::Indexed(v) => v.get(slot as usize).map(|r| r.instance_count),
            IndirectCommands::Vertex(v) => v.get(slot as usize).map(|r| r.instance_count),
        }
    }

    /// Set the mesh element count on every live record
    pub fn set_element_count(&mut self, count: u32) {
        match self {
            IndirectCommands::Indexed(v) => v.iter_mut().for_each(|r| r.index_count = count),
            IndirectCommands::Vertex(v) => v.iter_mut().for_each(|r| r.vertex_count = count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_layouts() {
        assert_eq!(std::mem::size_of::<DrawIndirectCommand>(), 16);
        assert_eq!(std::mem::size_of::<DrawIndexedIndirectCommand>(), 20);
        assert_eq!(IndirectCommands::Vertex(Vec::new()).stride(), 16);
        assert_eq!(IndirectCommands::Indexed(Vec::new()).stride(), 20);
    }

    #[test]
    fn test_padded_len() {
        assert_eq!(padded_len(0), 16);
        assert_eq!(padded_len(1), 16);
        assert_eq!(padded_len(16), 16);
        assert_eq!(padded_len(17), 32);
    }

    #[test]
    fn test_set_slot_suppresses_holes() {
        let mut commands = IndirectCommands::Indexed(Vec::new());
        commands.resize(3);
        commands.set_slot(1, 36, true);
        commands.set_slot(2, 36, false);

        assert_eq!(commands.instance_count(0), Some(0));
        assert_eq!(commands.instance_count(1), Some(1));
        assert_eq!(commands.instance_count(2), Some(0));
        assert_eq!(commands.instance_count(3), None);

        if let IndirectCommands::Indexed(v) = &commands {
            assert_eq!(v[1].first_instance, 1);
            assert_eq!(v[1].index_count, 36);
        }
        assert_eq!(commands.as_bytes().len(), 60);
    }
}
