/// Vertex input layout of a graphics pipeline.
///
/// Attributes are declared per binding as `(location, format, offset)`.
/// Matrix formats are expanded here into one attribute per 16-byte row on
/// consecutive locations, so backends only ever see single-location formats.

use std::collections::BTreeSet;

use crate::device::{
    VertexAttributeDesc, VertexBindingDesc, VertexFormat, VertexInputRate, MATRIX_ROW_STRIDE,
};
use crate::engine_bail_violation;
use crate::error::Result;

/// One declared attribute (a matrix counts as one)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// One vertex buffer binding and its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
    pub attributes: Vec<VertexAttribute>,
}

impl VertexBinding {
    pub fn new(binding: u32, stride: u32, input_rate: VertexInputRate) -> Self {
        Self { binding, stride, input_rate, attributes: Vec::new() }
    }

    pub fn with_attribute(mut self, location: u32, format: VertexFormat, offset: u32) -> Self {
        self.attributes.push(VertexAttribute { location, format, offset });
        self
    }

    /// Tightly packed binding: locations and offsets follow the order of `formats`
    pub fn packed(binding: u32, input_rate: VertexInputRate, first_location: u32, formats: &[VertexFormat]) -> Self {
        let mut location = first_location;
        let mut offset = 0;
        let mut attributes = Vec::with_capacity(formats.len());
        for &format in formats {
            attributes.push(VertexAttribute { location, format, offset });
            location += format.location_count();
            offset += format.size();
        }
        Self { binding, stride: offset, input_rate, attributes }
    }

    pub fn desc(&self) -> VertexBindingDesc {
        VertexBindingDesc { binding: self.binding, stride: self.stride, input_rate: self.input_rate }
    }

    /// Single-location attributes after matrix expansion
    pub fn expand(&self) -> Vec<VertexAttributeDesc> {
        let mut expanded = Vec::new();
        for attribute in &self.attributes {
            let row = attribute.format.row_format();
            for r in 0..attribute.format.location_count() {
                let offset = if attribute.format.is_matrix() {
                    attribute.offset + r * MATRIX_ROW_STRIDE
                } else {
                    attribute.offset
                };
                expanded.push(VertexAttributeDesc {
                    location: attribute.location + r,
                    binding: self.binding,
                    format: row,
                    offset,
                });
            }
        }
        expanded
    }
}

/// Every binding attached to one pipeline
#[derive(Debug, Clone, Default)]
pub(crate) struct VertexLayout {
    bindings: Vec<VertexBinding>,
    locations: BTreeSet<u32>,
}

impl VertexLayout {
    pub(crate) fn attach(&mut self, binding: VertexBinding, max_attributes: u32) -> Result<()> {
        if self.bindings.iter().any(|b| b.binding == binding.binding) {
            engine_bail_violation!("lumen::VertexLayout", "Vertex binding {} attached twice", binding.binding);
        }

        let mut locations = BTreeSet::new();
        for attribute in binding.expand() {
            if !locations.insert(attribute.location) {
                engine_bail_violation!("lumen::VertexLayout",
                    "Location {} used twice in binding {}", attribute.location, binding.binding);
            }
            if self.locations.contains(&attribute.location) {
                engine_bail_violation!("lumen::VertexLayout",
                    "Location {} of binding {} is already used by another binding",
                    attribute.location, binding.binding);
            }
            if attribute.location >= max_attributes {
                engine_bail_violation!("lumen::VertexLayout",
                    "Location {} exceeds the device limit of {} vertex attributes",
                    attribute.location, max_attributes);
            }
        }

        self.locations.extend(locations);
        self.bindings.push(binding);
        Ok(())
    }

    pub(crate) fn binding_descs(&self) -> Vec<VertexBindingDesc> {
        self.bindings.iter().map(VertexBinding::desc).collect()
    }

    /// Expanded attributes of every binding, ordered by location
    pub(crate) fn attribute_descs(&self) -> Vec<VertexAttributeDesc> {
        let mut attributes: Vec<VertexAttributeDesc> = self.bindings.iter().flat_map(|b| b.expand()).collect();
        attributes.sort_by_key(|a| a.location);
        attributes
    }

    pub(crate) fn bindings(&self) -> &[VertexBinding] {
        &self.bindings
    }
}

#[cfg(test)]
#[path = "vertex_layout_tests.rs"]
mod tests;
