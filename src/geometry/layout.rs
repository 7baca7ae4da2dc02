pub const POSITIONS: &str = "positions";
pub const NORMALS: &str = "normals";
pub const COLOURS: &str = "colours";
pub const TEXTURE_COORDINATES: &str = "textureCoordinates";
pub const WEIGHTS: &str = "weights";

/// One named attribute inside an interleaved vertex.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutAttribute {
    pub name: String,
    /// Offset in floats from the start of the vertex.
    pub offset: usize,
    pub num_components: usize,
}

/// Describes how vertex attributes are interleaved in a flat float buffer.
/// Attributes are packed in insertion order, so the stride is always the sum of their
/// component counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshLayout {
    attributes: Vec<LayoutAttribute>,
    stride: usize,
}

impl MeshLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute after the current ones.
    pub fn with_attribute(mut self, name: &str, num_components: usize) -> Self {
        self.attributes.push(LayoutAttribute {
            name: name.to_string(),
            offset: self.stride,
            num_components,
        });
        self.stride += num_components;
        self
    }

    /// Floats per vertex.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn attribute(&self, name: &str) -> Option<&LayoutAttribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn attributes(&self) -> &[LayoutAttribute] {
        &self.attributes
    }
}
