//! Buffer types and vertex layouts.

use bytemuck::{Pod, Zeroable};

/// Expected update frequency of a buffer's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Written once, drawn many times.
    #[default]
    Static,
    /// Rewritten repeatedly, drawn many times.
    Dynamic,
    /// Rewritten every frame, drawn a few times.
    Stream,
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    UnsignedByte,
    UnsignedShort,
    #[default]
    UnsignedInt,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::UnsignedByte => 1,
            Self::UnsignedShort => 2,
            Self::UnsignedInt => 4,
        }
    }
}

/// Integer types usable as index buffer elements.
pub trait IndexElement: Pod {
    const INDEX_TYPE: IndexType;
}

impl IndexElement for u8 {
    const INDEX_TYPE: IndexType = IndexType::UnsignedByte;
}

impl IndexElement for u16 {
    const INDEX_TYPE: IndexType = IndexType::UnsignedShort;
}

impl IndexElement for u32 {
    const INDEX_TYPE: IndexType = IndexType::UnsignedInt;
}

/// Requested access when mapping a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapAccess {
    Read,
    Write,
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
    Double,
}

impl VertexAttributeType {
    /// Size of one component in bytes.
    pub fn size(self) -> u32 {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::Int | Self::UnsignedInt | Self::Float => 4,
            Self::Double => 8,
        }
    }
}

/// A single attribute within a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Size of the attribute in bytes.
    pub size: u32,
    /// Component type.
    pub ty: VertexAttributeType,
    /// Whether integer data is normalized before reaching the shader.
    pub normalize: bool,
}

impl VertexAttribute {
    pub const fn new(size: u32, ty: VertexAttributeType) -> Self {
        Self {
            size,
            ty,
            normalize: false,
        }
    }

    /// Number of components in this attribute.
    pub fn components(&self) -> u32 {
        self.size / self.ty.size()
    }
}

/// Interleaved vertex layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    /// Attributes in shader location order.
    pub attributes: Vec<VertexAttribute>,
    /// Size of a whole vertex; also the stride between vertices.
    pub stride: u32,
}

impl VertexLayout {
    /// Maximum number of attributes per layout.
    pub const MAX_ATTRIBUTES: usize = 8;

    /// Create a layout whose stride is the sum of its attribute sizes.
    pub fn new(attributes: Vec<VertexAttribute>) -> Self {
        let stride = attributes.iter().map(|a| a.size).sum();
        Self { attributes, stride }
    }

    /// Byte offset of the attribute at `index`.
    pub fn offset_of(&self, index: usize) -> u32 {
        self.attributes[..index].iter().map(|a| a.size).sum()
    }
}

/// Vertex types with a known layout.
pub trait Vertex: Pod {
    fn layout() -> VertexLayout;
}

/// Vertex containing only a position.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PositionVertex {
    pub position: [f32; 3],
}

impl PositionVertex {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: [x, y, z],
        }
    }
}

impl Vertex for PositionVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(vec![VertexAttribute::new(12, VertexAttributeType::Float)])
    }
}

/// Vertex with a position and an RGBA color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PositionColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl Vertex for PositionColorVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(vec![
            VertexAttribute::new(12, VertexAttributeType::Float),
            VertexAttribute::new(16, VertexAttributeType::Float),
        ])
    }
}

/// Vertex with a position and a texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PositionTexCoordVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex for PositionTexCoordVertex {
    fn layout() -> VertexLayout {
        VertexLayout::new(vec![
            VertexAttribute::new(12, VertexAttributeType::Float),
            VertexAttribute::new(8, VertexAttributeType::Float),
        ])
    }
}
