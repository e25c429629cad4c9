//! Abstract pipeline types.
//!
//! These types describe pipeline state, buffer layouts and texture formats
//! independently of the native driver. The [`conversion`](crate::backend::conversion)
//! module translates them into native constants.

mod buffer;
mod state;
mod texture;

pub use buffer::{
    BufferUsage, IndexElement, IndexType, MapAccess, PositionColorVertex, PositionTexCoordVertex,
    PositionVertex, PrimitiveType, Vertex, VertexAttribute, VertexAttributeType, VertexLayout,
};
pub use state::{ClearFlags, ColorMask, DepthFunc, DstFactor, Rect, SrcFactor};
pub use texture::{
    CompareFunc, CompareMode, MagFilter, MinFilter, SamplerDescriptor, ShaderStage, Size2d,
    TextureFormat, TextureWrap,
};
