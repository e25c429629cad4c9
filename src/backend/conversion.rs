//! Conversions from abstract pipeline types to native driver constants.

use super::{NativeEnum, NativeSamplerParams, NativeVertexAttribute};
use crate::types::{
    BufferUsage, ClearFlags, CompareFunc, CompareMode, DepthFunc, DstFactor, IndexType, MagFilter,
    MinFilter, PrimitiveType, SamplerDescriptor, ShaderStage, SrcFactor, TextureFormat,
    TextureWrap, VertexAttributeType, VertexLayout,
};

pub const ZERO: NativeEnum = 0;
pub const ONE: NativeEnum = 1;

pub const NEVER: NativeEnum = 0x0200;
pub const LESS: NativeEnum = 0x0201;
pub const EQUAL: NativeEnum = 0x0202;
pub const LEQUAL: NativeEnum = 0x0203;
pub const GREATER: NativeEnum = 0x0204;
pub const NOTEQUAL: NativeEnum = 0x0205;
pub const GEQUAL: NativeEnum = 0x0206;
pub const ALWAYS: NativeEnum = 0x0207;

pub const SRC_COLOR: NativeEnum = 0x0300;
pub const ONE_MINUS_SRC_COLOR: NativeEnum = 0x0301;
pub const SRC_ALPHA: NativeEnum = 0x0302;
pub const ONE_MINUS_SRC_ALPHA: NativeEnum = 0x0303;
pub const DST_ALPHA: NativeEnum = 0x0304;
pub const ONE_MINUS_DST_ALPHA: NativeEnum = 0x0305;
pub const DST_COLOR: NativeEnum = 0x0306;
pub const ONE_MINUS_DST_COLOR: NativeEnum = 0x0307;
pub const SRC_ALPHA_SATURATE: NativeEnum = 0x0308;
pub const CONSTANT_COLOR: NativeEnum = 0x8001;
pub const ONE_MINUS_CONSTANT_COLOR: NativeEnum = 0x8002;
pub const CONSTANT_ALPHA: NativeEnum = 0x8003;
pub const ONE_MINUS_CONSTANT_ALPHA: NativeEnum = 0x8004;

pub const POINTS: NativeEnum = 0x0000;
pub const LINES: NativeEnum = 0x0001;
pub const LINE_LOOP: NativeEnum = 0x0002;
pub const LINE_STRIP: NativeEnum = 0x0003;
pub const TRIANGLES: NativeEnum = 0x0004;
pub const TRIANGLE_STRIP: NativeEnum = 0x0005;
pub const TRIANGLE_FAN: NativeEnum = 0x0006;

pub const STREAM_DRAW: NativeEnum = 0x88E0;
pub const STATIC_DRAW: NativeEnum = 0x88E4;
pub const DYNAMIC_DRAW: NativeEnum = 0x88E8;

pub const BYTE: NativeEnum = 0x1400;
pub const UNSIGNED_BYTE: NativeEnum = 0x1401;
pub const SHORT: NativeEnum = 0x1402;
pub const UNSIGNED_SHORT: NativeEnum = 0x1403;
pub const INT: NativeEnum = 0x1404;
pub const UNSIGNED_INT: NativeEnum = 0x1405;
pub const FLOAT: NativeEnum = 0x1406;
pub const DOUBLE: NativeEnum = 0x140A;

pub const NEAREST: NativeEnum = 0x2600;
pub const LINEAR: NativeEnum = 0x2601;
pub const NEAREST_MIPMAP_NEAREST: NativeEnum = 0x2700;
pub const LINEAR_MIPMAP_NEAREST: NativeEnum = 0x2701;
pub const NEAREST_MIPMAP_LINEAR: NativeEnum = 0x2702;
pub const LINEAR_MIPMAP_LINEAR: NativeEnum = 0x2703;

pub const REPEAT: NativeEnum = 0x2901;
pub const CLAMP_TO_BORDER: NativeEnum = 0x812D;
pub const CLAMP_TO_EDGE: NativeEnum = 0x812F;
pub const MIRRORED_REPEAT: NativeEnum = 0x8370;

pub const COMPARE_REF_TO_TEXTURE: NativeEnum = 0x884E;

pub const FRAGMENT_SHADER: NativeEnum = 0x8B30;
pub const VERTEX_SHADER: NativeEnum = 0x8B31;
pub const GEOMETRY_SHADER: NativeEnum = 0x8DD9;

pub const DEPTH_TEST: NativeEnum = 0x0B71;
pub const STENCIL_TEST: NativeEnum = 0x0B90;
pub const BLEND: NativeEnum = 0x0BE2;

pub const DEPTH_BUFFER_BIT: u32 = 0x0100;
pub const STENCIL_BUFFER_BIT: u32 = 0x0400;
pub const COLOR_BUFFER_BIT: u32 = 0x4000;

pub const TEXTURE_2D: NativeEnum = 0x0DE1;
pub const TEXTURE0: NativeEnum = 0x84C0;

pub const R8: NativeEnum = 0x8229;
pub const R16F: NativeEnum = 0x822D;
pub const R32F: NativeEnum = 0x822E;
pub const RGB8: NativeEnum = 0x8051;
pub const RGBA8: NativeEnum = 0x8058;
pub const RGB10_A2: NativeEnum = 0x8059;
pub const RGBA16F: NativeEnum = 0x881A;
pub const RGBA32F: NativeEnum = 0x8814;
pub const BGRA: NativeEnum = 0x80E1;
pub const DEPTH_COMPONENT24: NativeEnum = 0x81A6;
pub const DEPTH_COMPONENT32F: NativeEnum = 0x8CAC;
pub const DEPTH24_STENCIL8: NativeEnum = 0x88F0;
pub const DEPTH32F_STENCIL8: NativeEnum = 0x8CAD;

pub fn convert_depth_func(func: DepthFunc) -> NativeEnum {
    match func {
        DepthFunc::Never => NEVER,
        DepthFunc::Less => LESS,
        DepthFunc::Equal => EQUAL,
        DepthFunc::LessEqual => LEQUAL,
        DepthFunc::Greater => GREATER,
        DepthFunc::NotEqual => NOTEQUAL,
        DepthFunc::GreaterEqual => GEQUAL,
        DepthFunc::Always => ALWAYS,
    }
}

pub fn convert_compare_func(func: CompareFunc) -> NativeEnum {
    match func {
        CompareFunc::Never => NEVER,
        CompareFunc::Less => LESS,
        CompareFunc::Equal => EQUAL,
        CompareFunc::LessEqual => LEQUAL,
        CompareFunc::Greater => GREATER,
        CompareFunc::NotEqual => NOTEQUAL,
        CompareFunc::GreaterEqual => GEQUAL,
        CompareFunc::Always => ALWAYS,
    }
}

pub fn convert_compare_mode(mode: CompareMode) -> NativeEnum {
    match mode {
        CompareMode::None => ZERO,
        CompareMode::CompareRefToTexture => COMPARE_REF_TO_TEXTURE,
    }
}

pub fn convert_src_factor(factor: SrcFactor) -> NativeEnum {
    match factor {
        SrcFactor::Zero => ZERO,
        SrcFactor::One => ONE,
        SrcFactor::SrcColor => SRC_COLOR,
        SrcFactor::OneMinusSrcColor => ONE_MINUS_SRC_COLOR,
        SrcFactor::DstColor => DST_COLOR,
        SrcFactor::OneMinusDstColor => ONE_MINUS_DST_COLOR,
        SrcFactor::SrcAlpha => SRC_ALPHA,
        SrcFactor::OneMinusSrcAlpha => ONE_MINUS_SRC_ALPHA,
        SrcFactor::DstAlpha => DST_ALPHA,
        SrcFactor::OneMinusDstAlpha => ONE_MINUS_DST_ALPHA,
        SrcFactor::ConstantColor => CONSTANT_COLOR,
        SrcFactor::OneMinusConstantColor => ONE_MINUS_CONSTANT_COLOR,
        SrcFactor::ConstantAlpha => CONSTANT_ALPHA,
        SrcFactor::OneMinusConstantAlpha => ONE_MINUS_CONSTANT_ALPHA,
        SrcFactor::SrcAlphaSaturate => SRC_ALPHA_SATURATE,
    }
}

pub fn convert_dst_factor(factor: DstFactor) -> NativeEnum {
    match factor {
        DstFactor::Zero => ZERO,
        DstFactor::One => ONE,
        DstFactor::SrcColor => SRC_COLOR,
        DstFactor::OneMinusSrcColor => ONE_MINUS_SRC_COLOR,
        DstFactor::DstColor => DST_COLOR,
        DstFactor::OneMinusDstColor => ONE_MINUS_DST_COLOR,
        DstFactor::SrcAlpha => SRC_ALPHA,
        DstFactor::OneMinusSrcAlpha => ONE_MINUS_SRC_ALPHA,
        DstFactor::DstAlpha => DST_ALPHA,
        DstFactor::OneMinusDstAlpha => ONE_MINUS_DST_ALPHA,
        DstFactor::ConstantColor => CONSTANT_COLOR,
        DstFactor::OneMinusConstantColor => ONE_MINUS_CONSTANT_COLOR,
        DstFactor::ConstantAlpha => CONSTANT_ALPHA,
        DstFactor::OneMinusConstantAlpha => ONE_MINUS_CONSTANT_ALPHA,
    }
}

pub fn convert_primitive_type(ty: PrimitiveType) -> NativeEnum {
    match ty {
        PrimitiveType::Points => POINTS,
        PrimitiveType::Lines => LINES,
        PrimitiveType::LineLoop => LINE_LOOP,
        PrimitiveType::LineStrip => LINE_STRIP,
        PrimitiveType::Triangles => TRIANGLES,
        PrimitiveType::TriangleStrip => TRIANGLE_STRIP,
        PrimitiveType::TriangleFan => TRIANGLE_FAN,
    }
}

pub fn convert_buffer_usage(usage: BufferUsage) -> NativeEnum {
    match usage {
        BufferUsage::Static => STATIC_DRAW,
        BufferUsage::Dynamic => DYNAMIC_DRAW,
        BufferUsage::Stream => STREAM_DRAW,
    }
}

pub fn convert_index_type(ty: IndexType) -> NativeEnum {
    match ty {
        IndexType::UnsignedByte => UNSIGNED_BYTE,
        IndexType::UnsignedShort => UNSIGNED_SHORT,
        IndexType::UnsignedInt => UNSIGNED_INT,
    }
}

pub fn convert_attribute_type(ty: VertexAttributeType) -> NativeEnum {
    match ty {
        VertexAttributeType::Byte => BYTE,
        VertexAttributeType::UnsignedByte => UNSIGNED_BYTE,
        VertexAttributeType::Short => SHORT,
        VertexAttributeType::UnsignedShort => UNSIGNED_SHORT,
        VertexAttributeType::Int => INT,
        VertexAttributeType::UnsignedInt => UNSIGNED_INT,
        VertexAttributeType::Float => FLOAT,
        VertexAttributeType::Double => DOUBLE,
    }
}

pub fn convert_min_filter(filter: MinFilter) -> NativeEnum {
    match filter {
        MinFilter::Nearest => NEAREST,
        MinFilter::Linear => LINEAR,
        MinFilter::NearestMipmapNearest => NEAREST_MIPMAP_NEAREST,
        MinFilter::LinearMipmapNearest => LINEAR_MIPMAP_NEAREST,
        MinFilter::NearestMipmapLinear => NEAREST_MIPMAP_LINEAR,
        MinFilter::LinearMipmapLinear => LINEAR_MIPMAP_LINEAR,
    }
}

pub fn convert_mag_filter(filter: MagFilter) -> NativeEnum {
    match filter {
        MagFilter::Nearest => NEAREST,
        MagFilter::Linear => LINEAR,
    }
}

pub fn convert_texture_wrap(wrap: TextureWrap) -> NativeEnum {
    match wrap {
        TextureWrap::Repeat => REPEAT,
        TextureWrap::ClampToEdge => CLAMP_TO_EDGE,
        TextureWrap::ClampToBorder => CLAMP_TO_BORDER,
        TextureWrap::MirroredRepeat => MIRRORED_REPEAT,
    }
}

pub fn convert_texture_format(format: TextureFormat) -> NativeEnum {
    match format {
        TextureFormat::R8 => R8,
        TextureFormat::R16F => R16F,
        TextureFormat::R32F => R32F,
        TextureFormat::Rgb8 => RGB8,
        TextureFormat::Rgba8 => RGBA8,
        TextureFormat::Rgb10A2 => RGB10_A2,
        TextureFormat::Rgba16F => RGBA16F,
        TextureFormat::Rgba32F => RGBA32F,
        TextureFormat::Bgra8 => BGRA,
        TextureFormat::Depth24 => DEPTH_COMPONENT24,
        TextureFormat::Depth32F => DEPTH_COMPONENT32F,
        TextureFormat::Depth24Stencil8 => DEPTH24_STENCIL8,
        TextureFormat::Depth32FStencil8 => DEPTH32F_STENCIL8,
    }
}

pub fn convert_shader_stage(stage: ShaderStage) -> NativeEnum {
    match stage {
        ShaderStage::Vertex => VERTEX_SHADER,
        ShaderStage::Fragment => FRAGMENT_SHADER,
        ShaderStage::Geometry => GEOMETRY_SHADER,
    }
}

pub fn convert_clear_flags(flags: ClearFlags) -> u32 {
    let mut result = 0;

    if flags.contains(ClearFlags::COLOR) {
        result |= COLOR_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::DEPTH) {
        result |= DEPTH_BUFFER_BIT;
    }
    if flags.contains(ClearFlags::STENCIL) {
        result |= STENCIL_BUFFER_BIT;
    }

    result
}

/// Convert a sampler descriptor to native sampler parameters.
pub fn convert_sampler(desc: &SamplerDescriptor) -> NativeSamplerParams {
    NativeSamplerParams {
        min_filter: convert_min_filter(desc.min_filter),
        mag_filter: convert_mag_filter(desc.mag_filter),
        wrap_s: convert_texture_wrap(desc.wrap_s),
        wrap_t: convert_texture_wrap(desc.wrap_t),
        wrap_r: convert_texture_wrap(desc.wrap_r),
        compare_func: convert_compare_func(desc.compare_func),
        compare_mode: convert_compare_mode(desc.compare_mode),
    }
}

/// Convert a vertex layout to native attributes, one per shader location.
pub fn convert_vertex_layout(layout: &VertexLayout) -> Vec<NativeVertexAttribute> {
    let mut offset = 0;
    layout
        .attributes
        .iter()
        .enumerate()
        .map(|(location, attribute)| {
            let native = NativeVertexAttribute {
                location: location as u32,
                components: attribute.components(),
                ty: convert_attribute_type(attribute.ty),
                normalize: attribute.normalize,
                stride: layout.stride,
                offset,
            };
            offset += attribute.size;
            native
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PositionColorVertex, Vertex};

    #[test]
    fn test_clear_flags() {
        assert_eq!(convert_clear_flags(ClearFlags::empty()), 0);
        assert_eq!(
            convert_clear_flags(ClearFlags::COLOR | ClearFlags::DEPTH),
            COLOR_BUFFER_BIT | DEPTH_BUFFER_BIT
        );
    }

    #[test]
    fn test_vertex_layout() {
        let attributes = convert_vertex_layout(&PositionColorVertex::layout());
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes[0].components, 3);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].components, 4);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].stride, 28);
        assert_eq!(attributes[1].ty, FLOAT);
    }

    #[test]
    fn test_depth_and_compare_share_constants() {
        assert_eq!(convert_depth_func(DepthFunc::Less), LESS);
        assert_eq!(convert_compare_func(CompareFunc::Less), LESS);
        assert_eq!(convert_src_factor(SrcFactor::SrcAlpha), SRC_ALPHA);
        assert_eq!(convert_dst_factor(DstFactor::OneMinusSrcAlpha), ONE_MINUS_SRC_ALPHA);
    }
}
