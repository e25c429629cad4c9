//! Texture, sampler and shader stage types.

/// Pixel format of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    R8,
    R16F,
    R32F,
    Rgb8,
    #[default]
    Rgba8,
    Rgb10A2,
    Rgba16F,
    Rgba32F,
    Bgra8,
    Depth24,
    Depth32F,
    Depth24Stencil8,
    Depth32FStencil8,
}

impl TextureFormat {
    /// Size of one pixel in bytes.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::R8 => 1,
            Self::R16F => 2,
            Self::Rgb8 | Self::Depth24 => 3,
            Self::R32F
            | Self::Rgba8
            | Self::Rgb10A2
            | Self::Bgra8
            | Self::Depth32F
            | Self::Depth24Stencil8 => 4,
            Self::Rgba16F | Self::Depth32FStencil8 => 8,
            Self::Rgba32F => 16,
        }
    }

    /// Check if this is a depth or depth-stencil format.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::Depth24 | Self::Depth32F | Self::Depth24Stencil8 | Self::Depth32FStencil8
        )
    }
}

/// Width and height of a 2D surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size2d {
    pub width: u32,
    pub height: u32,
}

impl Size2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MinFilter {
    Nearest,
    #[default]
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MagFilter {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate wrapping mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    ClampToEdge,
    ClampToBorder,
    MirroredRepeat,
}

/// Comparison function for depth textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    #[default]
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Whether sampled depth values are compared against a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareMode {
    #[default]
    None,
    CompareRefToTexture,
}

/// Descriptor for creating a sampler object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDescriptor {
    pub min_filter: MinFilter,
    pub mag_filter: MagFilter,
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    pub wrap_r: TextureWrap,
    pub compare_func: CompareFunc,
    pub compare_mode: CompareMode,
}

impl SamplerDescriptor {
    /// Create a sampler descriptor with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a nearest neighbor filtering sampler.
    pub fn nearest() -> Self {
        Self {
            min_filter: MinFilter::Nearest,
            mag_filter: MagFilter::Nearest,
            ..Default::default()
        }
    }

    /// Set the wrap mode for all coordinates.
    pub fn with_wrap(mut self, wrap: TextureWrap) -> Self {
        self.wrap_s = wrap;
        self.wrap_t = wrap;
        self.wrap_r = wrap;
        self
    }

    /// Enable depth comparison with the given function.
    pub fn with_compare(mut self, func: CompareFunc) -> Self {
        self.compare_func = func;
        self.compare_mode = CompareMode::CompareRefToTexture;
        self
    }
}

/// Programmable pipeline stage of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}
