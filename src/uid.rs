//! Unique resource identifiers.
//!
//! Every resource receives a [`Uid`] from its device's [`UidRegistry`] when it
//! is constructed. UIDs are the identity key of the render state cache:
//! native handles are recycled by drivers after deletion, UIDs never are.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of a resource within its [`ResourceKind`].
///
/// `Uid::NONE` (zero) means "nothing bound".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Uid(u32);

impl Uid {
    pub const NONE: Self = Self(0);

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Category of a resource. Each category has its own UID counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    Texture,
    Sampler,
    Shader,
    Program,
    Framebuffer,
}

impl ResourceKind {
    const COUNT: usize = 7;

    fn index(self) -> usize {
        match self {
            Self::VertexBuffer => 0,
            Self::IndexBuffer => 1,
            Self::Texture => 2,
            Self::Sampler => 3,
            Self::Shader => 4,
            Self::Program => 5,
            Self::Framebuffer => 6,
        }
    }
}

/// Per-category UID counters.
///
/// Counters start at zero and are never reset; the first UID handed out in
/// each category is 1.
#[derive(Debug, Default)]
pub struct UidRegistry {
    counters: [AtomicU32; ResourceKind::COUNT],
}

impl UidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next UID for `kind`.
    pub fn next(&self, kind: ResourceKind) -> Uid {
        Uid(self.counters[kind.index()].fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Last UID handed out for `kind`, or [`Uid::NONE`].
    pub fn last(&self, kind: ResourceKind) -> Uid {
        Uid(self.counters[kind.index()].load(Ordering::Relaxed))
    }
}
