//! Recorded commands.

use super::arena::StagingRange;
use super::state::StateCommand;
use crate::context::RenderContext;
use crate::error::GlError;
use crate::resources::{
    Effect, Framebuffer, IndexBuffer, ShaderProgram, Syncable, Texture2D, VertexBuffer,
};

/// Execute action of a custom command.
pub type ExecuteFn = Box<dyn FnMut(&mut RenderContext) -> Result<(), GlError> + Send>;

/// Release action of a command, run exactly once when the command is dropped.
pub type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Destination of a recorded buffer upload.
pub(crate) type UploadTarget = Box<dyn Syncable + Send + Sync>;

pub(crate) enum CommandKind {
    CreateVertexBuffer {
        buffer: VertexBuffer,
        data: Option<StagingRange>,
    },
    CreateIndexBuffer {
        buffer: IndexBuffer,
        data: Option<StagingRange>,
    },
    CreateTexture2D {
        texture: Texture2D,
        data: Option<StagingRange>,
    },
    CreateShader {
        shader: ShaderProgram,
        source: String,
    },
    CreateEffect {
        effect: Effect,
        shaders: Vec<ShaderProgram>,
    },
    CreateFramebuffer {
        framebuffer: Framebuffer,
    },
    /// Upload of a mapped range. The staged bytes are attached when the
    /// mapping is released; until then the upload is skipped.
    UploadBuffer {
        target: UploadTarget,
        offset: usize,
        range: Option<StagingRange>,
    },
    State(StateCommand),
    Custom(ExecuteFn),
}

impl CommandKind {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateVertexBuffer { .. } => "CreateVertexBuffer",
            Self::CreateIndexBuffer { .. } => "CreateIndexBuffer",
            Self::CreateTexture2D { .. } => "CreateTexture2D",
            Self::CreateShader { .. } => "CreateShader",
            Self::CreateEffect { .. } => "CreateEffect",
            Self::CreateFramebuffer { .. } => "CreateFramebuffer",
            Self::UploadBuffer { .. } => "UploadBuffer",
            Self::State(command) => command.name(),
            Self::Custom(_) => "Custom",
        }
    }
}

/// A command recorded on a [`DeferredContext`](super::DeferredContext).
///
/// Resources referenced by a command are retained until the command is
/// dropped. Dropping the command also runs its release action.
pub struct Command {
    kind: CommandKind,
    release: Option<ReleaseFn>,
}

impl Command {
    pub(crate) fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            release: None,
        }
    }

    pub(crate) fn custom(execute: ExecuteFn, release: ReleaseFn) -> Self {
        Self {
            kind: CommandKind::Custom(execute),
            release: Some(release),
        }
    }

    /// Name of the command kind, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Check if the command will run when replayed.
    ///
    /// Only uploads of mapped ranges that are still mapped report `false`.
    pub fn is_committed(&self) -> bool {
        !matches!(
            self.kind,
            CommandKind::UploadBuffer { range: None, .. }
        )
    }

    /// Attach the staged bytes of a released mapping.
    pub(crate) fn commit(&mut self, staged: StagingRange) {
        if let CommandKind::UploadBuffer { range, .. } = &mut self.kind {
            *range = Some(staged);
        }
    }

    /// Replace the release action.
    ///
    /// The previous release action, if any, runs immediately.
    pub fn set_release(&mut self, release: impl FnOnce() + Send + 'static) {
        if let Some(previous) = self.release.replace(Box::new(release)) {
            previous();
        }
    }

    pub(crate) fn execute(&mut self, context: &mut RenderContext) -> Result<(), GlError> {
        match &mut self.kind {
            CommandKind::CreateVertexBuffer { buffer, data } => {
                let staged = data.as_ref().map(StagingRange::bytes);
                context.recreate(buffer, |ctx| {
                    ctx.realize_vertex_buffer(buffer, staged.as_deref())
                })
            }
            CommandKind::CreateIndexBuffer { buffer, data } => {
                let staged = data.as_ref().map(StagingRange::bytes);
                context.recreate(buffer, |ctx| {
                    ctx.realize_index_buffer(buffer, staged.as_deref())
                })
            }
            CommandKind::CreateTexture2D { texture, data } => {
                let staged = data.as_ref().map(StagingRange::bytes);
                context.recreate(texture, |ctx| {
                    ctx.realize_texture_2d(texture, staged.as_deref())
                })
            }
            CommandKind::CreateShader { shader, source } => {
                context.recreate(shader, |ctx| ctx.realize_shader(shader, source))
            }
            CommandKind::CreateEffect { effect, shaders } => {
                context.recreate(effect, |ctx| ctx.realize_effect(effect, shaders))
            }
            CommandKind::CreateFramebuffer { framebuffer } => {
                context.recreate(framebuffer, |ctx| ctx.realize_framebuffer(framebuffer))
            }
            CommandKind::UploadBuffer {
                target,
                offset,
                range,
            } => {
                let Some(range) = range.as_ref() else {
                    log::warn!(
                        "Skipping upload to {:?} {}: range is still mapped",
                        target.kind(),
                        target.uid()
                    );
                    return Ok(());
                };
                context.upload_staged(&**target, *offset, &range.bytes())?;
                target.sync().signal();
                Ok(())
            }
            CommandKind::State(command) => command.execute(context.state()),
            CommandKind::Custom(execute) => execute(context),
        }
    }
}

impl Drop for Command {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("kind", &self.kind.name())
            .field("committed", &self.is_committed())
            .field("has_release", &self.release.is_some())
            .finish()
    }
}

static_assertions::assert_impl_all!(Command: Send);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_release_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let command = Command::custom(
            Box::new(|_: &mut RenderContext| Ok(())),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(command.name(), "Custom");
        assert!(command.is_committed());
        drop(command);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_release_runs_previous() {
        let released = Arc::new(AtomicUsize::new(0));
        let first = released.clone();
        let second = released.clone();
        let mut command = Command::custom(
            Box::new(|_: &mut RenderContext| Ok(())),
            Box::new(move || {
                first.fetch_add(1, Ordering::SeqCst);
            }),
        );
        command.set_release(move || {
            second.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(released.load(Ordering::SeqCst), 1);
        drop(command);
        assert_eq!(released.load(Ordering::SeqCst), 11);
    }
}
