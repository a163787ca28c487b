//! volserve is an interactive volume render server.
//!
//! A client writes whitespace-delimited commands (`world`, `camera`, `renderer`, `render`) to the
//! server's input. The server builds and caches engine objects for the requested scene, renders
//! on `render`, compresses the frame and answers with a length-prefixed binary response.
//!
//! # Pipeline overview
//!
//! 1. **Parse**: [`TokenReader`] + [`Command::read`] (fixed arity per command)
//! 2. **Build**: [`SceneBuilder`] resolves [`Registry`] entries into engine objects held by the
//!    [`ResourceCache`]
//! 3. **Render**: the [`Engine`] fills a frame buffer (reference implementation: [`CpuEngine`])
//! 4. **Encode**: [`ImageEncoder`] writes JPEG or PNG bytes into a reused [`GrowableBuffer`]
//! 5. **Frame**: [`write_response`] emits a 24-byte header plus the image bytes
//!
//! Design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Single-threaded session**: one command at a time, every `render` blocks until the frame is
//!   written. The engine may parallelize internally.
//! - **Never evict**: cached engine objects live as long as the [`ResourceCache`].
//! - **Diagnostics on stderr only**: stdout carries nothing but response frames.
#![forbid(unsafe_code)]

pub mod cache;
pub mod encode;
pub mod engine;
pub mod foundation;
pub mod protocol;
pub mod registry;
pub mod scene;
pub mod session;

pub use cache::{CacheStats, ResourceCache, ResourceStats};
pub use encode::{GrowableBuffer, ImageEncoder, ImageFormat};
pub use engine::{Engine, ObjectKind, ObjectRef, cpu::CpuEngine};
pub use foundation::error::{VolserveError, VolserveResult};
pub use protocol::{
    CameraPose, Command, FrameHeader, RenderResponse, TokenReader, read_response, write_response,
};
pub use registry::{DatasetDef, Registry, RegistryDef};
pub use scene::{GridConvention, RenderMode, SceneBuilder, WorldRequest};
pub use session::{RendererSettings, ServeOptions, ServeStats, Session, SessionState};
