//! Contract with the rendering engine.
//!
//! The engine is an opaque object store driven through handles: objects are constructed by kind
//! and type tag, parameterized with [`Param`] values, committed, and reference counted. Callers
//! should hold handles through [`ObjectRef`], which pairs `retain` with exactly one `release`.

pub mod cpu;
mod object;

use std::sync::Arc;

use crate::foundation::{
    core::{Dims3, Vec2, Vec3, Vec4},
    error::VolserveResult,
};

pub use object::{MappedFrame, ObjectRef};

/// Engine-assigned handle value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) u64);

impl ObjectId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Category of an engine object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKind {
    Volume,
    TransferFunction,
    VolumetricModel,
    Geometry,
    GeometricModel,
    Material,
    Group,
    Instance,
    Light,
    World,
    Camera,
    Renderer,
    FrameBuffer,
}

/// Pixel layout of a frame buffer's color channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Linear RGBA, 8 bits per channel.
    Rgba8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameBufferDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameBufferDesc {
    pub fn byte_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

/// Structured grid samples shared with the engine without copying.
#[derive(Clone, Debug)]
pub struct SharedGrid {
    pub samples: Arc<[f32]>,
    pub dims: Dims3,
}

/// Typed object parameter.
#[derive(Clone, Debug)]
pub enum Param {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    /// Closed 1D interval.
    Box1(Vec2),
    Floats(Arc<[f32]>),
    Vec3s(Arc<[Vec3]>),
    Grid(SharedGrid),
    Object(ObjectId),
    Objects(Vec<ObjectId>),
}

impl Param {
    /// Handles this parameter holds a reference to.
    pub(crate) fn object_refs(&self) -> &[ObjectId] {
        match self {
            Param::Object(id) => std::slice::from_ref(id),
            Param::Objects(ids) => ids,
            _ => &[],
        }
    }
}

/// Operations the session needs from a rendering engine.
///
/// Handles start with a reference count of one owned by the caller. Objects referenced through
/// [`Param::Object`]/[`Param::Objects`] are kept alive by the referencing object. Parameter changes
/// take effect at [`Engine::commit`].
pub trait Engine {
    fn construct(&self, kind: ObjectKind, type_tag: &str) -> VolserveResult<ObjectId>;

    fn new_frame_buffer(&self, desc: FrameBufferDesc) -> VolserveResult<ObjectId>;

    fn set_param(&self, id: ObjectId, name: &str, value: Param) -> VolserveResult<()>;

    fn commit(&self, id: ObjectId) -> VolserveResult<()>;

    fn retain(&self, id: ObjectId);

    fn release(&self, id: ObjectId);

    /// Render one frame; blocks until the frame buffer holds the finished image.
    fn render_frame(
        &self,
        frame_buffer: ObjectId,
        renderer: ObjectId,
        camera: ObjectId,
        world: ObjectId,
    ) -> VolserveResult<()>;

    /// Readable view of the color channel, `width * height * 4` bytes, top row first.
    fn map_frame_buffer(&self, frame_buffer: ObjectId) -> VolserveResult<Arc<[u8]>>;

    fn unmap_frame_buffer(&self, frame_buffer: ObjectId);
}
