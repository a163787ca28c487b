use std::{fmt, rc::Rc, sync::Arc};

use crate::{
    engine::{Engine, FrameBufferDesc, ObjectId, ObjectKind, Param},
    foundation::error::VolserveResult,
};

/// Owning handle to an engine object.
///
/// Cloning retains the object; dropping releases it exactly once.
pub struct ObjectRef {
    engine: Rc<dyn Engine>,
    id: ObjectId,
    kind: ObjectKind,
}

impl ObjectRef {
    pub fn construct(
        engine: &Rc<dyn Engine>,
        kind: ObjectKind,
        type_tag: &str,
    ) -> VolserveResult<Self> {
        let id = engine.construct(kind, type_tag)?;
        Ok(Self {
            engine: Rc::clone(engine),
            id,
            kind,
        })
    }

    pub fn frame_buffer(engine: &Rc<dyn Engine>, desc: FrameBufferDesc) -> VolserveResult<Self> {
        let id = engine.new_frame_buffer(desc)?;
        Ok(Self {
            engine: Rc::clone(engine),
            id,
            kind: ObjectKind::FrameBuffer,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn engine(&self) -> &Rc<dyn Engine> {
        &self.engine
    }

    pub fn set(&self, name: &str, value: Param) -> VolserveResult<()> {
        self.engine.set_param(self.id, name, value)
    }

    pub fn set_object(&self, name: &str, object: &ObjectRef) -> VolserveResult<()> {
        self.set(name, Param::Object(object.id))
    }

    pub fn set_objects(&self, name: &str, objects: &[&ObjectRef]) -> VolserveResult<()> {
        self.set(name, Param::Objects(objects.iter().map(|o| o.id).collect()))
    }

    pub fn commit(&self) -> VolserveResult<()> {
        self.engine.commit(self.id)
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        self.engine.retain(self.id);
        Self {
            engine: Rc::clone(&self.engine),
            id: self.id,
            kind: self.kind,
        }
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        self.engine.release(self.id);
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.engine, &other.engine)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("id", &self.id.0)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Mapped color channel of a frame buffer; unmapped on drop.
pub struct MappedFrame {
    engine: Rc<dyn Engine>,
    frame_buffer: ObjectId,
    pixels: Arc<[u8]>,
}

impl MappedFrame {
    pub fn map(frame_buffer: &ObjectRef) -> VolserveResult<Self> {
        let pixels = frame_buffer
            .engine
            .map_frame_buffer(frame_buffer.id)?;
        Ok(Self {
            engine: Rc::clone(&frame_buffer.engine),
            frame_buffer: frame_buffer.id,
            pixels,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl Drop for MappedFrame {
    fn drop(&mut self) {
        self.engine.unmap_frame_buffer(self.frame_buffer);
    }
}
