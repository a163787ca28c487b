//! Reference CPU implementation of the [`Engine`] contract.
//!
//! Objects live in a reference-counted store. `render_frame` resolves the committed parameters of
//! the world, camera and renderer into an immutable snapshot, then ray-marches rows in parallel.
//! Output is deterministic for a given snapshot and frame size.

mod trace;

use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use crate::{
    engine::{Engine, FrameBufferDesc, ObjectId, ObjectKind, Param},
    foundation::error::{VolserveError, VolserveResult},
};

struct Slot {
    kind: ObjectKind,
    type_tag: String,
    refcount: u32,
    pending: BTreeMap<String, Param>,
    committed: Option<BTreeMap<String, Param>>,
    frame: Option<FrameStorage>,
}

struct FrameStorage {
    desc: FrameBufferDesc,
    pixels: Arc<[u8]>,
    mapped: u32,
}

#[derive(Default)]
struct Store {
    next_id: u64,
    objects: HashMap<u64, Slot>,
    constructed: HashMap<ObjectKind, u64>,
    frames_rendered: u64,
}

impl Store {
    fn insert(&mut self, kind: ObjectKind, type_tag: &str, frame: Option<FrameStorage>) -> ObjectId {
        self.next_id += 1;
        let id = self.next_id;
        self.objects.insert(
            id,
            Slot {
                kind,
                type_tag: type_tag.to_string(),
                refcount: 1,
                pending: BTreeMap::new(),
                committed: None,
                frame,
            },
        );
        *self.constructed.entry(kind).or_default() += 1;
        ObjectId(id)
    }

    fn slot(&self, id: ObjectId) -> VolserveResult<&Slot> {
        self.objects
            .get(&id.0)
            .ok_or_else(|| VolserveError::engine(format!("unknown object handle {}", id.0)))
    }

    fn slot_mut(&mut self, id: ObjectId) -> VolserveResult<&mut Slot> {
        self.objects
            .get_mut(&id.0)
            .ok_or_else(|| VolserveError::engine(format!("unknown object handle {}", id.0)))
    }

    fn retain_all(&mut self, ids: &[ObjectId]) {
        for id in ids {
            if let Some(slot) = self.objects.get_mut(&id.0) {
                slot.refcount += 1;
            }
        }
    }

    /// Drop one reference from each of `ids`, destroying objects that reach zero.
    fn release_all(&mut self, ids: Vec<ObjectId>) {
        let mut work = ids;
        while let Some(id) = work.pop() {
            let Some(slot) = self.objects.get_mut(&id.0) else {
                tracing::warn!(handle = id.0, "release of unknown engine handle");
                continue;
            };
            slot.refcount -= 1;
            if slot.refcount > 0 {
                continue;
            }
            if let Some(slot) = self.objects.remove(&id.0) {
                work.extend(slot_refs(&slot));
            }
        }
    }
}

fn slot_refs(slot: &Slot) -> Vec<ObjectId> {
    let mut out: Vec<ObjectId> = slot
        .pending
        .values()
        .flat_map(|p| p.object_refs().iter().copied())
        .collect();
    if let Some(committed) = &slot.committed {
        out.extend(committed.values().flat_map(|p| p.object_refs().iter().copied()));
    }
    out
}

/// Deterministic software engine.
#[derive(Default)]
pub struct CpuEngine {
    store: RefCell<Store>,
}

impl CpuEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently alive.
    pub fn live_objects(&self) -> usize {
        self.store.borrow().objects.len()
    }

    /// Number of objects of `kind` ever constructed.
    pub fn constructed(&self, kind: ObjectKind) -> u64 {
        self.store
            .borrow()
            .constructed
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.store.borrow().frames_rendered
    }

    /// Current reference count of `id`, or `None` once destroyed.
    pub fn refcount(&self, id: ObjectId) -> Option<u32> {
        self.store.borrow().objects.get(&id.0).map(|s| s.refcount)
    }
}

impl Engine for CpuEngine {
    fn construct(&self, kind: ObjectKind, type_tag: &str) -> VolserveResult<ObjectId> {
        let supported = match kind {
            ObjectKind::Volume => type_tag == "structuredRegular",
            ObjectKind::TransferFunction => type_tag == "piecewiseLinear",
            ObjectKind::Geometry => type_tag == "isosurface",
            ObjectKind::Material => type_tag == "obj",
            ObjectKind::Light => type_tag == "ambient",
            ObjectKind::Camera => type_tag == "perspective",
            ObjectKind::Renderer => type_tag == "ao",
            ObjectKind::FrameBuffer => false,
            ObjectKind::VolumetricModel
            | ObjectKind::GeometricModel
            | ObjectKind::Group
            | ObjectKind::Instance
            | ObjectKind::World => true,
        };
        if !supported {
            return Err(VolserveError::engine(format!(
                "unsupported {kind:?} type '{type_tag}'"
            )));
        }
        Ok(self.store.borrow_mut().insert(kind, type_tag, None))
    }

    fn new_frame_buffer(&self, desc: FrameBufferDesc) -> VolserveResult<ObjectId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(VolserveError::engine(format!(
                "frame buffer size must be non-zero, got {}x{}",
                desc.width, desc.height
            )));
        }
        let frame = FrameStorage {
            desc,
            pixels: vec![0u8; desc.byte_len()].into(),
            mapped: 0,
        };
        Ok(self
            .store
            .borrow_mut()
            .insert(ObjectKind::FrameBuffer, "framebuffer", Some(frame)))
    }

    fn set_param(&self, id: ObjectId, name: &str, value: Param) -> VolserveResult<()> {
        let mut store = self.store.borrow_mut();
        store.slot(id)?;
        for r in value.object_refs() {
            store.slot(*r)?;
        }
        store.retain_all(value.object_refs());
        let old = store.slot_mut(id)?.pending.insert(name.to_string(), value);
        if let Some(old) = old {
            store.release_all(old.object_refs().to_vec());
        }
        Ok(())
    }

    fn commit(&self, id: ObjectId) -> VolserveResult<()> {
        let mut store = self.store.borrow_mut();
        let slot = store.slot(id)?;
        let next = slot.pending.clone();
        let new_refs: Vec<ObjectId> = next
            .values()
            .flat_map(|p| p.object_refs().iter().copied())
            .collect();
        store.retain_all(&new_refs);
        let old = store.slot_mut(id)?.committed.replace(next);
        if let Some(old) = old {
            let old_refs = old
                .values()
                .flat_map(|p| p.object_refs().iter().copied())
                .collect();
            store.release_all(old_refs);
        }
        Ok(())
    }

    fn retain(&self, id: ObjectId) {
        self.store.borrow_mut().retain_all(&[id]);
    }

    fn release(&self, id: ObjectId) {
        self.store.borrow_mut().release_all(vec![id]);
    }

    fn render_frame(
        &self,
        frame_buffer: ObjectId,
        renderer: ObjectId,
        camera: ObjectId,
        world: ObjectId,
    ) -> VolserveResult<()> {
        let (desc, scene) = {
            let store = self.store.borrow();
            let fb = store.slot(frame_buffer)?;
            let desc = fb
                .frame
                .as_ref()
                .map(|f| f.desc)
                .ok_or_else(|| VolserveError::engine("render target is not a frame buffer"))?;
            (desc, trace::Scene::resolve(&store, renderer, camera, world)?)
        };

        let pixels = scene.render(desc);

        let mut store = self.store.borrow_mut();
        if let Some(frame) = store.slot_mut(frame_buffer)?.frame.as_mut() {
            frame.pixels = pixels.into();
        }
        store.frames_rendered += 1;
        Ok(())
    }

    fn map_frame_buffer(&self, frame_buffer: ObjectId) -> VolserveResult<Arc<[u8]>> {
        let mut store = self.store.borrow_mut();
        let frame = store
            .slot_mut(frame_buffer)?
            .frame
            .as_mut()
            .ok_or_else(|| VolserveError::engine("mapped object is not a frame buffer"))?;
        frame.mapped += 1;
        Ok(Arc::clone(&frame.pixels))
    }

    fn unmap_frame_buffer(&self, frame_buffer: ObjectId) {
        let mut store = self.store.borrow_mut();
        match store
            .objects
            .get_mut(&frame_buffer.0)
            .and_then(|s| s.frame.as_mut())
        {
            Some(frame) if frame.mapped > 0 => frame.mapped -= 1,
            _ => tracing::warn!(handle = frame_buffer.0, "unmap without matching map"),
        }
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/engine/cpu.rs"]
mod tests;
