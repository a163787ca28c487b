//! Long-lived arena of engine objects.
//!
//! [`ResourceCache`] is owned by the process entry point and passed by reference into the command
//! handlers. It holds the only long-term owning [`ObjectRef`] for each cached object and never
//! evicts, so every handle it returns stays valid until the cache itself is dropped.

mod policy;

pub use policy::{CacheStats, ImmutableCache, MutableCache};

use crate::{engine::ObjectRef, scene::BuiltWorld};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VolumeKey {
    pub name: String,
    pub timestep: i32,
}

/// Curves by name plus the value domain bits of the volume they map.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TransferFunctionKey {
    pub color_map: String,
    pub opacity_map: String,
    pub domain: [u32; 2],
}

/// World identity. Only the presence of iso-values is part of the key, not the values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WorldKey {
    pub volume: String,
    pub timestep: i32,
    pub color_map: String,
    pub opacity_map: String,
    pub isosurface: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameBufferKey {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ResourceStats {
    pub volumes: CacheStats,
    pub transfer_functions: CacheStats,
    pub worlds: CacheStats,
    pub frame_buffers: CacheStats,
    pub cameras: CacheStats,
    pub renderers: CacheStats,
}

/// Per-process object arena: immutable caches for scene data, mutable singletons for the view.
#[derive(Default)]
pub struct ResourceCache {
    pub(crate) volumes: ImmutableCache<VolumeKey, ObjectRef>,
    pub(crate) transfer_functions: ImmutableCache<TransferFunctionKey, ObjectRef>,
    pub(crate) worlds: ImmutableCache<WorldKey, BuiltWorld>,
    pub(crate) frame_buffers: ImmutableCache<FrameBufferKey, ObjectRef>,
    // Keyed by engine type tag.
    pub(crate) cameras: MutableCache<String, ObjectRef>,
    pub(crate) renderers: MutableCache<String, ObjectRef>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ResourceStats {
        ResourceStats {
            volumes: self.volumes.stats(),
            transfer_functions: self.transfer_functions.stats(),
            worlds: self.worlds.stats(),
            frame_buffers: self.frame_buffers.stats(),
            cameras: self.cameras.stats(),
            renderers: self.renderers.stats(),
        }
    }

    pub fn world(&self, key: &WorldKey) -> Option<&BuiltWorld> {
        self.worlds.get(key)
    }
}
