use super::*;

use std::{collections::BTreeMap, io::Cursor, path::PathBuf};

use crate::{
    engine::cpu::CpuEngine,
    protocol::read_response,
    registry::{DatasetDef, RegistryDef},
};

fn temp_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "volserve_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ))
}

fn registry(name: &str) -> Registry {
    let dir = temp_dir(name);
    std::fs::create_dir_all(&dir).unwrap();
    let bytes: Vec<u8> = (0..27)
        .flat_map(|i| (i as f32 / 26.0).to_le_bytes())
        .collect();
    std::fs::write(dir.join("cube.raw"), bytes).unwrap();

    let mut color_maps = BTreeMap::new();
    color_maps.insert("gray".to_string(), vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
    let mut opacity_maps = BTreeMap::new();
    opacity_maps.insert("ramp".to_string(), vec![0.0, 1.0]);
    Registry::from_def(
        RegistryDef {
            datasets: vec![DatasetDef {
                name: "cube".to_string(),
                timestep: 0,
                path: "cube.raw".into(),
                dimensions: [3, 3, 3],
                domain: [0.0, 1.0],
            }],
            color_maps,
            opacity_maps,
        },
        &dir,
    )
    .unwrap()
}

fn setup(name: &str) -> (Rc<CpuEngine>, Rc<dyn Engine>, Registry) {
    let cpu = Rc::new(CpuEngine::new());
    let engine: Rc<dyn Engine> = cpu.clone();
    (cpu, engine, registry(name))
}

const VIEW: &str = "camera 0 0 -2 0 1 0 0 0 1 0 0 1 1\nrenderer 0 0 0 255\n";

#[test]
fn failed_world_keeps_the_previous_world() {
    let (_cpu, engine, registry) = setup("session_failed_world");
    let mut session = Session::new(engine, &registry, ServeOptions::default());
    let mut cache = ResourceCache::new();
    let mut out = Vec::new();

    session
        .serve(&mut cache, Cursor::new("world cube 0 gray ramp 0\n"), &mut out)
        .unwrap();
    let before = session.state().world.as_ref().unwrap().id();

    let stats = session
        .serve(
            &mut cache,
            Cursor::new("world cube 0 nope ramp 0\nworld missing 0 gray ramp 0\n"),
            &mut out,
        )
        .unwrap();
    assert_eq!(stats.skipped, 2);
    assert_eq!(session.state().world.as_ref().unwrap().id(), before);
    assert!(out.is_empty());
}

#[test]
fn render_without_view_is_fatal() {
    let (_cpu, engine, registry) = setup("session_render_unset");
    let mut session = Session::new(engine, &registry, ServeOptions::default());
    let mut cache = ResourceCache::new();
    let mut out = Vec::new();

    let err = session
        .serve(
            &mut cache,
            Cursor::new("world cube 0 gray ramp 0\nrender 8 8\n"),
            &mut out,
        )
        .unwrap_err();
    assert!(matches!(err, VolserveError::Engine(_)));
    assert!(out.is_empty());
}

#[test]
fn camera_and_renderer_are_process_singletons() {
    let (cpu, engine, registry) = setup("session_singletons");
    let mut session = Session::new(engine, &registry, ServeOptions::default());
    let mut cache = ResourceCache::new();
    let mut out = Vec::new();

    let input = format!("{VIEW}{VIEW}camera 1 1 -2 0 1 0 0 0 1 0 0 1 1\n");
    session
        .serve(&mut cache, Cursor::new(input), &mut out)
        .unwrap();

    assert_eq!(cpu.constructed(ObjectKind::Camera), 1);
    assert_eq!(cpu.constructed(ObjectKind::Renderer), 1);
    let stats = cache.stats();
    assert_eq!(stats.cameras.builds, 1);
    assert_eq!(stats.cameras.hits, 2);
    assert_eq!(stats.renderers.hits, 1);
}

#[test]
fn render_writes_one_frame_per_command() {
    let (cpu, engine, registry) = setup("session_frames");
    let options = ServeOptions {
        format: ImageFormat::Png,
        ..Default::default()
    };
    let mut session = Session::new(engine, &registry, options);
    let mut cache = ResourceCache::new();
    let mut out = Vec::new();

    let input = format!("world cube 0 gray ramp 0\n{VIEW}render 16 8\nrender 16 8\nrender 4 4\n");
    let stats = session
        .serve(&mut cache, Cursor::new(input), &mut out)
        .unwrap();
    assert_eq!(
        stats,
        ServeStats {
            commands: 6,
            skipped: 0,
            frames: 3
        }
    );
    assert_eq!(cpu.frames_rendered(), 3);
    assert_eq!(cpu.constructed(ObjectKind::FrameBuffer), 2);

    let mut r = Cursor::new(out);
    let mut sizes = Vec::new();
    while let Some(resp) = read_response(&mut r).unwrap() {
        assert_eq!(resp.header.image_len as usize, resp.image.len());
        let img = image::load_from_memory(&resp.image).unwrap();
        sizes.push((img.width(), img.height()));
    }
    assert_eq!(sizes, vec![(16, 8), (16, 8), (4, 4)]);
}

#[test]
fn malformed_commands_are_counted_and_skipped() {
    let (_cpu, engine, registry) = setup("session_malformed");
    let mut session = Session::new(engine, &registry, ServeOptions::default());
    let mut cache = ResourceCache::new();
    let mut out = Vec::new();

    let stats = session
        .serve(
            &mut cache,
            Cursor::new("spin 3\nrenderer 0 0 0 999\nrender 0 0\n"),
            &mut out,
        )
        .unwrap();
    // "spin" and "3" are each read as unknown keywords.
    assert_eq!(stats.commands, 4);
    assert_eq!(stats.skipped, 4);
    assert!(session.state().renderer.is_none());
}

#[test]
fn degenerate_camera_keeps_the_previous_camera() {
    let (_cpu, engine, registry) = setup("session_degenerate_camera");
    let mut session = Session::new(engine, &registry, ServeOptions::default());
    let mut cache = ResourceCache::new();
    let mut out = Vec::new();

    let input = format!(
        "world cube 0 gray ramp 0\n{VIEW}\
         camera 0 0 -1.5 0 0 1 0 0 1 0 0 1 1\n\
         render 8 8\n\
         camera 0 0 -1.5 0 1 0 0 0 0 0 0 1 1\n\
         render 8 8\n"
    );
    let stats = session
        .serve(&mut cache, Cursor::new(input), &mut out)
        .unwrap();
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.frames, 2);
    assert_eq!(cache.stats().cameras.hits, 0);

    let mut r = Cursor::new(out);
    assert!(read_response(&mut r).unwrap().is_some());
    assert!(read_response(&mut r).unwrap().is_some());
    assert!(read_response(&mut r).unwrap().is_none());
}

#[test]
fn missing_volume_file_is_fatal_and_caches_nothing() {
    let dir = temp_dir("session_missing_file");
    std::fs::create_dir_all(&dir).unwrap();
    let mut color_maps = BTreeMap::new();
    color_maps.insert("gray".to_string(), vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]]);
    let mut opacity_maps = BTreeMap::new();
    opacity_maps.insert("ramp".to_string(), vec![0.0, 1.0]);
    let registry = Registry::from_def(
        RegistryDef {
            datasets: vec![DatasetDef {
                name: "ghost".to_string(),
                timestep: 0,
                path: "ghost.raw".into(),
                dimensions: [3, 3, 3],
                domain: [0.0, 1.0],
            }],
            color_maps,
            opacity_maps,
        },
        &dir,
    )
    .unwrap();

    let engine: Rc<dyn Engine> = Rc::new(CpuEngine::new());
    let mut session = Session::new(engine, &registry, ServeOptions::default());
    let mut cache = ResourceCache::new();
    let mut out = Vec::new();

    let err = session
        .serve(
            &mut cache,
            Cursor::new(format!("world ghost 0 gray ramp 0\n{VIEW}render 8 8\n")),
            &mut out,
        )
        .unwrap_err();
    assert!(!err.is_recoverable());
    assert!(out.is_empty());
    let stats = cache.stats();
    assert_eq!(stats.worlds.builds, 0);
    assert_eq!(stats.volumes.builds, 0);
    assert!(session.state().world.is_none());
}
