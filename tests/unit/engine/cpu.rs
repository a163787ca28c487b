use super::*;

use std::rc::Rc;

use crate::{
    engine::{MappedFrame, ObjectRef, PixelFormat, SharedGrid},
    foundation::core::Dims3,
};

fn engines() -> (Rc<CpuEngine>, Rc<dyn Engine>) {
    let cpu = Rc::new(CpuEngine::new());
    let engine: Rc<dyn Engine> = cpu.clone();
    (cpu, engine)
}

fn cube_volume(engine: &Rc<dyn Engine>, samples: Vec<f32>) -> ObjectRef {
    let v = ObjectRef::construct(engine, ObjectKind::Volume, "structuredRegular").unwrap();
    v.set(
        "data",
        Param::Grid(SharedGrid {
            samples: samples.into(),
            dims: Dims3([2, 2, 2]),
        }),
    )
    .unwrap();
    v.set("gridOrigin", Param::Vec3([-0.5, -0.5, -0.5])).unwrap();
    v.set("gridSpacing", Param::Vec3([1.0, 1.0, 1.0])).unwrap();
    v.commit().unwrap();
    v
}

fn wrap_world(engine: &Rc<dyn Engine>, slot: &str, model: &ObjectRef) -> ObjectRef {
    let group = ObjectRef::construct(engine, ObjectKind::Group, "group").unwrap();
    group.set_objects(slot, &[model]).unwrap();
    group.commit().unwrap();
    let inst = ObjectRef::construct(engine, ObjectKind::Instance, "instance").unwrap();
    inst.set_object("group", &group).unwrap();
    inst.commit().unwrap();
    let world = ObjectRef::construct(engine, ObjectKind::World, "world").unwrap();
    world.set_objects("instance", &[&inst]).unwrap();
    world.commit().unwrap();
    world
}

fn camera(engine: &Rc<dyn Engine>, position: [f32; 3], direction: [f32; 3]) -> ObjectRef {
    let c = ObjectRef::construct(engine, ObjectKind::Camera, "perspective").unwrap();
    c.set("position", Param::Vec3(position)).unwrap();
    c.set("direction", Param::Vec3(direction)).unwrap();
    c.set("up", Param::Vec3([0.0, 1.0, 0.0])).unwrap();
    c.set("fovy", Param::Float(90.0)).unwrap();
    c.commit().unwrap();
    c
}

fn renderer(engine: &Rc<dyn Engine>) -> ObjectRef {
    let r = ObjectRef::construct(engine, ObjectKind::Renderer, "ao").unwrap();
    r.set("backgroundColor", Param::Vec4([0.0, 0.0, 1.0, 1.0]))
        .unwrap();
    r.set("volumeSamplingRate", Param::Float(4.0)).unwrap();
    r.commit().unwrap();
    r
}

fn frame(engine: &Rc<dyn Engine>) -> ObjectRef {
    ObjectRef::frame_buffer(
        engine,
        FrameBufferDesc {
            width: 4,
            height: 4,
            format: PixelFormat::Rgba8,
        },
    )
    .unwrap()
}

fn pixel(pixels: &[u8], x: usize, y: usize) -> [u8; 4] {
    let i = (y * 4 + x) * 4;
    [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
}

fn red_volume_world(engine: &Rc<dyn Engine>) -> ObjectRef {
    let vol = cube_volume(engine, vec![1.0; 8]);
    let tf = ObjectRef::construct(engine, ObjectKind::TransferFunction, "piecewiseLinear").unwrap();
    tf.set("color", Param::Vec3s(vec![[1.0, 0.0, 0.0]].into()))
        .unwrap();
    tf.set("opacity", Param::Floats(vec![1.0].into())).unwrap();
    tf.set("value", Param::Box1([0.0, 1.0])).unwrap();
    tf.commit().unwrap();
    let model = ObjectRef::construct(engine, ObjectKind::VolumetricModel, "volume").unwrap();
    model.set_object("volume", &vol).unwrap();
    model.set_object("transferFunction", &tf).unwrap();
    model.commit().unwrap();
    wrap_world(engine, "volume", &model)
}

#[test]
fn clone_retains_and_drop_releases_once() {
    let (cpu, engine) = engines();
    let v = cube_volume(&engine, vec![0.0; 8]);
    assert_eq!(cpu.refcount(v.id()), Some(1));

    let v2 = v.clone();
    assert_eq!(cpu.refcount(v.id()), Some(2));
    drop(v2);
    assert_eq!(cpu.refcount(v.id()), Some(1));

    let id = v.id();
    drop(v);
    assert_eq!(cpu.refcount(id), None);
    assert_eq!(cpu.live_objects(), 0);
}

#[test]
fn referenced_objects_outlive_their_handles() {
    let (cpu, engine) = engines();
    let world = red_volume_world(&engine);
    // Every intermediate handle was dropped inside the builder; the world keeps the chain alive.
    assert_eq!(cpu.live_objects(), 6);

    drop(world);
    assert_eq!(cpu.live_objects(), 0);
}

#[test]
fn replacing_a_parameter_releases_the_old_reference() {
    let (cpu, engine) = engines();
    let a = cube_volume(&engine, vec![0.0; 8]);
    let b = cube_volume(&engine, vec![1.0; 8]);
    let model = ObjectRef::construct(&engine, ObjectKind::VolumetricModel, "volume").unwrap();

    model.set_object("volume", &a).unwrap();
    assert_eq!(cpu.refcount(a.id()), Some(2));
    model.commit().unwrap();
    assert_eq!(cpu.refcount(a.id()), Some(3));

    model.set_object("volume", &b).unwrap();
    model.commit().unwrap();
    assert_eq!(cpu.refcount(a.id()), Some(1));
    assert_eq!(cpu.refcount(b.id()), Some(3));
}

#[test]
fn unsupported_type_tags_are_rejected() {
    let (cpu, engine) = engines();
    let err = ObjectRef::construct(&engine, ObjectKind::Renderer, "pathtracer").unwrap_err();
    assert!(matches!(err, VolserveError::Engine(_)));
    assert!(ObjectRef::construct(&engine, ObjectKind::Volume, "unstructured").is_err());
    assert!(ObjectRef::construct(&engine, ObjectKind::Renderer, "scivis").is_err());
    assert_eq!(cpu.live_objects(), 0);

    assert!(
        engine
            .new_frame_buffer(FrameBufferDesc {
                width: 0,
                height: 4,
                format: PixelFormat::Rgba8,
            })
            .is_err()
    );
}

#[test]
fn set_param_on_unknown_handle_does_not_leak_references() {
    let (cpu, engine) = engines();
    let v = cube_volume(&engine, vec![0.0; 8]);
    assert!(
        engine
            .set_param(ObjectId(999), "volume", Param::Object(v.id()))
            .is_err()
    );
    assert_eq!(cpu.refcount(v.id()), Some(1));
}

#[test]
fn render_requires_committed_objects() {
    let (cpu, engine) = engines();
    let world = red_volume_world(&engine);
    let cam = ObjectRef::construct(&engine, ObjectKind::Camera, "perspective").unwrap();
    let r = renderer(&engine);
    let fb = frame(&engine);

    let err = engine
        .render_frame(fb.id(), r.id(), cam.id(), world.id())
        .unwrap_err();
    assert!(err.to_string().contains("never committed"));

    let err = engine
        .render_frame(fb.id(), cam.id(), r.id(), world.id())
        .unwrap_err();
    assert!(matches!(err, VolserveError::Engine(_)));
    assert_eq!(cpu.frames_rendered(), 0);
}

#[test]
fn volume_render_hits_center_and_misses_corners() {
    let (cpu, engine) = engines();
    let world = red_volume_world(&engine);
    let cam = camera(&engine, [0.0, 0.0, -2.0], [0.0, 0.0, 1.0]);
    let r = renderer(&engine);
    let fb = frame(&engine);

    engine
        .render_frame(fb.id(), r.id(), cam.id(), world.id())
        .unwrap();
    assert_eq!(cpu.frames_rendered(), 1);

    let mapped = MappedFrame::map(&fb).unwrap();
    assert_eq!(mapped.pixels().len(), 4 * 4 * 4);
    assert_eq!(pixel(mapped.pixels(), 2, 2), [255, 0, 0, 255]);
    assert_eq!(pixel(mapped.pixels(), 0, 0), [0, 0, 255, 255]);
}

#[test]
fn rendering_is_deterministic() {
    let (_cpu, engine) = engines();
    let world = red_volume_world(&engine);
    let cam = camera(&engine, [0.3, 0.2, -2.0], [0.0, 0.0, 1.0]);
    let r = renderer(&engine);
    let fb = frame(&engine);

    engine
        .render_frame(fb.id(), r.id(), cam.id(), world.id())
        .unwrap();
    let first = MappedFrame::map(&fb).unwrap().pixels().to_vec();
    engine
        .render_frame(fb.id(), r.id(), cam.id(), world.id())
        .unwrap();
    let second = MappedFrame::map(&fb).unwrap().pixels().to_vec();
    assert_eq!(first, second);
}

#[test]
fn isosurface_render_is_opaque_where_the_field_crosses() {
    let (_cpu, engine) = engines();
    // Value increases along x: 0 on the -x face, 1 on the +x face.
    let vol = cube_volume(&engine, vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
    let geom = ObjectRef::construct(&engine, ObjectKind::Geometry, "isosurface").unwrap();
    geom.set_object("volume", &vol).unwrap();
    geom.set("isovalue", Param::Floats(vec![0.5].into()))
        .unwrap();
    geom.commit().unwrap();
    let mat = ObjectRef::construct(&engine, ObjectKind::Material, "obj").unwrap();
    mat.set("kd", Param::Vec3([1.0, 1.0, 1.0])).unwrap();
    mat.commit().unwrap();
    let model = ObjectRef::construct(&engine, ObjectKind::GeometricModel, "geometry").unwrap();
    model.set_object("geometry", &geom).unwrap();
    model.set_object("material", &mat).unwrap();
    model.commit().unwrap();
    let world = wrap_world(&engine, "geometry", &model);

    let cam = camera(&engine, [-2.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
    let r = renderer(&engine);
    let fb = frame(&engine);
    engine
        .render_frame(fb.id(), r.id(), cam.id(), world.id())
        .unwrap();

    let mapped = MappedFrame::map(&fb).unwrap();
    let center = pixel(mapped.pixels(), 2, 2);
    assert_eq!(center[3], 255);
    assert!(center[0] > 0 && center[0] == center[1] && center[1] == center[2]);
    assert_eq!(pixel(mapped.pixels(), 0, 0), [0, 0, 255, 255]);
}
