//! Command dispatcher.
//!
//! A [`Session`] reads commands until the input ends, keeping one current camera, renderer, world
//! and frame buffer. Recoverable errors (unknown names, malformed commands) are logged and the
//! command is abandoned with the session state untouched; any other error ends the session.

use std::{
    io::{BufRead, Write},
    rc::Rc,
    time::Instant,
};

use crate::{
    cache::{FrameBufferKey, ResourceCache},
    encode::{ImageEncoder, ImageFormat},
    engine::{Engine, FrameBufferDesc, MappedFrame, ObjectKind, ObjectRef, Param, PixelFormat},
    foundation::error::{VolserveError, VolserveResult},
    protocol::{CameraPose, Command, TokenReader, write_response},
    registry::Registry,
    scene::{GridConvention, SceneBuilder, WorldRequest},
};

const CAMERA_TYPE: &str = "perspective";
const RENDERER_TYPE: &str = "ao";
const CAMERA_FOVY: f32 = 90.0;

/// Sampling parameters applied on every `renderer` command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererSettings {
    pub pixel_samples: i32,
    pub volume_sampling_rate: f32,
    pub ao_samples: i32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            pixel_samples: 1,
            volume_sampling_rate: 1.0,
            ao_samples: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ServeOptions {
    pub format: ImageFormat,
    pub grid: GridConvention,
    pub renderer: RendererSettings,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Commands read, including skipped ones.
    pub commands: u64,
    /// Commands abandoned after a recoverable error.
    pub skipped: u64,
    /// Frames written to the output.
    pub frames: u64,
}

/// Handles used by the next `render`.
#[derive(Debug, Default)]
pub struct SessionState {
    pub camera: Option<ObjectRef>,
    pub renderer: Option<ObjectRef>,
    pub world: Option<ObjectRef>,
    pub frame_buffer: Option<ObjectRef>,
}

pub struct Session<'a> {
    engine: Rc<dyn Engine>,
    registry: &'a Registry,
    options: ServeOptions,
    encoder: ImageEncoder,
    state: SessionState,
}

impl<'a> Session<'a> {
    pub fn new(engine: Rc<dyn Engine>, registry: &'a Registry, options: ServeOptions) -> Self {
        Self {
            engine,
            registry,
            options,
            encoder: ImageEncoder::new(options.format),
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn options(&self) -> &ServeOptions {
        &self.options
    }

    /// Run the command loop until `input` is exhausted.
    pub fn serve<R: BufRead, W: Write + ?Sized>(
        &mut self,
        cache: &mut ResourceCache,
        input: R,
        output: &mut W,
    ) -> VolserveResult<ServeStats> {
        let mut tokens = TokenReader::new(input);
        let mut stats = ServeStats::default();

        loop {
            let cmd = match Command::read(&mut tokens) {
                Ok(Some(cmd)) => cmd,
                Ok(None) => break,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, "skipping command");
                    stats.commands += 1;
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            stats.commands += 1;
            let name = cmd.name();
            let is_render = matches!(cmd, Command::Render { .. });
            match self.execute(cache, cmd, output) {
                Ok(()) if is_render => stats.frames += 1,
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(command = name, error = %e, "skipping command");
                    stats.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            commands = stats.commands,
            skipped = stats.skipped,
            frames = stats.frames,
            "command stream ended"
        );
        Ok(stats)
    }

    /// Apply one command; `render` writes a frame to `output`.
    pub fn execute<W: Write + ?Sized>(
        &mut self,
        cache: &mut ResourceCache,
        cmd: Command,
        output: &mut W,
    ) -> VolserveResult<()> {
        match cmd {
            Command::World(req) => self.world(cache, &req),
            Command::Camera(pose) => self.camera(cache, &pose),
            Command::Renderer(rgba) => self.renderer(cache, rgba),
            Command::Render { width, height } => self.render(cache, width, height, output),
        }
    }

    fn world(&mut self, cache: &mut ResourceCache, req: &WorldRequest) -> VolserveResult<()> {
        let built = SceneBuilder::new(&self.engine, self.registry, self.options.grid)
            .world(cache, req)?;
        tracing::debug!(volume = %req.volume, mode = ?built.mode(), "world selected");
        self.state.world = Some(built.world().clone());
        Ok(())
    }

    fn camera(&mut self, cache: &mut ResourceCache, pose: &CameraPose) -> VolserveResult<()> {
        let engine = &self.engine;
        let camera = cache.cameras.update_or_try_insert_with(
            CAMERA_TYPE.to_string(),
            || ObjectRef::construct(engine, ObjectKind::Camera, CAMERA_TYPE),
            |cam| {
                cam.set("position", Param::Vec3(pose.position))?;
                cam.set("up", Param::Vec3(pose.up))?;
                cam.set("direction", Param::Vec3(pose.direction))?;
                cam.set("imageStart", Param::Vec2(pose.image_start))?;
                cam.set("imageEnd", Param::Vec2(pose.image_end))?;
                cam.set("fovy", Param::Float(CAMERA_FOVY))?;
                cam.commit()
            },
        )?;
        self.state.camera = Some(camera.clone());
        Ok(())
    }

    fn renderer(&mut self, cache: &mut ResourceCache, rgba: [u8; 4]) -> VolserveResult<()> {
        let engine = &self.engine;
        let settings = self.options.renderer;
        let background = rgba.map(|c| f32::from(c) / 255.0);
        let renderer = cache.renderers.update_or_try_insert_with(
            RENDERER_TYPE.to_string(),
            || ObjectRef::construct(engine, ObjectKind::Renderer, RENDERER_TYPE),
            |r| {
                r.set("backgroundColor", Param::Vec4(background))?;
                r.set("pixelSamples", Param::Int(settings.pixel_samples))?;
                r.set(
                    "volumeSamplingRate",
                    Param::Float(settings.volume_sampling_rate),
                )?;
                r.set("aoSamples", Param::Int(settings.ao_samples))?;
                r.commit()
            },
        )?;
        self.state.renderer = Some(renderer.clone());
        Ok(())
    }

    #[tracing::instrument(skip(self, cache, output))]
    fn render<W: Write + ?Sized>(
        &mut self,
        cache: &mut ResourceCache,
        width: u32,
        height: u32,
        output: &mut W,
    ) -> VolserveResult<()> {
        let (Some(camera), Some(renderer), Some(world)) =
            (&self.state.camera, &self.state.renderer, &self.state.world)
        else {
            return Err(VolserveError::engine(
                "render before camera, renderer and world were set",
            ));
        };

        let engine = &self.engine;
        let fb = cache
            .frame_buffers
            .get_or_try_insert_with(FrameBufferKey { width, height }, || {
                ObjectRef::frame_buffer(
                    engine,
                    FrameBufferDesc {
                        width,
                        height,
                        format: PixelFormat::Rgba8,
                    },
                )
            })?
            .clone();

        let start = Instant::now();
        self.engine
            .render_frame(fb.id(), renderer.id(), camera.id(), world.id())?;
        let render_time = start.elapsed();

        let start = Instant::now();
        let len = {
            let mapped = MappedFrame::map(&fb)?;
            self.encoder.encode(mapped.pixels(), width, height)?
        };
        let encode_time = start.elapsed();

        let header = write_response(output, render_time, encode_time, &self.encoder.bytes()[..len])?;
        tracing::debug!(
            bytes = header.image_len,
            render_us = header.render_micros,
            encode_us = header.encode_micros,
            "frame sent"
        );
        self.state.frame_buffer = Some(fb);
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/session.rs"]
mod tests;
