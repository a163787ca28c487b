use std::{fmt::Display, io::BufRead, str::FromStr};

use crate::{
    foundation::{
        core::{Vec2, Vec3},
        error::{VolserveError, VolserveResult},
    },
    protocol::token::TokenReader,
    scene::WorldRequest,
};

/// View parameters of a `camera` command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub position: Vec3,
    pub up: Vec3,
    pub direction: Vec3,
    pub image_start: Vec2,
    pub image_end: Vec2,
}

impl CameraPose {
    /// Reject poses that cannot span a view basis: non-finite components, a zero direction, or
    /// `up` parallel to `direction`.
    pub fn validate(&self) -> VolserveResult<()> {
        let finite = self
            .position
            .iter()
            .chain(&self.up)
            .chain(&self.direction)
            .chain(&self.image_start)
            .chain(&self.image_end)
            .all(|v| v.is_finite());
        if !finite {
            return Err(VolserveError::protocol(
                "'camera': all components must be finite",
            ));
        }
        let forward = glam::Vec3::from_array(self.direction)
            .try_normalize()
            .ok_or_else(|| VolserveError::protocol("'camera': direction must be non-zero"))?;
        if forward
            .cross(glam::Vec3::from_array(self.up))
            .try_normalize()
            .is_none()
        {
            return Err(VolserveError::protocol(
                "'camera': up must not be parallel to direction",
            ));
        }
        Ok(())
    }
}

/// One parsed input command.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    World(WorldRequest),
    Camera(CameraPose),
    /// Background color, one byte per RGBA channel.
    Renderer([u8; 4]),
    Render { width: u32, height: u32 },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::World(_) => "world",
            Command::Camera(_) => "camera",
            Command::Renderer(_) => "renderer",
            Command::Render { .. } => "render",
        }
    }

    /// Read the next command, `None` at a clean end of stream.
    ///
    /// All of a command's arguments are consumed as raw bytes before any is validated, so a
    /// malformed argument (including invalid UTF-8) yields a [`VolserveError::Protocol`] with the
    /// stream positioned at the next command. `world` validates its iso-value count first, since
    /// the count fixes how many tokens follow. An unknown keyword consumes only itself.
    pub fn read<R: BufRead>(tokens: &mut TokenReader<R>) -> VolserveResult<Option<Command>> {
        let Some(keyword) = tokens.next_token()? else {
            return Ok(None);
        };
        let cmd = match keyword.as_str() {
            "world" => Self::read_world(tokens)?,
            "camera" => {
                let args = take(tokens, "camera", 13)?;
                let f = |i: usize| parse::<f32>("camera", "float", &args[i]);
                let pose = CameraPose {
                    position: [f(0)?, f(1)?, f(2)?],
                    up: [f(3)?, f(4)?, f(5)?],
                    direction: [f(6)?, f(7)?, f(8)?],
                    image_start: [f(9)?, f(10)?],
                    image_end: [f(11)?, f(12)?],
                };
                pose.validate()?;
                Command::Camera(pose)
            }
            "renderer" => {
                let args = take(tokens, "renderer", 4)?;
                let mut rgba = [0u8; 4];
                for (c, a) in rgba.iter_mut().zip(&args) {
                    let v = parse::<i64>("renderer", "integer", a)?;
                    *c = u8::try_from(v).map_err(|_| {
                        VolserveError::protocol(format!(
                            "'renderer': color channel {v} outside 0-255"
                        ))
                    })?;
                }
                Command::Renderer(rgba)
            }
            "render" => {
                let args = take(tokens, "render", 2)?;
                let width = parse::<i64>("render", "integer", &args[0])?;
                let height = parse::<i64>("render", "integer", &args[1])?;
                let size = |v: i64| {
                    u32::try_from(v).ok().filter(|v| *v > 0).ok_or_else(|| {
                        VolserveError::protocol(format!(
                            "'render': size must be positive, got {width}x{height}"
                        ))
                    })
                };
                Command::Render {
                    width: size(width)?,
                    height: size(height)?,
                }
            }
            other => {
                return Err(VolserveError::protocol(format!(
                    "unknown command '{other}'"
                )));
            }
        };
        Ok(Some(cmd))
    }

    fn read_world<R: BufRead>(tokens: &mut TokenReader<R>) -> VolserveResult<Command> {
        let args = take(tokens, "world", 5)?;
        // The count decides how many more tokens belong to this command, so it is checked first.
        let count = parse::<u32>("world", "iso-value count", &args[4])?;
        let isos = take(tokens, "world", count as usize)?;

        let timestep = parse::<i32>("world", "integer", &args[1])?;
        let isovalues = isos
            .iter()
            .map(|t| parse::<f32>("world", "float", t))
            .collect::<VolserveResult<Vec<_>>>()?;

        Ok(Command::World(WorldRequest {
            volume: text("world", &args[0])?.to_owned(),
            timestep,
            color_map: text("world", &args[2])?.to_owned(),
            opacity_map: text("world", &args[3])?.to_owned(),
            isovalues,
        }))
    }
}

fn take<R: BufRead>(
    tokens: &mut TokenReader<R>,
    command: &str,
    n: usize,
) -> VolserveResult<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    while out.len() < n {
        match tokens.next_raw()? {
            Some(t) => out.push(t.to_vec()),
            None => {
                return Err(VolserveError::truncated(format!(
                    "'{command}' needs {n} more arguments, stream ended after {}",
                    out.len()
                )));
            }
        }
    }
    Ok(out)
}

fn text<'a>(command: &str, token: &'a [u8]) -> VolserveResult<&'a str> {
    std::str::from_utf8(token).map_err(|_| {
        VolserveError::protocol(format!("'{command}': argument is not valid UTF-8"))
    })
}

fn parse<T>(command: &str, what: &str, token: &[u8]) -> VolserveResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    let token = text(command, token)?;
    let v = token.parse::<T>().map_err(|e| {
        VolserveError::protocol(format!("'{command}': invalid {what} '{token}': {e}"))
    })?;
    Ok(v)
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/command.rs"]
mod tests;
