use std::{path::PathBuf, rc::Rc};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use volserve::{
    CpuEngine, Engine, GridConvention, ImageFormat, Registry, RendererSettings, ResourceCache,
    ServeOptions, Session, registry::DEFAULT_DATA_ROOT,
};

#[derive(Parser, Debug)]
#[command(name = "volserve", version)]
/// Read render commands on stdin, write framed images on stdout.
struct Cli {
    /// JSON registry file replacing the built-in dataset and palette tables.
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Directory holding the built-in datasets.
    #[arg(long, default_value = DEFAULT_DATA_ROOT)]
    data_root: PathBuf,

    /// Output image codec.
    #[arg(long, value_enum, default_value_t = FormatChoice::Jpeg)]
    format: FormatChoice,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = 95)]
    quality: u8,

    /// World-space placement of volume grids.
    #[arg(long, value_enum, default_value_t = GridChoice::UnitCube)]
    grid: GridChoice,

    #[arg(long, default_value_t = 1)]
    pixel_samples: i32,

    #[arg(long, default_value_t = 1.0)]
    volume_sampling_rate: f32,

    #[arg(long, default_value_t = 0)]
    ao_samples: i32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Jpeg,
    Png,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GridChoice {
    UnitCube,
    Voxel,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("volserve: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let registry = match &cli.registry {
        Some(path) => Registry::load(path)
            .with_context(|| format!("load registry '{}'", path.display()))?,
        None => Registry::builtin(&cli.data_root)?,
    };
    tracing::info!(
        datasets = registry.datasets().len(),
        color_maps = registry.palettes().color_names().count(),
        opacity_maps = registry.palettes().opacity_names().count(),
        "registry loaded"
    );

    let format = match cli.format {
        FormatChoice::Jpeg => ImageFormat::jpeg(cli.quality)?,
        FormatChoice::Png => ImageFormat::Png,
    };
    let grid = match cli.grid {
        GridChoice::UnitCube => GridConvention::UnitCube,
        GridChoice::Voxel => GridConvention::Voxel,
    };
    let options = ServeOptions {
        format,
        grid,
        renderer: RendererSettings {
            pixel_samples: cli.pixel_samples,
            volume_sampling_rate: cli.volume_sampling_rate,
            ao_samples: cli.ao_samples,
        },
    };

    let engine: Rc<dyn Engine> = Rc::new(CpuEngine::new());
    let mut cache = ResourceCache::new();
    let mut session = Session::new(engine, &registry, options);

    let stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    session.serve(&mut cache, stdin, &mut stdout)?;
    Ok(())
}
