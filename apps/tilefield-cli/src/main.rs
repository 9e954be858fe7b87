use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use glam::Vec3;
use tilefield_assets::{MaterialLibrary, MaterialParams};
use tilefield_render::{DebugTextRenderer, DisplayContext, Renderer};
use tilefield_stream::{DEFAULT_TILE_MATERIAL, FnHooks, TileConfig, TileManager};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tilefield-cli", about = "CLI tool for tilefield operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Walk the center across the grid and report what each step did
    Simulate {
        #[command(flatten)]
        setup: Setup,
        /// Number of steps to take
        #[arg(short, long, default_value = "20")]
        steps: usize,
        /// World units moved along x and z per step
        #[arg(long, default_value = "10")]
        stride: f32,
        /// Run a compression pass after every step
        #[arg(short, long)]
        compress: bool,
        /// Print the scene outline at the end, listing at most this many nodes
        #[arg(long)]
        dump: Option<usize>,
    },
    /// Build the window around a point, compress it, and write each batch as JSON
    Export {
        #[command(flatten)]
        setup: Setup,
        /// Output directory
        #[arg(short, long, default_value = "batches")]
        out: PathBuf,
        /// Center of the window
        #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [0.0, 0.0, 0.0])]
        at: Vec<f32>,
    },
}

#[derive(Args)]
struct Setup {
    /// JSON tile configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON material library used as display defaults
    #[arg(long)]
    materials: Option<PathBuf>,
    #[arg(short, long)]
    range: Option<u32>,
    #[arg(short, long)]
    tile_size: Option<f32>,
    /// Alternate red and white tiles instead of a single material
    #[arg(long)]
    checkerboard: bool,
}

impl Setup {
    fn config(&self) -> anyhow::Result<TileConfig> {
        let mut config = match &self.config {
            Some(path) => TileConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => TileConfig::default(),
        };
        if let Some(range) = self.range {
            config.range = range;
        }
        if let Some(tile_size) = self.tile_size {
            config.tile_size = tile_size;
        }
        config.validate()?;
        Ok(config)
    }

    fn display(&self) -> anyhow::Result<DisplayContext> {
        let mut defaults = match &self.materials {
            Some(path) => MaterialLibrary::load(path)
                .with_context(|| format!("loading materials {}", path.display()))?,
            None => MaterialLibrary::new(),
        };
        let builtin = [
            (DEFAULT_TILE_MATERIAL, MaterialParams::new()),
            ("red", MaterialParams::new().color(0.8, 0.1, 0.1)),
            ("white", MaterialParams::new()),
        ];
        for (name, params) in builtin {
            if !defaults.contains(name) {
                defaults.define(name, params);
            }
        }
        Ok(DisplayContext::with_defaults(defaults))
    }

    fn hooks(&self) -> FnHooks {
        if !self.checkerboard {
            return FnHooks::new();
        }
        FnHooks::new().material(|c| {
            let name = if (c.i + c.j + c.k).rem_euclid(2) == 1 { "red" } else { "white" };
            name.to_string()
        })
    }
}

fn simulate(
    setup: &Setup,
    steps: usize,
    stride: f32,
    compress: bool,
    dump: Option<usize>,
) -> anyhow::Result<()> {
    let config = setup.config()?;
    println!(
        "Simulate: tile_size={}, range={}, window={} tiles, steps={steps}",
        config.tile_size,
        config.range,
        config.window_tile_count().unwrap_or(0)
    );

    let mut ctx = setup.display()?;
    let scene = ctx.create("main");
    let mut tiles = TileManager::with_hooks(config, setup.hooks())?;

    for step in 0..=steps {
        let offset = step as f32 * stride;
        let stats = tiles.reposition(Vec3::new(offset, 0.0, offset), scene)?;
        let compressed = if compress {
            tiles.compress(scene).tiles_compressed
        } else {
            0
        };
        println!(
            "step {step:>3}: center={} moved={} +{} ~{} -{} evicted={} compressed={} total={} ({:?})",
            stats.center,
            stats.moved,
            stats.created,
            stats.reactivated,
            stats.deactivated,
            stats.evicted + stats.batches_evicted,
            stats.compressed + compressed,
            tiles.store().len(),
            stats.elapsed,
        );
        let events = scene.drain_events();
        tracing::debug!(step, events = events.len(), "scene events drained");
    }

    let frame = scene.update_pass();
    println!(
        "Final: tiles={} active={} batches={} draw_calls={} vertices={}",
        tiles.store().len(),
        tiles.store().active_count(),
        tiles.batches().len(),
        frame.draw_calls,
        frame.vertices
    );
    println!(
        "Reposition timing: avg={:?} max={:?} over {} calls",
        tiles.timer().average(),
        tiles.timer().max(),
        tiles.timer().count()
    );
    let passes = tiles.compression().timer();
    println!(
        "Compression: {} passes, {} over the {:?} budget",
        passes.passes(),
        passes.overruns(),
        passes.budget().unwrap_or_default()
    );

    if let Some(limit) = dump {
        print!("{}", DebugTextRenderer::with_limit(limit).render(scene));
    }
    Ok(())
}

fn export(setup: &Setup, out: &Path, at: &[f32]) -> anyhow::Result<()> {
    let config = TileConfig {
        compression_cooldown_ms: 0,
        ..setup.config()?
    };
    let center = match at {
        [x, y, z] => Vec3::new(*x, *y, *z),
        _ => anyhow::bail!("--at takes exactly three values"),
    };

    let mut ctx = setup.display()?;
    let scene = ctx.create("export");
    let mut tiles = TileManager::with_hooks(config, setup.hooks())?;
    tiles.reposition(center, scene)?;
    let report = tiles.compress(scene);
    if report.groups_deferred > 0 {
        tracing::warn!(
            deferred = report.groups_deferred,
            "compression budget ran out; some tiles were not exported"
        );
    }

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    for (n, batch) in tiles.batches().iter().enumerate() {
        let name = batch.material.replace(char::is_whitespace, "_");
        let path = out.join(format!("batch-{n:02}-{name}.json"));
        batch.geometry.to_flat().save(&path)?;
        println!(
            "{}: material={} tiles={} vertices={} origin=({:.1}, {:.1}, {:.1})",
            path.display(),
            batch.material,
            batch.tiles.len(),
            batch.geometry.vertex_count(),
            batch.origin.x,
            batch.origin.y,
            batch.origin.z
        );
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match &cli.command {
        Commands::Info => {
            println!("tilefield-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", tilefield_common::crate_info());
            println!("assets: {}", tilefield_assets::crate_info());
            println!("render: {}", tilefield_render::crate_info());
            println!("stream: {}", tilefield_stream::crate_info());
            let config = TileConfig::default();
            println!(
                "defaults: tile_size={} range={} window={} tiles",
                config.tile_size,
                config.range,
                config.window_tile_count().unwrap_or(0)
            );
        }
        Commands::Simulate {
            setup,
            steps,
            stride,
            compress,
            dump,
        } => simulate(setup, *steps, *stride, *compress, *dump)?,
        Commands::Export { setup, out, at } => export(setup, out, at)?,
    }

    Ok(())
}
