//! Stereo EQ - a real-time stereo parametric equalizer
//!
//! Entry point: runs the equalizer on the default output device, fed by a
//! white-noise source, while the analyzer renders spectrum paths.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use parking_lot::Mutex;

use stereo_eq::analyzer::{Channel, Rect, RenderTimer, SpectrumAnalyzer};
use stereo_eq::config::EqConfig;
use stereo_eq::dsp::ParameterStore;
use stereo_eq::engine::{AudioEngine, EqProcessor};
use stereo_eq::persistence;

#[derive(Parser)]
#[command(name = "stereo-eq", about = "Real-time stereo parametric EQ")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// How long to run, in seconds
    #[arg(short, long, default_value_t = 5)]
    seconds: u64,
    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
    /// Load a saved state blob before starting
    #[arg(long)]
    state: Option<PathBuf>,
    /// Write the final state blob to this file
    #[arg(long)]
    save_state: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EqConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EqConfig::default(),
    };
    let order = config.fft_order()?;

    let mut engine = AudioEngine::new().context("opening audio output")?;
    if cli.list_devices {
        for device in engine.enumerate_devices() {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}: {}{}", device.index, device.name, marker);
        }
        return Ok(());
    }

    let parameters = Arc::new(ParameterStore::new());
    if let Some(path) = &cli.state {
        persistence::load_from_file(&parameters, path)
            .with_context(|| format!("loading state {}", path.display()))?;
    }

    for (id, definition) in parameters.definitions() {
        debug!(
            "{}: {}",
            definition.name,
            definition.display_value(parameters.get(id))
        );
    }

    let processor = EqProcessor::new(Arc::clone(&parameters), order);
    let inputs = engine
        .start(processor, config.engine.block_size, config.engine.noise_seed)?
        .context("analyzer inputs already taken")?;

    let mut analyzer =
        SpectrumAnalyzer::new(Arc::clone(&parameters), inputs, order, config.path_builder());
    analyzer.set_bounds(Rect::new(0.0, 0.0, 800.0, 400.0));
    let analyzer = Arc::new(Mutex::new(analyzer));
    let mut timer = RenderTimer::start(Arc::clone(&analyzer), config.analyzer.refresh_hz)
        .context("starting render timer")?;

    thread::sleep(Duration::from_secs(cli.seconds));

    timer.stop();
    engine.stop()?;

    let (peak, rms) = engine.output_level();
    info!("output level: peak {:.3}, rms {:.3}", peak, rms);

    {
        let analyzer = analyzer.lock();
        info!(
            "processed {} blocks; last paths: left {} / right {} vertices",
            engine.blocks_processed(),
            analyzer.latest_path(Channel::Left).len(),
            analyzer.latest_path(Channel::Right).len()
        );
    }

    if let Some(path) = &cli.save_state {
        persistence::save_to_file(&parameters, path)
            .with_context(|| format!("saving state {}", path.display()))?;
        info!("state saved to {}", path.display());
    }

    Ok(())
}
