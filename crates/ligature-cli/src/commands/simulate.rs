//! Headless session simulation.
//!
//! Builds a two-module session, drives it from a fake host and a fake LFO for
//! a number of update cycles, then exercises the undo history.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use ligature_config::{EngineConfig, default_config_path};
use ligature_core::{
    ModulationAmount, ModuleId, ModuleSubtree, ParamId, ParamUnit, Parameter, ParameterDetails, Session,
    SharedModulator,
};

/// Run a headless session.
#[derive(Args)]
pub struct SimulateArgs {
    /// Engine configuration file (defaults to the user config if present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of update cycles to run
    #[arg(short, long, default_value = "8")]
    pub blocks: usize,

    /// Sample rate in Hz (overrides the configuration)
    #[arg(short, long)]
    pub sample_rate: Option<f32>,
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut options = config.session_options();
    if let Some(rate) = args.sample_rate {
        anyhow::ensure!(rate > 0.0, "sample rate must be positive, got {rate}");
        options.sample_rate = rate;
    }
    let sample_rate = options.sample_rate;

    tracing::info!(
        sample_rate,
        block_size = config.audio.update_block_size,
        undo_capacity = options.undo_capacity,
        host_slots = options.host_slot_count,
        "session config"
    );

    let session = Session::new(options);

    let filter = session.create_module(
        "filter",
        vec![
            ParameterDetails::frequency(ParamId(1), "Cutoff", 20.0, 20000.0, 1000.0),
            ParameterDetails::continuous(ParamId(2), "Resonance", 0.0, 1.0, 0.2),
        ],
    );
    let gain = session.create_module(
        "gain",
        vec![ParameterDetails::continuous(ParamId(1), "Level", -60.0, 12.0, 0.0).with_unit(ParamUnit::Decibels)],
    );
    let cutoff = param(filter.parameter_by_name("Cutoff"), "Cutoff")?;
    let resonance = param(filter.parameter_by_name("Resonance"), "Resonance")?;
    let level = param(gain.parameter_by_name("Level"), "Level")?;
    let gain_id = gain.id;

    let filter_id = session.insert_module(ModuleId::ROOT, 0, ModuleSubtree::leaf(filter))?;
    session.insert_module(ModuleId::ROOT, 1, ModuleSubtree::leaf(gain))?;
    tracing::info!(filter = filter_id.0, gain = gain_id.0, "modules inserted");

    anyhow::ensure!(session.bind_bridge(0, Some(&cutoff), true), "no host slot 0");
    if let Some(name) = session.host_parameter_name(0) {
        tracing::info!(slot = 0, name = %name, "host slot bound");
    }
    let host = session
        .bridge(0)
        .map(Arc::clone)
        .ok_or_else(|| anyhow::anyhow!("no host slot 0"))?;

    let lfo = Arc::new(SharedModulator::new(ModulationAmount::new(0.5)));
    resonance.add_modulator(Arc::<SharedModulator>::downgrade(&lfo), None);

    for block in 0..args.blocks {
        let phase = block as f32 / args.blocks.max(1) as f32;
        host.set_value(phase);
        lfo.set_signal((phase * std::f32::consts::TAU).sin());

        let Some(updated) = session.process_block(sample_rate) else {
            tracing::warn!(block, "block skipped: graph busy");
            continue;
        };
        report_block(block, updated, &cutoff, &resonance, sample_rate);
    }

    session.begin_gesture()?;
    for value in [0.6, 0.7, 0.8] {
        session.set_parameter_value(&level, value)?;
    }
    session.process_block(sample_rate);
    tracing::info!(level = %text(&level, sample_rate), "level gesture recorded");

    session.undo()?;
    session.process_block(sample_rate);
    tracing::info!(level = %text(&level, sample_rate), "level gesture undone");

    session.redo()?;
    session.process_block(sample_rate);
    tracing::info!(level = %text(&level, sample_rate), "level gesture redone");

    session.remove_module(gain_id)?;
    tracing::info!(modules = session.with_graph(|g| g.len()), "gain removed");
    session.undo()?;
    tracing::info!(modules = session.with_graph(|g| g.len()), "gain restored");

    println!("Ran {} blocks at {} Hz", args.blocks, sample_rate);
    println!("  {:24} {}", host.name(), text(&cutoff, sample_rate));
    println!("  {:24} {}", resonance.display_name(), text(&resonance, sample_rate));
    println!("  {:24} {}", level.display_name(), text(&level, sample_rate));
    println!("  undo available: {}, redo available: {}", session.can_undo(), session.can_redo());

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<EngineConfig> {
    if let Some(path) = path {
        return Ok(EngineConfig::load(path)?);
    }
    let default_path = default_config_path();
    if default_path.is_file() {
        return Ok(EngineConfig::load(&default_path)?);
    }
    tracing::debug!("no config file, using defaults");
    Ok(EngineConfig::default())
}

fn param(parameter: Option<&Arc<Parameter>>, name: &str) -> anyhow::Result<Arc<Parameter>> {
    parameter
        .map(Arc::clone)
        .ok_or_else(|| anyhow::anyhow!("module has no parameter '{name}'"))
}

fn text(parameter: &Parameter, sample_rate: f32) -> String {
    parameter
        .details()
        .format_value(parameter.normalized_value(), sample_rate)
}

fn report_block(block: usize, updated: usize, cutoff: &Parameter, resonance: &Parameter, sample_rate: f32) {
    let hz: f32 = cutoff.internal_value(sample_rate, false);
    let res: f32 = resonance.internal_value(sample_rate, false);
    tracing::info!(block, updated, cutoff_hz = hz, resonance = res, "block processed");
}
