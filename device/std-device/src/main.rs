use clap::Parser;
use common::config::Config;
use common::control_loop::{ControlLoop, InputPorts};
use common::params::storage::{FlashParamStore, ParamStore};
use common::scheduler::{LoopScheduler, MotorOutput};
use common::sync::watch::Watch;
use common::types::measurements::AxisSample;
use common::types::rc::RcInput;

mod clock;
mod pilot;

use clock::SimClock;
use pilot::{Pilot, Script};

type E = Box<dyn std::error::Error>;

/// Ticks between two radio frames
const RC_DIVIDER: u64 = 5;

/// Ticks between two battery readings
const BATTERY_DIVIDER: u64 = 10;

#[derive(Parser, Debug)]
#[command(version, about = "Fly the whoop flight core against a simulated vehicle")]
struct Args {
    /// Path to the simulation configuration file
    #[arg(short, long, default_value = "sim_config.toml")]
    config: String,

    /// Path to a flight core configuration file, defaults if absent
    #[arg(long)]
    core: Option<String>,

    /// Scripted pilot input
    #[arg(short, long, value_enum, default_value_t = Script::Hover)]
    script: Script,

    /// Duration of the flight [s]
    #[arg(short, long, default_value_t = 6.0)]
    duration: f32,

    /// Keep pace with the wall clock
    #[arg(long)]
    realtime: bool,
}

fn setup_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_nanos()
        .init();
}

fn load_core_config(path: Option<&str>) -> Result<Config, E> {
    match path {
        Some(path) => Ok(toml::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(Config::const_default()),
    }
}

fn main() -> Result<(), E> {
    setup_logging();
    let args = Args::parse();

    let sim_config = whoop_sim::config::load_from_file_path(&args.config)?;
    let core_config = load_core_config(args.core.as_deref())?;
    log::info!("Simulating at {} Hz with seed {}", 1.0 / sim_config.step_dt, sim_config.seed);

    let (mut res, sim) = whoop_sim::initialize(&sim_config)?;
    let mut store = FlashParamStore::new(res.flash, 0);
    let mut ctrl = ControlLoop::with_store(core_config, &mut store)?;

    let sensor = Watch::<AxisSample>::new();
    let radio = Watch::<RcInput>::new();
    let battery = Watch::<f32>::new();
    let (mut sensor_tx, mut radio_tx, mut battery_tx) = (sensor.sender(), radio.sender(), battery.sender());
    let mut ports = InputPorts {
        sensor: sensor.receiver(),
        rc: radio.receiver(),
        battery: battery.receiver(),
    };

    let period_us = ctrl.config().loop_period_us;
    let clock = SimClock::new(sim.clone(), sim_config.step_dt, args.realtime);
    let mut scheduler = LoopScheduler::new(clock, period_us);
    let pilot = Pilot::new(args.script, args.duration);
    let mut drain_at = pilot.drain_at();

    let ticks = (args.duration * 1e6 / period_us as f32).round() as u64;
    let status_every = (1e6 / period_us as f32).round().max(1.0) as u64;

    for tick in 0..ticks {
        let timing = scheduler.wait_next();
        let t = timing.start_us as f32 * 1e-6;

        if drain_at.is_some_and(|at| t >= at) {
            log::info!("[{t:.3}] Draining the battery");
            sim.set_battery_soc(0.0);
            drain_at = None;
        }

        sensor_tx.send(res.imu.read());
        if tick % RC_DIVIDER == 0 {
            radio_tx.send(pilot.rc(t));
        }
        if tick % BATTERY_DIVIDER == 0 {
            battery_tx.send(res.battery.read());
        }

        let out = ctrl.tick(&ports.poll(timing.overran));
        res.motors.write(&out.motors);

        for event in &out.events {
            log::info!("[{t:.3}] {event:?}");
        }

        if let Some(outcome) = ctrl.idle(&mut store) {
            log::info!("[{t:.3}] {outcome:?}");
        }

        if tick % status_every == 0 {
            let state = sim.vehicle_state();
            let [roll, pitch] = state.roll_pitch();
            log::info!(
                "[{t:.3}] {:?} {:?}, height {:.2} m, roll {:.1}, pitch {:.1} deg, motors {:.2?}",
                out.state,
                out.mode,
                state.position.z,
                roll.to_degrees(),
                pitch.to_degrees(),
                out.motors,
            );
        }
    }

    let (mean, std_dev) = scheduler.exec_time();
    log::info!(
        "Done after {ticks} ticks, {} overruns, tick time {mean:.1} +/- {std_dev:.1} us",
        scheduler.overruns()
    );

    if args.script == Script::Tune {
        match store.load() {
            Ok(params) => log::info!("Stored rate gains: {:?}", params.pid_profiles[0]),
            Err(error) => log::warn!("No stored parameters: {error:?}"),
        }
    }

    Ok(())
}
