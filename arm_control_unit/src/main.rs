//! # Arm Control Unit
//!
//! Runs the actuator controller against the simulation driver: loads the
//! arm configuration, brings the actuators up, commands a target angle on
//! every joint and executes a fixed number of scheduling cycles.

use arm_common::config::{ArmConfig, LogLevel};
use arm_common::consts::DEFAULT_CONFIG_PATH;
use arm_common::id::ActuatorId;
use arm_control_unit::Controller;
use arm_hal::create_peripherals;
use clap::Parser;
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Arm Control Unit - cooperative actuator control loop
#[derive(Parser, Debug)]
#[command(name = "arm_control_unit")]
#[command(version)]
#[command(about = "Cooperative actuator control loop for a multi-joint arm (simulated)")]
struct Args {
    /// Path to the arm configuration TOML.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Scheduling cycles to run.
    #[arg(long, default_value_t = 2000)]
    cycles: u32,

    /// Target angle [deg] commanded on every joint after enabling.
    #[arg(long, default_value_t = 20.0, allow_negative_numbers = true)]
    target: f32,

    /// Duration [ms] of the commanded move.
    #[arg(long, default_value_t = 1000)]
    duration: u32,

    /// Enable verbose logging (at least DEBUG, regardless of the configured level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn main() {
    let args = Args::parse();
    let config = ArmConfig::from_file(&args.config);
    let log_level = config
        .as_ref()
        .map_or(LogLevel::default(), |c| c.shared.log_level);
    setup_tracing(&args, log_level);

    info!("Arm Control Unit v{} starting...", env!("CARGO_PKG_VERSION"));

    let result = config
        .map_err(|e| -> Box<dyn std::error::Error> { Box::new(e) })
        .and_then(|config| run(&args, config));
    if let Err(e) = result {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("Arm Control Unit shutdown complete");
}

fn run(args: &Args, config: ArmConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Config OK: service={}, actuators={}",
        config.shared.service_name,
        config.actuators.len()
    );

    let (peripherals, rig) = create_peripherals(&config);
    let mut controller = Controller::new(config, peripherals);

    if let Err(e) = controller.setup() {
        if e.is_fatal() {
            return Err(Box::new(e));
        }
        warn!("Continuing degraded: {e}");
    }

    controller.power_actuators(true);
    controller.enable();

    let ids: Vec<ActuatorId> = controller.registry().ids().into_iter().collect();
    for id in ids {
        controller.set_angle(id, args.target, args.duration);
    }

    for _ in 0..args.cycles {
        controller.cycle(controller.now_ms());
        rig.clock.advance_us(250);
    }

    let stats = *controller.stats();
    info!(
        cycles = stats.cycles,
        pulses = stats.pulses,
        encoder_reads = stats.encoder_reads,
        encoder_rejects = stats.encoder_rejects,
        servo_updates = stats.servo_updates,
        servo_failures = stats.servo_failures,
        "Run complete"
    );
    for (id, actuator) in controller.registry().iter() {
        info!(actuator = %id, angle = actuator.current_angle(), "Final angle");
    }

    controller.disable();
    controller.power_actuators(false);
    Ok(())
}

/// Base filter directive; `RUST_LOG` takes precedence over it.
fn log_directive(verbose: bool, configured: LogLevel) -> &'static str {
    if verbose && configured != LogLevel::Trace {
        LogLevel::Debug.as_directive()
    } else {
        configured.as_directive()
    }
}

fn setup_tracing(args: &Args, log_level: LogLevel) {
    let directive = log_directive(args.verbose, log_level);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}
