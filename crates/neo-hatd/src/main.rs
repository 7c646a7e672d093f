//! NEO HAT daemon
//!
//! Monitors the battery of a ConnectBox NEO HAT, signals its level on the
//! status LED, drives the OLED pages on boards that have one, and shuts the
//! host down before the battery gives out.
//!
//! Startup sequence:
//! 1. Load configuration and the profile for the configured HAT revision
//! 2. Probe for the HAT; exit quietly if it is not fitted
//! 3. Wire GPIO, power supply and display to the runtime
//! 4. Start the button sampler and critical-edge watcher threads
//! 5. Run until shutdown or SIGTERM/SIGINT

mod admin;

use anyhow::{Context, Result};
use neo_config::{CONFIG_DIR, HatConfig, HatProfile, SensorProfile};
use neo_core::{
    BatterySensor, ButtonSampler, Hardware, HatEvent, HatRuntime, LogDisplay, PressTiming,
    PressTracker, RunExit,
};
use neo_hal::{
    ButtonInput, Clock, Direction, FallingEdgeWatcher, GpioButtons, GpioLadder, GpioLed,
    InputPin, PowerSupplyPaths, SysfsGpio, SysfsPowerSupply, SystemClock, SystemShutdown,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

use crate::admin::CommandAdmin;

/// Sysfs power supply class, scanned when the profile paths don't exist
const POWER_SUPPLY_ROOT: &str = "/sys/class/power_supply";

/// Stop flag of the running runtime, raised by the signal handler
static STOP: OnceLock<Arc<AtomicBool>> = OnceLock::new();

fn main() -> Result<()> {
    setup_logging();

    info!("NEO HAT daemon starting...");

    // Configuration problems must never turn into a shutdown: log and exit 0
    match run() {
        Ok(Some(RunExit::Shutdown)) => info!("Shutdown requested, exiting"),
        Ok(Some(RunExit::Stopped)) => info!("Stopped"),
        Ok(None) => info!("No HAT to manage, exiting"),
        Err(e) => error!("{:#}", e),
    }
    Ok(())
}

/// Setup logging to the console (journald adds timestamps)
fn setup_logging() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_ansi(false))
        .init();
}

/// Setup signal handlers for graceful stop
fn setup_signal_handlers() -> Result<()> {
    use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};

    let action = SigAction::new(
        SigHandler::Handler(handle_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );

    unsafe {
        sigaction(Signal::SIGTERM, &action)?;
        sigaction(Signal::SIGINT, &action)?;
    }

    Ok(())
}

/// Signal handler
extern "C" fn handle_signal(sig: i32) {
    match sig {
        libc::SIGTERM | libc::SIGINT => {
            if let Some(stop) = STOP.get() {
                stop.store(true, Ordering::Relaxed);
            }
        }
        _ => {}
    }
}

fn run() -> Result<Option<RunExit>> {
    let config = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => HatConfig::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => HatConfig::load_default().context("Failed to load configuration")?,
    };
    let settings = &config.daemon;

    let Some(profile) = config
        .profile(Path::new(CONFIG_DIR))
        .context("Failed to load HAT profiles")?
    else {
        info!("HAT revision is '{}'", settings.revision.as_str());
        return Ok(None);
    };
    profile.validate().context("Invalid HAT profile")?;

    let gpio = SysfsGpio::new();
    if !gpio.is_available() {
        warn!("GPIO sysfs interface not available");
        return Ok(None);
    }
    if !hat_present(&gpio, &profile) {
        warn!("{} not detected", profile.name);
        return Ok(None);
    }
    info!("Detected {}", profile.name);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let display = profile.has_display.then(|| {
        (
            Box::new(LogDisplay::new()) as Box<dyn neo_core::DisplayPages>,
            Box::new(CommandAdmin::new(config.admin.clone())) as Box<dyn neo_core::AdminActions>,
        )
    });
    let hardware = Hardware {
        clock: clock.clone(),
        led: Box::new(GpioLed::active_low(Box::new(
            gpio.setup(profile.led_pin, Direction::Out)
                .context("Failed to set up LED pin")?,
        ))),
        sensor: battery_sensor(&gpio, &profile)?,
        shutdown: Box::new(SystemShutdown::default()),
        display,
    };

    let mut runtime = HatRuntime::assemble(&profile, settings, hardware)?;

    let _sampler = if profile.has_display && !profile.buttons.is_empty() {
        Some(ButtonSampler::spawn(
            buttons(&gpio, &profile)?,
            PressTracker::new(&profile.buttons, PressTiming::from(settings)),
            clock,
            settings.input_poll(),
            runtime.event_sender(),
            HatEvent::Button,
        )?)
    } else {
        None
    };

    let _watcher = if profile.critical_pins.is_empty() {
        None
    } else {
        Some(FallingEdgeWatcher::spawn(
            input_pins(&gpio, &profile.critical_pins)?,
            settings.input_poll(),
            runtime.event_sender(),
            |pin| HatEvent::PowerCritical { pin },
        )?)
    };

    let _ = STOP.set(runtime.stop_handle());
    setup_signal_handlers()?;

    Ok(Some(runtime.run()))
}

/// Ladder HATs pull the LED pin high; fuel-gauge HATs expose a battery supply
fn hat_present(gpio: &SysfsGpio, profile: &HatProfile) -> bool {
    match &profile.sensor {
        SensorProfile::Ladder { .. } => {
            match gpio
                .setup(profile.led_pin, Direction::In)
                .and_then(|pin| pin.is_high())
            {
                Ok(high) => high,
                Err(e) => {
                    warn!("HAT probe on GPIO {} failed: {}", profile.led_pin, e);
                    false
                }
            }
        }
        SensorProfile::FuelGauge { battery_path, .. } => Path::new(battery_path).exists(),
    }
}

fn battery_sensor(gpio: &SysfsGpio, profile: &HatProfile) -> Result<BatterySensor> {
    let sensor = match &profile.sensor {
        SensorProfile::Ladder { pins, .. } => {
            BatterySensor::Ladder(Box::new(GpioLadder::new(input_pins(gpio, pins)?)))
        }
        SensorProfile::FuelGauge {
            battery_path,
            charger_path,
        } => {
            let paths = PowerSupplyPaths {
                battery: PathBuf::from(battery_path),
                charger: PathBuf::from(charger_path),
            };
            let supply = SysfsPowerSupply::detect(paths, Path::new(POWER_SUPPLY_ROOT))
                .context("Failed to scan power supplies")?;
            info!("Battery at {}", supply.paths().battery.display());
            BatterySensor::Gauge(Box::new(supply))
        }
    };
    Ok(sensor)
}

fn input_pins(gpio: &SysfsGpio, pins: &[u32]) -> Result<Vec<Box<dyn InputPin>>> {
    pins.iter()
        .map(|pin| {
            let pin = gpio
                .setup(*pin, Direction::In)
                .with_context(|| format!("Failed to set up GPIO {}", pin))?;
            Ok(Box::new(pin) as Box<dyn InputPin>)
        })
        .collect()
}

fn buttons(gpio: &SysfsGpio, profile: &HatProfile) -> Result<Box<dyn ButtonInput>> {
    let pins: Vec<u32> = profile.buttons.iter().map(|b| b.pin).collect();
    let ids = profile.buttons.iter().map(|b| b.id);
    let pins = ids.zip(input_pins(gpio, &pins)?).collect();
    Ok(Box::new(GpioButtons::new(pins)))
}
