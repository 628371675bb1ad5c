mod workload;

use std::{
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Context;
use chromium_pump::{ChannelPump, Config, LoopDriver, ShutdownCoordinator};
use clap::{Parser, ValueEnum};
use tracing::info;
use workload::Workload;

#[cfg(unix)]
type NativeDriver = chromium_pump::shutdown::GlibLoopDriver;
#[cfg(windows)]
type NativeDriver = chromium_pump::shutdown::Win32LoopDriver;

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum Backend {
    /// GLib main context or Win32 message loop
    #[default]
    Native,
    /// Self-driven loop fed through a channel
    Channel,
}

#[derive(Parser, Debug)]
#[command(version, about = "Drives a simulated engine through the external message pump")]
struct Args {
    /// Loop backend
    #[arg(short, long, value_enum, default_value_t = Backend::Native)]
    backend: Backend,
    /// Frame rate bounding the longest timer delay
    #[arg(short, long)]
    frame_rate: Option<u32>,
    /// How long to post work, in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    duration: u64,
    /// Tasks posted per second
    #[arg(short, long, default_value_t = 100)]
    rate: u32,
    /// Spin a nested loop from engine work every N iterations
    #[arg(short, long)]
    nested: Option<u32>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = Config::new(args.frame_rate);

    info!(
        "Running {:?} backend, max timer delay {:?}",
        args.backend, config.pump.max_timer_delay
    );

    let until = Instant::now() + Duration::from_millis(args.duration);
    let workload = Workload::new(args.nested);

    match args.backend {
        Backend::Native => run_native(&workload, &config, args.rate, until)?,
        Backend::Channel => run_channel(&workload, &config, args.rate, until),
    }

    let stats = workload.stats();
    info!(
        "Posted {} tasks, ran {} in {} iterations ({} nested loops), max lateness {:?}",
        stats.tasks_posted, stats.tasks_run, stats.iterations, stats.nested_loops, stats.max_lateness
    );

    Ok(())
}

#[cfg(any(unix, windows))]
fn run_native(workload: &Workload, config: &Config, rate: u32, until: Instant) -> anyhow::Result<()> {
    let pump = chromium_pump::create(workload.engine(), &config.pump)
        .context("Failed to create native message pump")?;

    workload.attach(pump.scheduler());
    workload.set_nested_loop(|| {
        NativeDriver::default().run_iteration(false);
    });

    run(workload, NativeDriver::default(), rate, until);

    Ok(())
}

#[cfg(not(any(unix, windows)))]
fn run_native(_: &Workload, _: &Config, _: u32, _: Instant) -> anyhow::Result<()> {
    anyhow::bail!("No native message loop on this platform, use the channel backend")
}

fn run_channel(workload: &Workload, config: &Config, rate: u32, until: Instant) {
    let pump = Rc::new(ChannelPump::new(workload.engine(), || {}, &config.pump));

    workload.attach(pump.scheduler());

    let nested = Rc::downgrade(&pump);
    workload.set_nested_loop(move || {
        if let Some(pump) = nested.upgrade() {
            pump.run_iteration(Some(Duration::ZERO));
        }
    });

    let driver = move |may_block: bool| match may_block {
        true => pump.run_iteration(None),
        false => pump.run_iteration(Some(Duration::ZERO)),
    };

    run(workload, driver, rate, until);
}

fn run(workload: &Workload, driver: impl LoopDriver + 'static, rate: u32, until: Instant) {
    let coordinator = Rc::new(ShutdownCoordinator::new(driver));

    coordinator.browser_created();
    workload.set_on_closed({
        let coordinator = Rc::downgrade(&coordinator);
        move || {
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.browser_destroyed();
            }
        }
    });

    let Some(scheduler) = workload.scheduler() else {
        return;
    };
    let producer = workload.spawn_producer(scheduler, rate, until);

    while Instant::now() < until {
        coordinator.driver().run_iteration(true);
    }

    match producer.join() {
        Ok(posted) => info!("Producer finished after {posted} tasks"),
        Err(_) => tracing::error!("Producer thread panicked"),
    }

    workload.request_close();
    coordinator.shutdown();
}
