//! Pulseline CLI - the `pulseline` command.
//!
//! Bootstraps the process: installs the timing substrate, builds the tempo
//! clock and OSC client from flags, then runs a performance loop that
//! dispatches one timed control message per iteration.

use anyhow::Result;
use clap::Parser;
use pulseline_core::{DispatchRegistry, OscClient, Sender, TempoClock, TimerSubstrate};
use std::sync::Arc;
use std::time::Duration;

/// Pulseline - timed OSC control messages for live performance
#[derive(Parser, Debug)]
#[command(name = "pulseline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Schedule and emit timed OSC control messages", long_about = None)]
struct Args {
    /// OSC target in host:port form
    #[arg(long, default_value = "127.0.0.1:57120")]
    target: String,

    /// Destination address template (may be a pattern of addresses)
    #[arg(long, default_value = "/play")]
    address: String,

    /// Tempo in beats per minute
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,

    /// Note pattern (whitespace/comma separated, `tok!n` repeats)
    #[arg(long, default_value = "60 62 64 67")]
    note: String,

    /// Playback speed parameter
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Beat offset applied to every dispatch
    #[arg(long, default_value_t = 0.0)]
    after: f64,

    /// Number of messages to dispatch
    #[arg(long, default_value_t = 8)]
    count: usize,

    /// Beats between consecutive dispatches
    #[arg(long, default_value_t = 1.0)]
    every: f64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose);

    let substrate = Arc::new(TimerSubstrate::install());
    let clock = Arc::new(TempoClock::new(args.bpm, substrate));
    clock.start();

    let transport = Arc::new(OscClient::new(&args.target)?);
    let registry = Arc::new(DispatchRegistry::new());

    log::info!(
        "dispatching {} messages to {} ({} at {} bpm, resolution ~{:?})",
        args.count,
        args.target,
        args.address,
        args.bpm,
        clock.resolution()
    );

    for i in 0..args.count {
        let sender = Sender::new(Arc::clone(&clock), Arc::clone(&transport), &args.address)
            .with_registry(Arc::clone(&registry))
            .note(args.note.as_str())
            .speed(args.speed)
            .after(args.after)
            .trig(1.0);

        match sender.out(Some(i)) {
            Ok(Some(id)) => log::debug!("iteration {i}: scheduled dispatch {id}"),
            Ok(None) => log::debug!("iteration {i}: nothing to play"),
            Err(e) => log::warn!("iteration {i}: message dropped: {e}"),
        }

        let next = clock.ticks_for(args.every, false);
        clock.wait_until(next).await?;
    }

    drain(&registry, &args).await;
    log::info!(
        "done: {} delivered, {} failed",
        registry.delivered(),
        registry.failed()
    );
    Ok(())
}

/// Give pending offset dispatches time to fire before the process exits.
async fn drain(registry: &DispatchRegistry, args: &Args) {
    let margin = Duration::from_secs_f64(args.after.max(0.0) * 60.0 / args.bpm + 0.5);
    let deadline = tokio::time::Instant::now() + margin;
    while registry.in_flight() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn init_logger(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}
