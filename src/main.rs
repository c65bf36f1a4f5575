//! kbhook: global keyboard chord detector for X11
//!
//! Listens to raw XInput2 key events from every (or one selected) input
//! device, independent of window focus, and runs a script when a
//! modifier chord completes:
//! - Ctrl+Alt+T opens a terminal (`terminal.sh`)
//! - Alt+Shift rotates to the next CJK layout (`layout_rotate_cjk.sh`)
//! - Ctrl+Shift rotates to the next layout (`layout_rotate.sh`)
//!
//! Chords must be pure: any other key held during the gesture cancels it.

mod actions;
mod chord;
mod cli;
mod config;
mod device;
mod events;
mod hotkey;
mod lifecycle;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::actions::ActionDispatcher;
use crate::chord::ChordMachine;
use crate::cli::Cli;
use crate::config::Config;
use crate::device::{Device, Subscription};
use crate::events::GestureSignal;
use crate::hotkey::HotkeyListener;
use crate::lifecycle::ShutdownSignal;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "kbhook starting");

    let config = Config::load(&cli)?;
    info!(
        device = ?config.device,
        actions_dir = %config.actions_dir.display(),
        "configuration loaded"
    );

    // Listener -> chord machine
    let (key_tx, key_rx) = mpsc::channel(256);
    // Chord machine -> action dispatcher
    let (signal_tx, signal_rx) = mpsc::channel::<GestureSignal>(32);

    let hotkey_listener = HotkeyListener::connect(config.display.as_deref())
        .context("failed to set up X11 input")?;

    let devices = hotkey_listener
        .query_devices()
        .context("failed to list input devices")?;

    if cli.list_devices {
        print_devices(&devices);
        return Ok(());
    }

    let subscription = Subscription::for_token(config.device.as_deref(), &devices)
        .context("failed to select input device")?;

    hotkey_listener
        .select(subscription)
        .context("failed to select raw key events")?;
    hotkey_listener
        .start(subscription, key_tx)
        .context("failed to start hotkey listener")?;
    info!("hotkey listener started");

    let mut chord_machine = ChordMachine::new(config.keymap);
    let dispatcher = ActionDispatcher::new(&config.actions_dir);
    let shutdown = ShutdownSignal::new();

    info!("daemon initialized, entering main loop");

    let result = tokio::select! {
        _ = chord_machine.run(key_rx, signal_tx) => {
            error!("key event stream ended");
            Err(anyhow::anyhow!("lost connection to the X server"))
        }

        _ = dispatcher.run(signal_rx) => {
            Err(anyhow::anyhow!("action dispatcher exited"))
        }

        res = shutdown.wait() => {
            match res {
                Ok(()) => {
                    info!("shutdown signal received");
                    Ok(())
                }
                Err(e) => Err(e).context("failed to register signal handlers"),
            }
        }
    };

    info!("shutting down...");
    if hotkey_listener.is_running() {
        hotkey_listener.stop();
    }

    result?;

    info!("kbhook stopped");
    Ok(())
}

fn print_devices(devices: &[Device]) {
    for device in devices {
        println!("{}\t{}\t{}", device.id, device.role, device.name);
    }
}
