//! Runs the script bound to each gesture
//!
//! Scripts are spawned without arguments and never awaited by the caller.
//! Their exit status is only logged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::GestureSignal;

/// Script names, looked up in the actions directory
pub mod scripts {
    pub const TERMINAL: &str = "terminal.sh";
    pub const LAYOUT_ROTATE_CJK: &str = "layout_rotate_cjk.sh";
    pub const LAYOUT_ROTATE: &str = "layout_rotate.sh";
}

/// Maps gesture signals to external scripts
pub struct ActionDispatcher {
    bindings: HashMap<GestureSignal, PathBuf>,
}

impl ActionDispatcher {
    /// Bind the default scripts inside `actions_dir`
    pub fn new(actions_dir: &Path) -> Self {
        let bindings = HashMap::from([
            (GestureSignal::TerminalOpen, actions_dir.join(scripts::TERMINAL)),
            (
                GestureSignal::LayoutRotateCjk,
                actions_dir.join(scripts::LAYOUT_ROTATE_CJK),
            ),
            (
                GestureSignal::LayoutRotate,
                actions_dir.join(scripts::LAYOUT_ROTATE),
            ),
        ]);

        Self { bindings }
    }

    /// Script bound to `signal`, if any
    pub fn binding(&self, signal: GestureSignal) -> Option<&Path> {
        self.bindings.get(&signal).map(PathBuf::as_path)
    }

    /// Dispatch every signal until the channel closes
    pub async fn run(&self, mut signal_rx: mpsc::Receiver<GestureSignal>) {
        info!("action dispatcher started");

        while let Some(signal) = signal_rx.recv().await {
            if let Err(e) = self.dispatch(signal) {
                warn!(%signal, error = %e, "failed to run action");
            }
        }

        info!("action dispatcher stopped");
    }

    /// Spawn the script for `signal` and return without waiting for it
    pub fn dispatch(&self, signal: GestureSignal) -> std::io::Result<()> {
        let Some(script) = self.binding(signal) else {
            debug!(%signal, "no action bound");
            return Ok(());
        };

        let mut child = Command::new(script).stdin(Stdio::null()).spawn()?;
        info!(%signal, script = %script.display(), pid = ?child.id(), "action started");

        let script = script.to_owned();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    debug!(script = %script.display(), "action finished");
                }
                Ok(status) => {
                    warn!(script = %script.display(), %status, "action exited with failure");
                }
                Err(e) => {
                    warn!(script = %script.display(), error = %e, "failed to wait for action");
                }
            }
        });

        Ok(())
    }
}
