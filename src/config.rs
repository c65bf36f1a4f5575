//! Configuration loading and management

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::Cli;
use crate::hotkey::Keymap;

/// Directory holding the action scripts
pub const ACTIONS_DIR_ENV: &str = "KBHOOK_ACTIONS_DIR";
/// Optional JSON keymap overriding the built-in key codes
pub const KEYMAP_ENV: &str = "KBHOOK_KEYMAP";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Device token given on the command line
    pub device: Option<String>,

    /// X display name, `None` for $DISPLAY
    pub display: Option<String>,

    /// Directory the action scripts are run from
    pub actions_dir: PathBuf,

    /// Key code table used by the chord machine
    pub keymap: Keymap,
}

impl Config {
    /// Load configuration from the command line and environment
    pub fn load(cli: &Cli) -> Result<Self> {
        Self::from_lookup(cli, |key| std::env::var_os(key))
    }

    fn from_lookup(cli: &Cli, env: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let actions_dir = env(ACTIONS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let keymap = match env(KEYMAP_ENV).map(PathBuf::from) {
            Some(path) => Keymap::load(&path)
                .with_context(|| format!("failed to load keymap from {}", path.display()))?,
            None => Keymap::default(),
        };

        Ok(Self {
            device: cli.device.clone(),
            display: cli.display.clone(),
            actions_dir,
            keymap,
        })
    }
}
