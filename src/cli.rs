//! Command line interface

use clap::Parser;

/// Global keyboard chord detector for X11
#[derive(Debug, Parser)]
#[command(name = "kbhook", version, about)]
pub struct Cli {
    /// Device to listen on: an ID, a name, or `pointer:<name>` /
    /// `keyboard:<name>`. Listens on all devices when omitted.
    pub device: Option<String>,

    /// X display to connect to (defaults to $DISPLAY)
    #[arg(long)]
    pub display: Option<String>,

    /// Print the input devices known to the server and exit
    #[arg(long)]
    pub list_devices: bool,
}
