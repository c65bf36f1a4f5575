//! Global key listener using XInput2 raw events
//!
//! Raw events are delivered regardless of which window has focus. The
//! listener runs a blocking X11 read loop on a dedicated thread and
//! forwards key events, in server order, to the chord machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::{ConnectError, ConnectionError, ReplyError};
use x11rb::protocol::xinput::{self, ConnectionExt as _};
use x11rb::protocol::xproto::Window;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

use crate::device::{Device, DeviceRole, Subscription};

/// XIAllDevices
const ALL_DEVICES: u16 = 0;
/// XIAllMasterDevices
const ALL_MASTER_DEVICES: u16 = 1;

/// Whether a key went down or up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Press,
    Release,
}

/// A raw key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub direction: KeyDirection,
    /// Hardware key code
    pub code: u32,
    /// Device the event was reported for
    pub device: u16,
}

/// Events sent from the listener to the chord machine
#[derive(Debug, Clone)]
pub enum HotkeyEvent {
    /// A key was pressed or released
    Key(KeyEvent),
    /// A pointer button was pressed or released. Received but unused.
    Button { device: u16, button: u32, pressed: bool },
}

impl HotkeyEvent {
    /// Device the event came from
    pub fn device(&self) -> u16 {
        match self {
            HotkeyEvent::Key(key) => key.device,
            HotkeyEvent::Button { device, .. } => *device,
        }
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("unable to connect to X server: {0}")]
    Connect(#[from] ConnectError),

    #[error("X Input extension not available")]
    MissingExtension,

    #[error("X Input 2 required, server supports {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("X11 connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X11 request failed: {0}")]
    Reply(#[from] ReplyError),

    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),
}

/// Global key listener on an X11 display
pub struct HotkeyListener {
    conn: Arc<RustConnection>,
    root: Window,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Connect to the display and check for XInput 2
    ///
    /// `display` falls back to `$DISPLAY` when `None`.
    pub fn connect(display: Option<&str>) -> Result<Self, HotkeyError> {
        let (conn, screen_num) = x11rb::connect(display)?;

        if conn
            .extension_information(xinput::X11_EXTENSION_NAME)?
            .is_none()
        {
            return Err(HotkeyError::MissingExtension);
        }

        let version = conn.xinput_xi_query_version(2, 2)?.reply()?;
        if version.major_version < 2 {
            return Err(HotkeyError::UnsupportedVersion {
                major: version.major_version,
                minor: version.minor_version,
            });
        }

        let root = conn.setup().roots[screen_num].root;
        info!(
            screen = screen_num,
            xi_major = version.major_version,
            xi_minor = version.minor_version,
            "connected to X server"
        );

        Ok(Self {
            conn: Arc::new(conn),
            root,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Snapshot of every input device known to the server
    pub fn query_devices(&self) -> Result<Vec<Device>, HotkeyError> {
        let reply = self.conn.xinput_xi_query_device(ALL_DEVICES)?.reply()?;

        let devices: Vec<Device> = reply
            .infos
            .iter()
            .filter_map(|info| {
                let role = role_for(info.type_)?;
                Some(Device {
                    id: info.deviceid,
                    name: String::from_utf8_lossy(&info.name).into_owned(),
                    role,
                })
            })
            .collect();

        debug!(count = devices.len(), "queried input devices");
        Ok(devices)
    }

    /// Register for raw key events on the root window
    pub fn select(&self, subscription: Subscription) -> Result<(), HotkeyError> {
        let raw_input: xinput::XIEventMask = xinput::XIEventMask::RAW_KEY_PRESS
            | xinput::XIEventMask::RAW_KEY_RELEASE
            | xinput::XIEventMask::RAW_BUTTON_PRESS
            | xinput::XIEventMask::RAW_BUTTON_RELEASE;

        let masks = match subscription {
            // Slave devices stay selected with an empty mask so every raw
            // event is reported once, through its master
            Subscription::AllDevices => vec![
                xinput::EventMask {
                    deviceid: ALL_DEVICES,
                    mask: Vec::new(),
                },
                xinput::EventMask {
                    deviceid: ALL_MASTER_DEVICES,
                    mask: vec![raw_input.into()],
                },
            ],
            Subscription::Device(id) => vec![xinput::EventMask {
                deviceid: id,
                mask: vec![raw_input.into()],
            }],
        };

        self.conn
            .xinput_xi_select_events(self.root, &masks)?
            .check()?;
        self.conn.flush()?;

        info!(?subscription, "selected raw key events");
        Ok(())
    }

    /// Start the listener
    ///
    /// Spawns a dedicated thread blocking on the X11 connection. Events
    /// outside `subscription` are dropped there. The thread owns `event_tx`,
    /// so the receiver sees the channel close once the thread exits.
    pub fn start(
        &self,
        subscription: Subscription,
        event_tx: mpsc::Sender<HotkeyEvent>,
    ) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let conn = Arc::clone(&self.conn);
        spawn_listener_thread(Arc::clone(&self.running), event_tx, move |tx, running| {
            run_event_loop(&conn, subscription, tx, running)
        })?;

        Ok(())
    }

    /// Stop the listener. The thread exits after its next event.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Run `event_loop` on the listener thread. The thread takes the only
/// sender, so it is dropped when the loop ends for any reason.
fn spawn_listener_thread<F>(
    running: Arc<AtomicBool>,
    event_tx: mpsc::Sender<HotkeyEvent>,
    event_loop: F,
) -> Result<thread::JoinHandle<()>, HotkeyError>
where
    F: FnOnce(&mpsc::Sender<HotkeyEvent>, &AtomicBool) -> Result<(), HotkeyError> + Send + 'static,
{
    thread::Builder::new()
        .name("hotkey-listener".to_string())
        .spawn(move || {
            info!("hotkey listener thread started");

            if let Err(e) = event_loop(&event_tx, &running) {
                error!(?e, "hotkey listener error");
            }

            running.store(false, Ordering::SeqCst);
            info!("hotkey listener thread stopped");
        })
        .map_err(|e| HotkeyError::ThreadSpawn(e.to_string()))
}

/// Map an XI device type to a role. Unknown types are skipped.
fn role_for(device_type: xinput::DeviceType) -> Option<DeviceRole> {
    match device_type {
        xinput::DeviceType::MASTER_POINTER => Some(DeviceRole::MasterPointer),
        xinput::DeviceType::MASTER_KEYBOARD => Some(DeviceRole::MasterKeyboard),
        xinput::DeviceType::SLAVE_POINTER => Some(DeviceRole::SlavePointer),
        xinput::DeviceType::SLAVE_KEYBOARD => Some(DeviceRole::SlaveKeyboard),
        xinput::DeviceType::FLOATING_SLAVE => Some(DeviceRole::FloatingSlave),
        _ => None,
    }
}

/// Convert an X11 event into a listener event, if it is one we selected
fn translate(event: &Event) -> Option<HotkeyEvent> {
    let key = |direction, code, device| {
        HotkeyEvent::Key(KeyEvent {
            direction,
            code,
            device,
        })
    };

    match event {
        Event::XinputRawKeyPress(ev) => Some(key(KeyDirection::Press, ev.detail, ev.deviceid)),
        Event::XinputRawKeyRelease(ev) => {
            Some(key(KeyDirection::Release, ev.detail, ev.deviceid))
        }
        Event::XinputRawButtonPress(ev) => Some(HotkeyEvent::Button {
            device: ev.deviceid,
            button: ev.detail,
            pressed: true,
        }),
        Event::XinputRawButtonRelease(ev) => Some(HotkeyEvent::Button {
            device: ev.deviceid,
            button: ev.detail,
            pressed: false,
        }),
        _ => None,
    }
}

/// Block on the connection and forward events until stopped
fn run_event_loop(
    conn: &RustConnection,
    subscription: Subscription,
    event_tx: &mpsc::Sender<HotkeyEvent>,
    running: &AtomicBool,
) -> Result<(), HotkeyError> {
    while running.load(Ordering::SeqCst) {
        let event = conn.wait_for_event()?;

        let Some(event) = translate(&event) else {
            trace!(?event, "ignoring X11 event");
            continue;
        };

        if !subscription.accepts(event.device()) {
            trace!(device = event.device(), "event from unselected device");
            continue;
        }

        // We're on a plain thread, so block until the machine takes it
        if event_tx.blocking_send(event).is_err() {
            warn!("failed to send key event - channel closed?");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
impl KeyEvent {
    pub fn press(code: u32) -> Self {
        Self {
            direction: KeyDirection::Press,
            code,
            device: 3,
        }
    }

    pub fn release(code: u32) -> Self {
        Self {
            direction: KeyDirection::Release,
            code,
            device: 3,
        }
    }
}
