//! Device selection
//!
//! Turns the user's device token into the set of devices whose raw key
//! events reach the chord machine.

use tracing::{debug, warn};

/// Prefix restricting a name match to pointer devices
pub const POINTER_PREFIX: &str = "pointer:";
/// Prefix restricting a name match to keyboard devices
pub const KEYBOARD_PREFIX: &str = "keyboard:";

/// Input subsystem role of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    MasterPointer,
    MasterKeyboard,
    SlavePointer,
    SlaveKeyboard,
    /// Detached slave, neither pointer nor keyboard for matching purposes
    FloatingSlave,
}

impl DeviceRole {
    pub fn is_pointer(self) -> bool {
        matches!(self, DeviceRole::MasterPointer | DeviceRole::SlavePointer)
    }

    pub fn is_keyboard(self) -> bool {
        matches!(self, DeviceRole::MasterKeyboard | DeviceRole::SlaveKeyboard)
    }
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRole::MasterPointer => write!(f, "master pointer"),
            DeviceRole::MasterKeyboard => write!(f, "master keyboard"),
            DeviceRole::SlavePointer => write!(f, "slave pointer"),
            DeviceRole::SlaveKeyboard => write!(f, "slave keyboard"),
            DeviceRole::FloatingSlave => write!(f, "floating slave"),
        }
    }
}

/// An input device as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: u16,
    pub name: String,
    pub role: DeviceRole,
}

impl Device {
    /// Whether this device matches a non-numeric token
    fn matches_name(&self, token: &str) -> bool {
        if self.name == token {
            return true;
        }

        if let Some(name) = token.strip_prefix(POINTER_PREFIX) {
            if self.name == name && self.role.is_pointer() {
                return true;
            }
        }

        if let Some(name) = token.strip_prefix(KEYBOARD_PREFIX) {
            if self.name == name && self.role.is_keyboard() {
                return true;
            }
        }

        false
    }
}

/// Errors that can occur while resolving a device token
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "there are multiple devices matching '{token}' (ids {first} and {second}); \
         use the device ID, or prefix the device name with 'pointer:' or \
         'keyboard:' as appropriate"
    )]
    Ambiguous { token: String, first: u16, second: u16 },

    #[error("no input device matches '{token}'")]
    NotFound { token: String },
}

/// Pick the single device matching `token`.
///
/// An all-digit token is a device ID and is never compared against names.
/// Any other token matches by exact name, or by name and role when it
/// carries a `pointer:` or `keyboard:` prefix.
pub fn resolve<'a>(token: &str, devices: &'a [Device]) -> Result<&'a Device, ResolveError> {
    let not_found = || ResolveError::NotFound {
        token: token.to_string(),
    };

    if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        // IDs are unique, so this cannot be ambiguous
        let id: u16 = token.parse().map_err(|_| not_found())?;
        return devices.iter().find(|d| d.id == id).ok_or_else(not_found);
    }

    let mut found: Option<&Device> = None;
    for device in devices.iter().filter(|d| d.matches_name(token)) {
        if let Some(first) = found {
            warn!(
                token,
                first = first.id,
                second = device.id,
                "ambiguous device selection"
            );
            return Err(ResolveError::Ambiguous {
                token: token.to_string(),
                first: first.id,
                second: device.id,
            });
        }
        found = Some(device);
    }

    let device = found.ok_or_else(not_found)?;
    debug!(token, id = device.id, name = %device.name, "device resolved");
    Ok(device)
}

/// Which devices feed the chord machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Every device; modifier delivery comes from the master devices
    AllDevices,
    /// One resolved device
    Device(u16),
}

impl Subscription {
    /// Build the subscription for an optional device token
    pub fn for_token(token: Option<&str>, devices: &[Device]) -> Result<Self, ResolveError> {
        match token {
            None => Ok(Subscription::AllDevices),
            Some(token) => resolve(token, devices).map(|d| Subscription::Device(d.id)),
        }
    }

    /// Whether events from `device` belong to this subscription
    pub fn accepts(&self, device: u16) -> bool {
        match self {
            Subscription::AllDevices => true,
            Subscription::Device(id) => *id == device,
        }
    }
}
