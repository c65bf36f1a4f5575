//! Input device model and selection

mod resolver;

pub use resolver::{Device, DeviceRole, Subscription};
