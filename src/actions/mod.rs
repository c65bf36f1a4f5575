//! External actions triggered by gestures

mod dispatcher;

pub use dispatcher::ActionDispatcher;
