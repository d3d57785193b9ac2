//! Notification Adapters

mod logging;

pub use logging::LoggingNotifier;
