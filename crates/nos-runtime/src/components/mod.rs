//! Built-in subscribers and hooks hosted by the runtime.

pub mod alert;
pub mod log_sink;

pub use alert::{Alert, AlertLog};
pub use log_sink::{LogSink, LOG};
