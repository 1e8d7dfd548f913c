//! Process lifecycle: running the server and the periodic tasks until shutdown.

pub mod lifecycle;

pub use lifecycle::{shutdown_signal, Application};
