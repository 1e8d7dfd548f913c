//! Application initialization.
//!
//! - **`resources`**: backends (`PostgreSQL`, Redis, clock, gateway) as trait objects
//! - **`services`**: service wiring and background task registration
//! - **`builder`**: step-by-step startup ending in a runnable [`Application`](crate::runtime::Application)

pub mod builder;
pub mod resources;
pub mod services;

pub use builder::ApplicationBuilder;
pub use resources::ResourceManager;
pub use services::Services;
