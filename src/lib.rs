pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use errors::{ErrorKind, RideShareError, RideShareResult, ValidationError};
pub use handlers::create_router;
pub use state::{AppConfig, AppState};
