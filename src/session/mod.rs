mod manager;
mod runner;
pub mod state;

pub use manager::{
    is_low_health, SessionError, SessionManager, CLOSE_TIMEOUT, LOW_HEALTH_THRESHOLD, MAX_HEALTH,
};
pub use runner::shutdown_signal;
pub use state::{SessionState, SessionTimer};
