//! shadematch — try-on sessions and upload matching on top of
//! `shadematch-core` and `shadematch-hw`.

pub mod config;
pub mod service;
pub mod session;

pub use config::{Config, ConfigError};
pub use service::{ShadeMatch, ShadeMatchService, ServiceError, Upload};
pub use session::{load_detector, spawn_session, SessionError, SessionHandle, SessionOptions, SessionStatus};
