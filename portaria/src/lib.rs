//! Portaria library
//!
//! The authorization core of the clinic administration app. The binary is a
//! thin CLI on top; everything is exposed here for embedding and for
//! integration testing.

pub mod app_state;
pub mod backend;
pub mod init_telemetry;
pub mod services;
pub mod settings;
pub mod stop_flag;

// Re-export commonly used types
pub use app_state::AppState;
pub use services::authorization::{
    AccessGuard, AuthorizationSession, CurrentIdentity, GrantService, PermissionStore,
};
