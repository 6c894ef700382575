//! Block storage volume management for OpenStack.
//!
//! Volume creation and deletion are asynchronous on the server side: the API
//! answers immediately and the volume converges later. The [`wait`] module
//! holds the polling primitive every mutating handler in [`resource`] blocks on.

pub mod config;
pub mod openstack;
pub mod resource;
pub mod wait;

/// Version injected at compile time via OSVOL_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("OSVOL_VERSION") {
    Some(v) => v,
    None => "dev",
};
