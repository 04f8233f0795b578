//! Upload pipeline split into modular components (`domain`, `job_log`,
//! `discovery`, `dispatcher`, `endpoint_pool`, `telegram`).
pub mod archive;
pub mod cancel;
pub mod discovery;
pub mod dispatcher;
pub mod domain;
pub mod endpoint_pool;
pub mod image_prep;
pub mod job_log;
pub(crate) mod media_kinds;
pub(crate) mod network_proxy;
pub mod notifier;
pub mod pause;
pub mod remote;
pub mod settings;
pub mod supervisor;
pub mod telegram;

#[cfg(test)]
mod tests;

pub use cancel::CancelToken;
pub use pause::PauseGate;
