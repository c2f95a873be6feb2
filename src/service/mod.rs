//! Service lifecycle: the service manager seam and the deferred restart.
//!
//! [`ServiceManager`] abstracts stopping, starting and probing the running
//! service. The restart itself is described by a [`RestartPlan`] and carried
//! out by [`run_restart_sequence`]; a [`RestartScheduler`] launches that
//! sequence without waiting for it.

mod port;
mod restart;
mod systemd;

pub use port::port_in_use;
pub use restart::{
    DetachedRestart, InProcessRestart, Launcher, RestartPlan, RestartReport, RestartScheduler,
    run_restart_sequence,
};
pub use systemd::SystemdServiceManager;

use crate::error::Result;
use std::future::Future;

/// Trait defining the service manager operations needed for a restart
pub trait ServiceManager {
    /// Name of the managed service
    fn service_name(&self) -> &str;

    /// Stop the service
    fn stop(&self) -> impl Future<Output = Result<()>> + Send;

    /// Start the service
    fn start(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether a local socket still holds `port`
    fn is_port_in_use(&self, port: u16) -> impl Future<Output = bool> + Send;
}
