//! Backend management and hot-swap routing.
//!
//! Provides the per-target forwarding clients and the thread-safe service
//! registry that picks one of them for every request.

mod dialer;
mod state;

pub use dialer::{parse_target, BackendDialer, DialError, ForwardingClient};
pub use state::{Dispatch, RegistryError, ServiceRouter, SwitchLogEntry};
