//! Connection/session registry
//!
//! This module handles:
//! - Registering channels as the transport accepts them
//! - Enforcing one active run per channel
//! - Cancelling and tearing down a channel's run when it closes

mod registry;

pub use registry::{ChannelId, RegistryError, SessionRegistry};
