//! Actor model for the call controller.
//!
//! A single [`RegistryActor`] owns all signaling state and processes its
//! mailbox serially; per-socket tasks talk to it through
//! [`RegistryActorHandle`] and receive outbound events through the
//! [`ClientConnection`] sender registered at connect time.

pub mod messages;
pub mod registry;

pub use messages::{ClientConnection, RegistryMessage, RegistrySnapshot};
pub use registry::{RegistryActor, RegistryActorHandle};
