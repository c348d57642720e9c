//! Live registry of worker instances and the clients that populate it.
//!
//! The registry maps a binary identity (sha256, or md5 when no sha256 is
//! known) to the address and metadata of the worker analysing that binary.
//! It is filled from two directions:
//! - **Push**: workers POST to the registration listener (see [`Registrar`]
//!   for the worker side of that exchange)
//! - **Pull**: the discovery scanner probes a port range and registers
//!   whatever answers
//!
//! Nothing expires on its own; an entry disappears only when unregistered.

pub mod instance_registry;
pub mod registrar;

pub use instance_registry::{
    InstanceEntry, InstanceRegistration, InstanceRegistry, InstanceSummary, RouteCandidate,
};
pub use registrar::{Registrar, RegistrationReply, UnregisterRequest};
