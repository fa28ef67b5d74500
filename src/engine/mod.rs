//! Dispatch and policy engine.
//!
//! ## Flow
//!
//! ```text
//! InboundEvent -> SafetyThrottle -> Dispatcher
//!     reply continuation | reaction continuation | passive fan-out + command
//!         -> RoleResolver -> CooldownTracker -> handler entry point
//! ```
//!
//! Handlers are manifests from a [`HandlerSource`], instantiated through a
//! [`BehaviorCatalog`] and kept in a hot-swappable [`HandlerRegistry`].
//! Nothing in here knows about Telegram or MongoDB.

mod catalog;
mod continuation;
mod cooldown;
mod dispatcher;
mod error;
mod event;
mod handler;
mod manifest;
mod prefix;
mod registry;
mod source;
mod state;
mod stats;
mod throttle;
mod transport;
mod watcher;

#[cfg(test)]
pub mod testing;

pub use catalog::{BehaviorCatalog, BehaviorFactory, parse_options};
pub use continuation::{ContinuationKind, ContinuationMode, ContinuationStore, ContinuationToken};
pub use cooldown::{CooldownCheck, CooldownTracker};
pub use dispatcher::{DispatchOutcome, Dispatcher, InvocationResult};
pub use error::{InvocationError, LoadError};
pub use event::{EventKind, InboundEvent, MembershipChange, MessageId, ThreadId, UserId};
pub use handler::{
    Handler, HandlerContext, HandlerDescriptor, Invocable, MembershipListener, Passive, Reactable,
    Repliable,
};
pub use manifest::HandlerManifest;
pub use prefix::{MAX_PREFIX_LEN, PrefixError, PrefixResolver, PrefixStore};
pub use registry::{HandlerRegistry, LoadReport};
pub use source::{DirectorySource, HandlerSource, UnitId};
pub use state::AppState;
pub use stats::{DispatchStats, StatsSnapshot};
pub use throttle::{ActiveHours, Rejection, SafetyConfig, SafetyThrottle, ThrottleSnapshot};
pub use transport::Transport;
pub use watcher::{ReloadEvent, ReloadNotifier, ReloadWatcher};
