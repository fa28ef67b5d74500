//! Permission system for resolving user roles.
//!
//! ## Features
//!
//! - Ordered [`AuthorizationLevel`]s (everyone < thread admin < bot admin < owner)
//! - Per-route role requirements declared by handlers
//! - Cached thread admin lookups (reduces API hits)
//!
//! ## Usage
//!
//! ```rust
//! let roles = RoleResolver::new(owner_ids, admin_ids, directory);
//!
//! if roles.role_of(user, thread).await >= descriptor.required_role(RoutingClass::Run) {
//!     // ...
//! }
//! ```

mod checker;
mod level;

pub use checker::{AdminDirectory, RoleResolver};
pub use level::{AuthorizationLevel, RoleRequirement, RoleTable, RoutingClass};
