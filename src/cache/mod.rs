//! Cache module - typed caches over Moka.
//!
//! Used wherever the engine keeps short-lived, bounded state:
//! - thread admin lists (role resolution)
//! - pending reply/reaction continuations
//!
//! ## Usage
//!
//! ```rust
//! let admins: TypedCache<ThreadId, Arc<HashSet<UserId>>> =
//!     TypedCache::new("thread_admins", CacheConfig::thread_admins());
//!
//! admins.insert(thread, Arc::new(ids));
//! let ids = admins.get(&thread);
//! ```

mod config;
mod typed;

pub use config::CacheConfig;
pub use typed::TypedCache;
