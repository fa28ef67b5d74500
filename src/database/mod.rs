//! Database module exports.

mod memory;
mod models;
mod mongo;
mod thread_settings;

pub use memory::MemoryPrefixStore;
pub use models::ThreadSettings;
pub use mongo::Database;
pub use thread_settings::ThreadSettingsRepo;
