pub mod config;
pub mod lock;
pub mod logging;

pub use config::Settings;
pub use lock::{LockError, MergeLock};
