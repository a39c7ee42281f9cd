//! Typeset cache.
//!
//! Maps `(content, display mode, kind)` to the immutable result of the first
//! render of that key. Only the scheduler's worker writes; readers may come
//! from any task.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! max_entries = 2048
//! ```

mod config;
mod keys;
mod store;

pub use config::CacheConfig;
pub use keys::{RenderKey, hash_value};
pub use store::{CacheEntry, RenderedOutput, TypesetCache};
