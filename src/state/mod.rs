//! Persisted monitor state: cursors and cool-down caches.
//!
//! Each monitor owns one small JSON file. Files are rewritten whole through
//! a temp file and a rename, so a crash never leaves a half-written state
//! behind. Unknown fields are ignored on load so older binaries can read
//! newer files.

pub mod cooldown;
pub mod cursor;
pub mod store;

pub use cooldown::{CooldownCache, CooldownEntry};
pub use cursor::Cursor;
pub use store::StateStore;
