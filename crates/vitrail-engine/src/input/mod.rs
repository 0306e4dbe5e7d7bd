//! Keyboard input delivered to window root contents.

mod event;
mod keys;

pub use event::KeyEvent;
pub use keys::Key;

pub(crate) use keys::{map_logical_key, map_physical_key};
