pub mod event;

pub use event::{EventKind, SessionEvent};
