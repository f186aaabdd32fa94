//! In-process event fan-out for batch progress.

pub mod events;

pub use events::{BatchEvent, BatchEventBroadcaster, BatchEventKind};
