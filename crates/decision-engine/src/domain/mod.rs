mod signal_buffer;
mod tick;

pub use signal_buffer::{DEFAULT_CAPACITY, PushOutcome, SignalBuffer};
pub use tick::{LoopState, TickReport, TickSource};
