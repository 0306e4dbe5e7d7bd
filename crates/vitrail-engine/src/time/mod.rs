//! Time subsystem: per-window frame timing and the game-loop scheduler.

mod frame_clock;
mod scheduler;

pub use frame_clock::{FrameClock, FrameTime};
pub use scheduler::{GameLoopScheduler, ScheduleHandle};
