mod service;

pub use service::{RetentionSweeper, SweepReport};
