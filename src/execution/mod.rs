pub mod entry;
pub mod monitor;

pub use entry::{EntryOutcome, EntryPipeline};
pub use monitor::{MonitorSummary, PositionMonitor};
