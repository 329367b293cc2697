//! Coordinator Modules
//!
//! The application layer of the turn coordinator: the admission state
//! machine, the per-turn telemetry collector, the liveness watchdog and
//! the administrative control surface, all generic over the ports.

pub mod admin;
pub mod liveness;
pub mod scheduler;
pub mod telemetry;

pub use crate::admin::AdminSurface;
pub use crate::liveness::{LivenessMonitor, LivenessMonitorConfig};
pub use crate::scheduler::{SchedulerError, SchedulerPhase, TurnScheduler, TurnSchedulerConfig};
pub use crate::telemetry::{TelemetryCollector, TelemetryConfig};
