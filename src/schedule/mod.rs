// ============================================================================
// Transition Schedules
// ============================================================================
//
// A schedule answers "which store is primary for this subsystem right now".
// Writes are whole-value replacements; reads go through a TTL cache.
//
// ============================================================================

pub mod cache;
pub mod command;
pub mod repository;
pub mod transition;

pub use cache::ScheduleCache;
pub use command::{ScheduleCommands, format_transitions, parse_transitions};
pub use repository::{ChangeKind, SCHEDULE_TABLE, ScheduleChange, ScheduleRepository};
pub use transition::{TransitionId, TransitionSchedule};
