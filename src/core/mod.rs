pub mod clock;
pub mod error;
pub mod time;
pub mod types;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{MigrationError, Result};
pub use time::{END_OF_TIME, START_OF_TIME, format_instant, parse_instant};
pub use types::PrimaryStore;
