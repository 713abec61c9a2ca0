pub mod timed;

pub use timed::{TimeVersionedProperty, TimeVersionedPropertyBuilder};
