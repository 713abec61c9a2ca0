mod registry;

pub use registry::MigrationRegistry;
