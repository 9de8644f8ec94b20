pub mod agent;
pub mod controller;
pub mod driver;
pub mod report;
pub mod store;
pub mod utils;

// Re-export common items
pub use controller::run::{RunConfig, RunRecord};
pub use controller::Controller;
pub use store::KvStore;
