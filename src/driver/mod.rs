pub mod common;
pub mod web;

pub use web::{PageDriver, TabId, WebConfig, WebSession};
