pub mod json_loader;

pub use json_loader::{load_credentials, load_work_items, parse_work_items};
