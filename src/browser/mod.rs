pub mod launch;
pub mod portal;

pub use launch::{launch_session, LaunchOptions};
pub use portal::{portal_url, redact_url};
