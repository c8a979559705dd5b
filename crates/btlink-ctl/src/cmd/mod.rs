//! CLI command modules.

pub mod apps;
pub mod devices;
pub mod http;
pub mod native;
pub mod status;
