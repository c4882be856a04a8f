//! CLI command implementations

pub mod cache;
pub mod config;
pub mod download;
pub mod install;
pub mod local;
pub mod versions;

pub use cache::execute as cache;
pub use config::execute as config;
pub use download::execute as download;
pub use install::execute as install;
pub use local::execute as local;
pub use versions::execute as versions;
