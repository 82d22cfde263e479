mod app_config;
mod file_config;
mod loader;

pub use app_config::{ApiConfig, AppConfig, ChannelConfig, LogConfig};
pub use loader::load;
