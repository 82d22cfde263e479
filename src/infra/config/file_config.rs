use serde::Deserialize;

use crate::infra::config::{ApiConfig, AppConfig, ChannelConfig, LogConfig};

#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    pub logging: Option<FileLogConfig>,
    pub api: Option<FileApiConfig>,
    pub channel: Option<FileChannelConfig>,
}

impl FileConfig {
    pub fn merge_into(self, config: &mut AppConfig) {
        if let Some(logging) = self.logging {
            logging.merge_into(&mut config.logging);
        }

        if let Some(api) = self.api {
            api.merge_into(&mut config.api);
        }

        if let Some(channel) = self.channel {
            channel.merge_into(&mut config.channel);
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileLogConfig {
    pub level: Option<String>,
}

impl FileLogConfig {
    fn merge_into(self, config: &mut LogConfig) {
        if let Some(level) = self.level {
            config.level = level;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileApiConfig {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl FileApiConfig {
    fn merge_into(self, config: &mut ApiConfig) {
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }

        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileChannelConfig {
    pub ws_url: Option<String>,
}

impl FileChannelConfig {
    fn merge_into(self, config: &mut ChannelConfig) {
        if let Some(ws_url) = self.ws_url {
            config.ws_url = ws_url;
        }
    }
}
