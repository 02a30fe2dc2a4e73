use std::net::SocketAddr;

use crate::config::ConfigError;

#[derive(Debug, Clone)]
pub struct Config {
    // Listen address
    pub listen_addr: SocketAddr,
    // log level for http tracing
    pub log_level: tracing::Level,
    // largest request body accepted, uploads included
    pub max_body_bytes: usize,
}

impl TryFrom<&crate::Config> for Config {
    type Error = ConfigError;

    fn try_from(config: &crate::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            listen_addr: config.listen_addr,
            log_level: config.log_level()?,
            max_body_bytes: config.max_upload_bytes,
        })
    }
}
