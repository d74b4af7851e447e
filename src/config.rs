use std::time::Duration;

use anyhow::Result;
use clap_serde_derive::ClapSerde;
use serde::Deserialize;

/// Credentials for the rotating WebShare proxy pool.
#[derive(Clone, Debug)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

#[derive(ClapSerde, Deserialize, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[arg(short, long, env, default_value = "0.0.0.0")]
    pub(crate) address: String,

    /// The port the listener binds to
    #[arg(short, long, env, default_value = "8080")]
    pub(crate) port: u16,

    /// WebShare proxy username, leave empty to disable proxying
    #[arg(long, env, default_value = "", hide_env_values = true)]
    pub(crate) webshare_username: String,

    /// WebShare proxy password, leave empty to disable proxying
    #[arg(long, env, default_value = "", hide_env_values = true)]
    pub(crate) webshare_password: String,

    /// Endpoint of the rotating proxy pool
    #[arg(long, env, default_value = "http://proxy.webshare.io:80")]
    pub(crate) proxy_url: String,

    /// Timeout in seconds applied to each upstream request
    #[arg(long, env, default_value = "10")]
    pub(crate) request_timeout_secs: u64,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }

    /// Proxying needs both credential halves; anything less means direct only.
    pub(crate) fn proxy_credentials(&self) -> Option<ProxyCredentials> {
        if self.webshare_username.is_empty() || self.webshare_password.is_empty() {
            return None;
        }
        Some(ProxyCredentials {
            username: self.webshare_username.clone(),
            password: self.webshare_password.clone(),
        })
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
