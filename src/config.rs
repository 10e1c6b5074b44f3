use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
};

use dotenvy::dotenv;

use crate::{errors::ConfigError, policy::AcceptancePolicy};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_STORAGE_PATH: &str = "./uploads";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_type: StorageKind,
    pub storage_path: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub policy: AcceptancePolicy,
}

impl AppConfig {
    /// Reads `.env` if present, then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let storage_type = match var("STORAGE_TYPE").as_deref() {
            None | Some("local") => StorageKind::Local,
            Some("memory") => StorageKind::Memory,
            Some(other) => {
                return Err(ConfigError::InvalidVar {
                    key: "STORAGE_TYPE",
                    value: other.to_string(),
                });
            }
        };

        let host = match var("HOST") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidVar {
                key: "HOST",
                value,
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let port = match var("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidVar {
                key: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            storage_type,
            storage_path: var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_PATH)),
            host,
            port,
            policy: AcceptancePolicy::standard()?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
