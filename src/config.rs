use std::{env, fmt, net::SocketAddr, str::FromStr};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Http,
    Tcp,
    Stdio,
}

impl FromStr for Transport {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "tcp" => Ok(Self::Tcp),
            "stdio" => Ok(Self::Stdio),
            other => Err(ConfigError::InvalidTransport(other.to_string())),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Http => "http",
            Self::Tcp => "tcp",
            Self::Stdio => "stdio",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub transport: Transport,
    pub bind_addr: String,
    pub bind_port: u16,
    pub rpc_path: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("RPC_TRANSPORT must be one of http, tcp or stdio (got {0:?})")]
    InvalidTransport(String),
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("RPC_PATH must start with '/'")]
    InvalidPath,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let transport = env::var("RPC_TRANSPORT")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| value.parse::<Transport>())
            .transpose()?
            .unwrap_or(Transport::Http);

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let rpc_path = env::var("RPC_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "/rpc".to_string());
        if !rpc_path.starts_with('/') {
            return Err(ConfigError::InvalidPath);
        }

        let config = Self {
            transport,
            bind_addr,
            bind_port,
            rpc_path,
        };

        config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}
