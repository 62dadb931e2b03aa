use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,  // request body limit in bytes
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub sentinel_enabled: bool,
    pub sentinel_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

// Which DocumentStore implementation the server runs against
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    // Redis URL to connect to, honouring the sentinel switch
    pub fn redis_url(&self) -> Result<&str, config::ConfigError> {
        if self.redis.sentinel_enabled {
            self.redis
                .sentinel_url
                .as_deref()
                .ok_or_else(|| config::ConfigError::NotFound("redis.sentinel_url".into()))
        } else {
            Ok(&self.redis.url)
        }
    }
}

#[cfg(test)]
impl Config {
    pub fn in_memory() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                max_body_bytes: 64 * 1024,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".into(),
                sentinel_enabled: false,
                sentinel_url: None,
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
            },
        }
    }
}
