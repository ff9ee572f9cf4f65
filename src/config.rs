use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path} 失败: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("配置文件格式错误: {0}")]
    Format(#[from] serde_json::Error),
    #[error("环境变量 {name} 的值无效: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// 服务配置；文件中缺省的字段取默认值
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub resource_dir: String,
    pub task_ttl_secs: u64,
    pub cleanup_interval_secs: u64,
    /// 单个投影请求可用的最大工作线程数，超出的请求会被截断
    pub max_concurrency_cap: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            resource_dir: "test/resource".to_string(),
            task_ttl_secs: 30 * 60,
            cleanup_interval_secs: 5 * 60,
            max_concurrency_cap: parallelism.clamp(1, 16),
        }
    }
}

impl ServerConfig {
    pub const CONFIG_ENV: &'static str = "AMR_PROJECTOR_CONFIG";
    pub const PORT_ENV: &'static str = "AMR_PROJECTOR_PORT";
    pub const RESOURCE_DIR_ENV: &'static str = "AMR_PROJECTOR_RESOURCE_DIR";

    /// 读取 `AMR_PROJECTOR_CONFIG` 指向的 JSON 文件 (若有)，再应用单项环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(Self::CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        if let Ok(port) = std::env::var(Self::PORT_ENV) {
            config.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: Self::PORT_ENV,
                value: port,
            })?;
        }
        if let Ok(dir) = std::env::var(Self::RESOURCE_DIR_ENV) {
            config.resource_dir = dir;
        }
        Ok(config.normalized())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.max_concurrency_cap = self.max_concurrency_cap.max(1);
        self.cleanup_interval_secs = self.cleanup_interval_secs.max(1);
        self
    }
}
