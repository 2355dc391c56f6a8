use crate::agent::AgentConfig;
use anyhow::{anyhow, bail, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 配置加载器：TOML 文件 + `KPI_` 前缀的环境变量覆盖
pub struct ConfigLoader {
    path: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            env_prefix: "KPI".to_string(),
        }
    }

    /// 环境变量前缀，例如 `KPI` 对应 `KPI_STORE__URL`
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载、解析密码并验证
    pub fn load(&self) -> Result<AgentConfig> {
        if !self.path.exists() {
            bail!("Config file not found: {}", self.path.display());
        }

        let config = Config::builder()
            .add_source(File::new(
                self.path
                    .to_str()
                    .ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ))
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut agent: AgentConfig = config.try_deserialize()?;
        agent.resolve_secrets()?;
        agent.validate()?;

        debug!(
            path = %self.path.display(),
            nodes = agent.nodes.len(),
            thresholds = agent.thresholds.len(),
            "Configuration loaded"
        );
        Ok(agent)
    }
}
