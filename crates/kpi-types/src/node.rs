use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 网元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    /// 交互式 CLI 计数器（Type A）
    Mme,
    /// 增量计数器日志文件（Type B）
    Pgw,
    /// 会话统计 CSV 日志（Type C）
    Sbg,
}

impl NodeType {
    pub const ALL: [NodeType; 3] = [NodeType::Mme, NodeType::Pgw, NodeType::Sbg];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mme => "MME",
            Self::Pgw => "PGW",
            Self::Sbg => "SBG",
        }
    }

    /// 时序库中的表名
    pub fn table_name(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MME" => Ok(Self::Mme),
            "PGW" => Ok(Self::Pgw),
            "SBG" => Ok(Self::Sbg),
            other => Err(format!("unknown node type: {}", other)),
        }
    }
}

/// 登录凭据
///
/// 密码只在内存中保存：不参与序列化，`Debug` 输出也会被遮蔽。
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Credentials {
    pub username: String,

    #[serde(default, skip_serializing)]
    password: String,

    /// 从环境变量读取密码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            password_env: None,
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn set_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("password_env", &self.password_env)
            .finish()
    }
}

fn default_port() -> u16 {
    22
}

fn default_enabled() -> bool {
    true
}

/// 网元配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// 网元名称（同时作为时序库中的 Node 标签）
    pub id: String,

    /// 网元类型
    pub node_type: NodeType,

    /// 管理地址
    pub address: String,

    /// SSH 端口
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(flatten)]
    pub credentials: Credentials,

    /// 远端路径（文件或目录，取决于网元类型）
    #[serde(default)]
    pub remote_path: String,

    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl NodeConfig {
    pub fn new(id: impl Into<String>, node_type: NodeType, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            address: address.into(),
            port: default_port(),
            credentials: Credentials::default(),
            remote_path: String::new(),
            enabled: true,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_remote_path(mut self, remote_path: impl Into<String>) -> Self {
        self.remote_path = remote_path.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
