use crate::error::Result;
use async_trait::async_trait;
use kpi_types::NodeConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 远程会话参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Shell 提示符
    pub prompt: String,

    /// 连接超时（秒）
    pub connect_timeout_secs: u64,

    /// 单条命令等待提示符的超时（毫秒）
    pub command_timeout_ms: u64,

    /// 通过提权包装命令启动 sftp-server；为空时使用标准 sftp 子系统
    pub sftp_command: Option<String>,

    /// 反向读取尾部时的块大小
    pub tail_chunk_size: usize,

    /// 反向扫描标记时的块大小
    pub scan_chunk_size: usize,

    /// 反向扫描的最大字节数
    pub max_scan_bytes: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            prompt: "#".to_string(),
            connect_timeout_secs: 10,
            command_timeout_ms: 5000,
            sftp_command: None,
            tail_chunk_size: 128 * 1024,
            scan_chunk_size: 64 * 1024,
            max_scan_bytes: Some(16 * 1024 * 1024),
        }
    }
}

impl SessionOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// 单个网元的远程会话
///
/// 会话由采集任务独占，结束时必须调用 [`RemoteSession::close`]。
#[async_trait]
pub trait RemoteSession: Send {
    /// 发送命令并收集输出，直到提示符再次出现或超时
    async fn run_command(&mut self, command: &str) -> Result<String>;

    /// 读取文件前 `count` 行
    async fn head_lines(&mut self, path: &str, count: usize) -> Result<Vec<String>>;

    /// 按块反向读取文件最后 `count` 行
    async fn tail_lines(&mut self, path: &str, count: usize) -> Result<Vec<String>>;

    /// 反向扫描最后一次出现的 `marker`，返回从该处到文件末尾的内容；未找到返回空串
    async fn read_from_last_marker(&mut self, path: &str, marker: &str) -> Result<String>;

    /// 目录中修改时间最新的普通文件
    async fn newest_file(&mut self, dir: &str) -> Result<Option<String>>;

    /// 释放会话
    async fn close(&mut self) -> Result<()>;
}

/// 会话工厂
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self, node: &NodeConfig) -> Result<Box<dyn RemoteSession>>;
}

/// 目录条目中选出最新的普通文件：修改时间优先，相同则取较大者
pub(crate) fn pick_newest<I>(entries: I) -> Option<String>
where
    I: IntoIterator<Item = (String, u64, u64)>,
{
    let mut latest: Option<(String, u64, u64)> = None;

    for (name, mtime, size) in entries {
        let newer = match &latest {
            None => true,
            Some((_, best_mtime, best_size)) => {
                mtime > *best_mtime || (mtime == *best_mtime && size > *best_size)
            }
        };
        if newer {
            latest = Some((name, mtime, size));
        }
    }

    latest.map(|(name, _, _)| name)
}

pub(crate) fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_newest() {
        let entries = vec![
            ("a.csv".to_string(), 100, 10),
            ("b.csv".to_string(), 200, 5),
            ("c.csv".to_string(), 200, 50),
            ("d.csv".to_string(), 150, 999),
        ];
        assert_eq!(pick_newest(entries), Some("c.csv".to_string()));
        assert_eq!(pick_newest(Vec::new()), None);
    }

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/var/log/", "x.csv"), "/var/log/x.csv");
        assert_eq!(join_remote("/var/log", "x.csv"), "/var/log/x.csv");
    }
}
