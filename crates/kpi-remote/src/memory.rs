//! 内存中的远程主机，用于测试和演练模式
//!
//! 文件读取走与 SFTP 相同的分块读取函数，命令输出按完整命令文本匹配。

use crate::error::{Result, TransportError};
use crate::reader;
use crate::session::{pick_newest, RemoteSession, SessionFactory, SessionOptions};
use async_trait::async_trait;
use kpi_types::NodeConfig;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemoryFile {
    content: Vec<u8>,
    mtime: u64,
}

/// 模拟的远端主机
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    commands: HashMap<String, String>,
    files: HashMap<String, MemoryFile>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令输出
    pub fn with_command(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.commands.insert(command.into(), output.into());
        self
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.with_file_mtime(path, content, 0)
    }

    pub fn with_file_mtime(
        mut self,
        path: impl Into<String>,
        content: impl Into<Vec<u8>>,
        mtime: u64,
    ) -> Self {
        self.files.insert(
            path.into(),
            MemoryFile {
                content: content.into(),
                mtime,
            },
        );
        self
    }

    fn file(&self, path: &str) -> Result<&MemoryFile> {
        self.files
            .get(path)
            .ok_or_else(|| TransportError::NotFound(path.to_string()))
    }
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// 内存会话
pub struct MemorySession {
    host: MemoryHost,
    options: SessionOptions,
    counters: Arc<Counters>,
    closed: bool,
}

#[async_trait]
impl RemoteSession for MemorySession {
    async fn run_command(&mut self, command: &str) -> Result<String> {
        // 未注册的命令相当于提示符始终没有出现：返回空输出
        Ok(self
            .host
            .commands
            .get(command)
            .map(|output| output.trim().to_string())
            .unwrap_or_default())
    }

    async fn head_lines(&mut self, path: &str, count: usize) -> Result<Vec<String>> {
        let file = self.host.file(path)?;
        Ok(reader::head_lines(Cursor::new(file.content.as_slice()), count).await?)
    }

    async fn tail_lines(&mut self, path: &str, count: usize) -> Result<Vec<String>> {
        let file = self.host.file(path)?;
        let size = file.content.len() as u64;
        let mut cursor = Cursor::new(file.content.as_slice());
        Ok(reader::tail_lines(&mut cursor, size, count, self.options.tail_chunk_size).await?)
    }

    async fn read_from_last_marker(&mut self, path: &str, marker: &str) -> Result<String> {
        let file = self.host.file(path)?;
        let size = file.content.len() as u64;
        let mut cursor = Cursor::new(file.content.as_slice());
        Ok(reader::read_from_last_marker(
            &mut cursor,
            size,
            marker.as_bytes(),
            self.options.scan_chunk_size,
            self.options.max_scan_bytes,
        )
        .await?)
    }

    async fn newest_file(&mut self, dir: &str) -> Result<Option<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));

        let newest = pick_newest(self.host.files.iter().filter_map(|(path, file)| {
            let name = path.strip_prefix(&prefix)?;
            (!name.contains('/')).then(|| (name.to_string(), file.mtime, file.content.len() as u64))
        }));

        Ok(newest.map(|name| format!("{}{}", prefix, name)))
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// 按网元 ID 分发内存主机的会话工厂
#[derive(Clone, Default)]
pub struct MemorySessionFactory {
    hosts: HashMap<String, MemoryHost>,
    unreachable: HashSet<String>,
    open_delay: Option<Duration>,
    options: SessionOptions,
    counters: Arc<Counters>,
}

impl MemorySessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, node_id: impl Into<String>, host: MemoryHost) -> Self {
        self.hosts.insert(node_id.into(), host);
        self
    }

    /// 该网元的连接总是失败
    pub fn with_unreachable(mut self, node_id: impl Into<String>) -> Self {
        self.unreachable.insert(node_id.into());
        self
    }

    /// 每次建立会话前等待一段时间
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// 成功建立的会话数
    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    /// 已关闭的会话数
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// 同时存活的会话数峰值
    pub fn peak_active(&self) -> usize {
        self.counters.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MemorySessionFactory {
    async fn open(&self, node: &NodeConfig) -> Result<Box<dyn RemoteSession>> {
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.peak.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }

        let addr = format!("{}:{}", node.address, node.port);
        let host = match (self.unreachable.contains(&node.id), self.hosts.get(&node.id)) {
            (false, Some(host)) => host.clone(),
            _ => {
                self.counters.active.fetch_sub(1, Ordering::SeqCst);
                return Err(TransportError::Connect {
                    addr,
                    message: "connection refused".to_string(),
                });
            }
        };

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            host,
            options: self.options.clone(),
            counters: self.counters.clone(),
            closed: false,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_types::NodeType;

    fn node(id: &str) -> NodeConfig {
        NodeConfig::new(id, NodeType::Sbg, "10.0.0.1")
    }

    #[tokio::test]
    async fn test_memory_session_reads() {
        let host = MemoryHost::new()
            .with_command("show kpi", "  value 1\n#  ")
            .with_file("/log/kpi.log", "h1\nh2\nr1\nr2\nr3\n");
        let factory = MemorySessionFactory::new().with_host("SBG01", host);

        let mut session = factory.open(&node("SBG01")).await.unwrap();
        assert_eq!(session.run_command("show kpi").await.unwrap(), "value 1\n#");
        assert_eq!(session.run_command("unknown").await.unwrap(), "");
        assert_eq!(
            session.head_lines("/log/kpi.log", 2).await.unwrap(),
            vec!["h1", "h2"]
        );
        assert_eq!(
            session.tail_lines("/log/kpi.log", 2).await.unwrap(),
            vec!["r2", "r3"]
        );
        assert!(session
            .tail_lines("/log/missing.log", 2)
            .await
            .unwrap_err()
            .is_not_found());

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(factory.opened(), 1);
        assert_eq!(factory.closed(), 1);
    }

    #[tokio::test]
    async fn test_newest_file_in_directory() {
        let host = MemoryHost::new()
            .with_file_mtime("/kpi/a.csv", "x", 100)
            .with_file_mtime("/kpi/b.csv", "xyz", 300)
            .with_file_mtime("/kpi/sub/c.csv", "x", 900)
            .with_file_mtime("/other/d.csv", "x", 999);
        let factory = MemorySessionFactory::new().with_host("SBG01", host);

        let mut session = factory.open(&node("SBG01")).await.unwrap();
        assert_eq!(
            session.newest_file("/kpi/").await.unwrap(),
            Some("/kpi/b.csv".to_string())
        );
        assert_eq!(session.newest_file("/empty").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let factory = MemorySessionFactory::new()
            .with_host("SBG01", MemoryHost::new())
            .with_unreachable("SBG01");

        let result = factory.open(&node("SBG01")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        assert!(factory.open(&node("SBG02")).await.is_err());
        assert_eq!(factory.opened(), 0);
    }
}
