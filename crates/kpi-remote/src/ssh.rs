use crate::error::{Result, TransportError};
use crate::reader;
use crate::session::{join_remote, pick_newest, RemoteSession, SessionFactory, SessionOptions};
use crate::shell;
use async_trait::async_trait;
use kpi_types::NodeConfig;
use russh::client;
use russh::{ChannelStream, Disconnect};
use russh_keys::key;
use russh_sftp::client::SftpSession;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 主机密钥不做校验：网元位于隔离的管理网中
struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// 基于 SSH 的远程会话
///
/// Shell 通道与 SFTP 子系统都是按需打开的：只读文件的采集器不会启动交互 Shell，反之亦然。
pub struct SshSession {
    node_id: String,
    addr: String,
    handle: client::Handle<ClientHandler>,
    options: SessionOptions,
    shell: Option<ChannelStream<client::Msg>>,
    sftp: Option<SftpSession>,
}

impl SshSession {
    async fn shell(&mut self) -> Result<&mut ChannelStream<client::Msg>> {
        if self.shell.is_none() {
            let channel = self.handle.channel_open_session().await?;
            channel
                .request_pty(false, "vt100", 200, 50, 0, 0, &[])
                .await?;
            channel.request_shell(false).await?;

            let mut stream = channel.into_stream();
            // 丢弃登录横幅
            let banner =
                shell::read_until_prompt(&mut stream, &self.options.prompt, self.options.command_timeout())
                    .await?;
            debug!(node = %self.node_id, banner_len = banner.len(), "Interactive shell ready");

            self.shell = Some(stream);
        }

        self.shell
            .as_mut()
            .ok_or_else(|| TransportError::Timeout("shell channel unavailable".to_string()))
    }

    async fn sftp(&mut self) -> Result<&SftpSession> {
        if self.sftp.is_none() {
            let channel = self.handle.channel_open_session().await?;
            match &self.options.sftp_command {
                Some(command) => channel.exec(true, command.as_str()).await?,
                None => channel.request_subsystem(true, "sftp").await?,
            }

            let sftp = SftpSession::new(channel.into_stream())
                .await
                .map_err(TransportError::sftp)?;
            debug!(
                node = %self.node_id,
                elevated = self.options.sftp_command.is_some(),
                "SFTP session ready"
            );

            self.sftp = Some(sftp);
        }

        self.sftp
            .as_ref()
            .ok_or_else(|| TransportError::Sftp("sftp session unavailable".to_string()))
    }

    async fn open_file(&mut self, path: &str) -> Result<(russh_sftp::client::fs::File, u64)> {
        let sftp = self.sftp().await?;

        if !sftp.try_exists(path).await.map_err(TransportError::sftp)? {
            return Err(TransportError::NotFound(path.to_string()));
        }

        let file = sftp.open(path).await.map_err(TransportError::sftp)?;
        let size = file
            .metadata()
            .await
            .map_err(TransportError::sftp)?
            .size
            .unwrap_or(0);

        Ok((file, size))
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn run_command(&mut self, command: &str) -> Result<String> {
        let prompt = self.options.prompt.clone();
        let timeout = self.options.command_timeout();
        let stream = self.shell().await?;

        let output = shell::send_command(stream, command, &prompt, timeout).await?;
        debug!(command, output_len = output.len(), "Command finished");
        Ok(output)
    }

    async fn head_lines(&mut self, path: &str, count: usize) -> Result<Vec<String>> {
        let (file, _) = self.open_file(path).await?;
        Ok(reader::head_lines(Box::pin(file), count).await?)
    }

    async fn tail_lines(&mut self, path: &str, count: usize) -> Result<Vec<String>> {
        let chunk = self.options.tail_chunk_size;
        let (file, size) = self.open_file(path).await?;
        let mut file = Box::pin(file);

        let lines = reader::tail_lines(&mut file, size, count, chunk).await?;
        debug!(path, size, lines = lines.len(), "Read file tail");
        Ok(lines)
    }

    async fn read_from_last_marker(&mut self, path: &str, marker: &str) -> Result<String> {
        let chunk = self.options.scan_chunk_size;
        let max_scan = self.options.max_scan_bytes;
        let (file, size) = self.open_file(path).await?;
        let mut file = Box::pin(file);

        let block =
            reader::read_from_last_marker(&mut file, size, marker.as_bytes(), chunk, max_scan)
                .await?;
        debug!(path, size, block_len = block.len(), "Scanned for marker");
        Ok(block)
    }

    async fn newest_file(&mut self, dir: &str) -> Result<Option<String>> {
        let sftp = self.sftp().await?;
        let entries = sftp.read_dir(dir).await.map_err(TransportError::sftp)?;

        let newest = pick_newest(entries.filter_map(|entry| {
            let meta = entry.metadata();
            meta.is_regular().then(|| {
                (
                    entry.file_name(),
                    meta.mtime.unwrap_or(0) as u64,
                    meta.size.unwrap_or(0),
                )
            })
        }));

        Ok(newest.map(|name| join_remote(dir, &name)))
    }

    async fn close(&mut self) -> Result<()> {
        self.shell = None;

        if let Some(sftp) = self.sftp.take() {
            if let Err(e) = sftp.close().await {
                debug!(node = %self.node_id, error = %e, "SFTP close failed");
            }
        }

        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            warn!(node = %self.node_id, addr = %self.addr, error = %e, "SSH disconnect failed");
        }

        debug!(node = %self.node_id, "Session closed");
        Ok(())
    }
}

/// 使用密码认证建立 SSH 会话
pub struct SshSessionFactory {
    options: SessionOptions,
    config: Arc<client::Config>,
}

impl SshSessionFactory {
    pub fn new(options: SessionOptions) -> Self {
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        Self {
            options,
            config: Arc::new(config),
        }
    }

    /// 为某类网元覆盖会话参数（例如 SBG 需要提权启动 sftp-server）
    pub fn with_options(&self, options: SessionOptions) -> Self {
        Self {
            options,
            config: self.config.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    async fn open(&self, node: &NodeConfig) -> Result<Box<dyn RemoteSession>> {
        let addr = format!("{}:{}", node.address, node.port);
        let user = node.credentials.username.clone();
        let timeout = self.options.connect_timeout();

        let connect = client::connect(
            self.config.clone(),
            (node.address.as_str(), node.port),
            ClientHandler,
        );
        let mut handle = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| TransportError::Timeout(format!("connect to {}", addr)))?
            .map_err(|e| TransportError::Connect {
                addr: addr.clone(),
                message: e.to_string(),
            })?;

        let authenticated = tokio::time::timeout(
            timeout,
            handle.authenticate_password(user.clone(), node.credentials.password()),
        )
        .await
        .map_err(|_| TransportError::Timeout(format!("authenticate to {}", addr)))??;

        if !authenticated {
            return Err(TransportError::Auth { user, addr });
        }

        info!(node = %node.id, addr = %addr, user = %user, "SSH session established");

        Ok(Box::new(SshSession {
            node_id: node.id.clone(),
            addr,
            handle,
            options: self.options.clone(),
            shell: None,
            sftp: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_types::{Credentials, NodeType};

    #[tokio::test]
    async fn test_unreachable_node_fails_fast() {
        let options = SessionOptions {
            connect_timeout_secs: 2,
            ..Default::default()
        };
        let factory = SshSessionFactory::new(options);
        let node = NodeConfig::new("MME01", NodeType::Mme, "127.0.0.1")
            .with_port(1)
            .with_credentials(Credentials::new("ops", "secret"));

        let err = match factory.open(&node).await {
            Ok(_) => panic!("connection to a closed port must fail"),
            Err(e) => e,
        };
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Timeout(_)
        ));
        assert!(!err.to_string().contains("secret"));
    }
}
