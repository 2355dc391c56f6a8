//! 交互式 Shell 的命令收发
//!
//! 以 1 KiB 为单位读取输出，累积到提示符出现或到达截止时间为止。超时不是错误：
//! 返回已经收到的内容，由上层解析器决定能否使用。

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::debug;

const READ_CHUNK: usize = 1024;

/// 读取输出直到 `prompt` 出现、对端关闭或超时，返回去除首尾空白的文本
///
/// 空提示符永远不会匹配，此时一直读到超时。
pub async fn read_until_prompt<R>(
    reader: &mut R,
    prompt: &str,
    timeout: Duration,
) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let mut output: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_CHUNK];

    loop {
        match tokio::time::timeout_at(deadline, reader.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                output.extend_from_slice(&buf[..n]);
                if !prompt.is_empty() && contains(&output, prompt.as_bytes()) {
                    break;
                }
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!(received = output.len(), "Prompt not seen before deadline");
                break;
            }
        }
    }

    Ok(String::from_utf8_lossy(&output).trim().to_string())
}

/// 写入一条命令（自动追加换行）并等待提示符
pub async fn send_command<S>(
    stream: &mut S,
    command: &str,
    prompt: &str,
    timeout: Duration,
) -> std::io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(command.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;

    read_until_prompt(stream, prompt, timeout).await
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stops_at_prompt() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::spawn(async move {
            server.write_all(b"  Day: 12\nTime: 10:35:00\nMME01# ").await.unwrap();
            // 保持连接，验证确实是提示符而非 EOF 结束了读取
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let started = Instant::now();
        let output = read_until_prompt(&mut client, "#", Duration::from_secs(3))
            .await
            .unwrap();

        assert_eq!(output, "Day: 12\nTime: 10:35:00\nMME01#");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_timeout_returns_partial_output() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::spawn(async move {
            server.write_all(b"partial output").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let output = read_until_prompt(&mut client, "#", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(output, "partial output");
    }

    #[tokio::test]
    async fn test_empty_prompt_reads_until_timeout() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::spawn(async move {
            server.write_all(b"line with # inside").await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let started = Instant::now();
        let output = read_until_prompt(&mut client, "", Duration::from_millis(200))
            .await
            .unwrap();
        assert_eq!(output, "line with # inside");
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_eof_ends_read() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);

        let output = read_until_prompt(&mut client, "#", Duration::from_secs(3))
            .await
            .unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_send_command_writes_newline() {
        let (mut client, mut server) = tokio::io::duplex(256);

        let responder = tokio::spawn(async move {
            let mut received = Vec::new();
            let mut buf = [0u8; 64];
            while !received.ends_with(b"\n") {
                let n = server.read(&mut buf).await.unwrap();
                received.extend_from_slice(&buf[..n]);
            }
            server.write_all(b"ok\n#").await.unwrap();
            received
        });

        let output = send_command(&mut client, "pdc_kpi.pl -i 3 -l", "#", Duration::from_secs(3))
            .await
            .unwrap();

        assert_eq!(output, "ok\n#");
        assert_eq!(responder.await.unwrap(), b"pdc_kpi.pl -i 3 -l\n");
    }
}
