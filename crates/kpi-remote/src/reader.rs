//! 远端文件的随机读取策略：读头部、按块反向读尾部、按块反向扫描标记。
//!
//! 所有函数只依赖 `AsyncRead + AsyncSeek`，SFTP 文件与内存中的 `Cursor` 走同一套逻辑。
//! 解码一律使用 lossy UTF-8，非法字节被替换，不会报错。

use std::io::SeekFrom;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, BufReader};

/// 读取前 `count` 行
pub async fn head_lines<R>(reader: R, count: usize) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::with_capacity(count);
    let mut buf = Vec::new();

    while lines.len() < count {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        lines.push(decode_line(&buf));
    }

    Ok(lines)
}

/// 按 `chunk_size` 反向读取，直到凑够 `count` 个完整行或到达文件开头
pub async fn tail_lines<R>(
    file: &mut R,
    size: u64,
    count: usize,
    chunk_size: usize,
) -> std::io::Result<Vec<String>>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    if count == 0 || size == 0 {
        return Ok(Vec::new());
    }

    let chunk = chunk_size.max(1) as u64;
    let mut pos = size;
    let mut buf: Vec<u8> = Vec::new();

    loop {
        let read_size = chunk.min(pos);
        pos -= read_size;

        let mut block = read_block(file, pos, read_size).await?;
        block.extend_from_slice(&buf);
        buf = block;

        if pos == 0 || complete_lines(&buf) >= count {
            break;
        }
    }

    let lines = split_lines(&buf, pos == 0);
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..]
        .iter()
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect())
}

/// 在文件末尾 `max_scan` 字节范围内反向查找最后一次出现的 `marker`，
/// 找到则返回从标记处到文件末尾的内容，否则返回空串
pub async fn read_from_last_marker<R>(
    file: &mut R,
    size: u64,
    marker: &[u8],
    chunk_size: usize,
    max_scan: Option<u64>,
) -> std::io::Result<String>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    if size == 0 || marker.is_empty() {
        return Ok(String::new());
    }

    let chunk = chunk_size.max(1) as u64;
    let mut pos = size;
    let mut scanned = 0u64;
    let mut acc: Vec<u8> = Vec::new();

    while pos > 0 && max_scan.map_or(true, |limit| scanned < limit) {
        let read_size = chunk.min(pos);
        pos -= read_size;

        let mut block = read_block(file, pos, read_size).await?;
        scanned += read_size;

        // 旧数据已经搜索过，只需覆盖新块以及跨越块边界的部分
        let search_end = (block.len() + marker.len() - 1).min(block.len() + acc.len());
        block.extend_from_slice(&acc);
        acc = block;

        if let Some(idx) = rfind(&acc[..search_end], marker) {
            return Ok(String::from_utf8_lossy(&acc[idx..]).into_owned());
        }
    }

    Ok(String::new())
}

async fn read_block<R>(file: &mut R, pos: u64, len: u64) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + AsyncSeek + Unpin,
{
    file.seek(SeekFrom::Start(pos)).await?;
    let mut block = vec![0u8; len as usize];
    file.read_exact(&mut block).await?;
    Ok(block)
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(strip_eol(bytes)).into_owned()
}

fn strip_eol(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// 缓冲区中完整行的数量（第一段可能是被截断的行，不计入）
fn complete_lines(buf: &[u8]) -> usize {
    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    body.iter().filter(|b| **b == b'\n').count()
}

fn split_lines(buf: &[u8], at_start: bool) -> Vec<&[u8]> {
    let body = buf.strip_suffix(b"\n").unwrap_or(buf);
    let mut lines: Vec<&[u8]> = body
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .collect();

    if !at_start && !lines.is_empty() {
        lines.remove(0);
    }
    lines
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn numbered_file(lines: usize) -> Vec<u8> {
        (1..=lines)
            .map(|i| format!("2025-01-01 00:{:02}:00|{}|{}\n", i % 60, i * 10, i * 20))
            .collect::<String>()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_head_lines() {
        let data = b"first line\r\nsecond|header|line\nthird\n".to_vec();
        let lines = head_lines(Cursor::new(data), 2).await.unwrap();
        assert_eq!(lines, vec!["first line", "second|header|line"]);
    }

    #[tokio::test]
    async fn test_head_lines_short_file() {
        let lines = head_lines(Cursor::new(b"only".to_vec()), 2).await.unwrap();
        assert_eq!(lines, vec!["only"]);
    }

    #[tokio::test]
    async fn test_tail_lines_exact_count_for_every_chunk_size() {
        let data = numbered_file(200);
        let text = String::from_utf8(data.clone()).unwrap();
        let expected_last = text.lines().last().unwrap().to_string();

        for chunk_size in [1, 7, 16, 64, 1000, 128 * 1024] {
            for count in [1, 4, 37, 200] {
                let size = data.len() as u64;
                let mut cursor = Cursor::new(data.clone());
                let lines = tail_lines(&mut cursor, size, count, chunk_size).await.unwrap();

                assert_eq!(lines.len(), count, "chunk={} count={}", chunk_size, count);
                assert_eq!(lines.last().unwrap(), &expected_last);
                let expected: Vec<&str> = text.lines().skip(200 - count).collect();
                assert_eq!(lines, expected);
            }
        }
    }

    #[tokio::test]
    async fn test_tail_lines_without_trailing_newline() {
        let data = b"a\nb\nc".to_vec();
        let mut cursor = Cursor::new(data.clone());
        let lines = tail_lines(&mut cursor, data.len() as u64, 2, 2).await.unwrap();
        assert_eq!(lines, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_tail_lines_more_than_available() {
        let data = b"a\nb\n".to_vec();
        let mut cursor = Cursor::new(data.clone());
        let lines = tail_lines(&mut cursor, data.len() as u64, 10, 3).await.unwrap();
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_tail_lines_invalid_utf8_is_replaced() {
        let data = b"ok\n\xff\xfebad\n".to_vec();
        let mut cursor = Cursor::new(data.clone());
        let lines = tail_lines(&mut cursor, data.len() as u64, 1, 4).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("bad"));
        assert!(lines[0].contains('\u{FFFD}'));
    }

    #[tokio::test]
    async fn test_marker_scan_finds_last_header() {
        let header = "Timestamp,PmpId,CpuLoadCh";
        let data = format!(
            "{h}\nold,1\nold,2\n{h}\nnew,1\nnew,2\n",
            h = header
        )
        .into_bytes();

        for chunk_size in [1, 5, 13, 4096] {
            let mut cursor = Cursor::new(data.clone());
            let block = read_from_last_marker(
                &mut cursor,
                data.len() as u64,
                header.as_bytes(),
                chunk_size,
                None,
            )
            .await
            .unwrap();
            assert_eq!(block, format!("{}\nnew,1\nnew,2\n", header), "chunk={}", chunk_size);
        }
    }

    #[tokio::test]
    async fn test_marker_scan_missing_marker_returns_empty() {
        let data = b"a,b,c\n1,2,3\n".to_vec();
        let mut cursor = Cursor::new(data.clone());
        let block = read_from_last_marker(&mut cursor, data.len() as u64, b"Timestamp", 4, None)
            .await
            .unwrap();
        assert!(block.is_empty());
    }

    #[tokio::test]
    async fn test_marker_scan_respects_window() {
        let mut data = b"HEADER\n".to_vec();
        data.extend(std::iter::repeat(b'x').take(1000));
        let size = data.len() as u64;

        let mut cursor = Cursor::new(data.clone());
        let block = read_from_last_marker(&mut cursor, size, b"HEADER", 100, Some(500))
            .await
            .unwrap();
        assert!(block.is_empty());

        let mut cursor = Cursor::new(data);
        let block = read_from_last_marker(&mut cursor, size, b"HEADER", 100, None)
            .await
            .unwrap();
        assert!(block.starts_with("HEADER\n"));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(tail_lines(&mut cursor, 0, 3, 16).await.unwrap().is_empty());
        assert!(read_from_last_marker(&mut cursor, 0, b"x", 16, None)
            .await
            .unwrap()
            .is_empty());
    }
}
