use crate::error::Result;
use crate::sink::AlertSink;
use async_trait::async_trait;
use kpi_types::{AlertPayload, NodeType};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 把告警写入 `<dir>/<TYPE>_signals.json`，每次覆盖
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, node_type: NodeType) -> PathBuf {
        signals_path(&self.dir, node_type)
    }
}

pub fn signals_path(dir: &Path, node_type: NodeType) -> PathBuf {
    dir.join(format!("{}_signals.json", node_type))
}

#[async_trait]
impl AlertSink for FileSink {
    async fn send(&self, payload: &AlertPayload) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let path = self.path_for(payload.node_type);
        let json = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(&path, json).await?;

        debug!(path = %path.display(), entries = payload.data.len(), "Alert payload written");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_sink_writes_per_type() {
        let dir = tempdir().unwrap();
        let sink = FileSink::new(dir.path().join("signals"));

        sink.send(&AlertPayload::empty(NodeType::Sbg)).await.unwrap();

        let path = dir.path().join("signals").join("SBG_signals.json");
        let saved: AlertPayload =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(saved, AlertPayload::empty(NodeType::Sbg));
    }
}
