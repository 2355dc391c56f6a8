use kpi_agent::Pipeline;
use kpi_config::AgentConfig;
use kpi_notify::{RecordingSink, SinkManager};
use kpi_remote::{MemoryHost, MemorySessionFactory, SessionFactory};
use kpi_timeseries::MemoryStore;
use kpi_types::{KpiThreshold, NodeConfig, NodeType};
use std::sync::Arc;
use std::time::Duration;

fn config(log_dir: &std::path::Path) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.logging.log_dir = log_dir.to_path_buf();
    config.nodes = vec![
        NodeConfig::new("MME01", NodeType::Mme, "10.0.0.1"),
        NodeConfig::new("PGW01", NodeType::Pgw, "10.0.1.1"),
    ];
    config.thresholds = vec![KpiThreshold::new(NodeType::Mme, "attach_lte", 95.0)];
    config
}

fn sessions(delay: Option<Duration>) -> MemorySessionFactory {
    let host = MemoryHost::new().with_command(
        "pdc_kpi.pl -i 3 -l",
        "Day: 01\nTime: 00:05:00\nattach_lte: 0.40%\nMME#",
    );
    let factory = MemorySessionFactory::new().with_host("MME01", host);
    match delay {
        Some(delay) => factory.with_open_delay(delay),
        None => factory,
    }
}

fn pipeline(config: AgentConfig, sessions: MemorySessionFactory) -> Pipeline {
    let sink = RecordingSink::new();
    Pipeline::with_parts(
        config,
        Arc::new(MemoryStore::new()),
        |_| -> Arc<dyn SessionFactory> { Arc::new(sessions.clone()) },
        |_| SinkManager::new().with_sink(Box::new(sink.clone())),
    )
}

#[tokio::test]
async fn test_run_cycle_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(config(dir.path()), sessions(None));

    let report = pipeline.run_cycle(NodeType::Mme).await.unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.ingested, 1);
    assert!(dir.path().join("last_job_MME.json").exists());
}

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Arc::new(pipeline(
        config(dir.path()),
        sessions(Some(Duration::from_millis(300))),
    ));

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move { pipeline.try_run_cycle(NodeType::Mme).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(pipeline.try_run_cycle(NodeType::Mme).await.is_none());
    assert!(first.await.unwrap().is_some());

    // 其它类型不受影响
    let pgw = pipeline.try_run_cycle(NodeType::Pgw).await.unwrap();
    assert_eq!(pgw.total, 1);
    assert_eq!(pgw.failed, 1);
}
