use crate::pipeline::Pipeline;
use anyhow::Result;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

/// 按配置的 cron 表达式周期性运行各类网元的采集
pub struct CycleScheduler {
    scheduler: JobScheduler,
    pipeline: Arc<Pipeline>,
}

impl CycleScheduler {
    pub async fn new(pipeline: Arc<Pipeline>) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            pipeline,
        })
    }

    /// 注册所有启用的定时任务，返回任务数
    pub async fn register_all(&self) -> Result<usize> {
        let mut count = 0;

        for schedule in &self.pipeline.config().schedules {
            if !schedule.enabled {
                info!(node_type = %schedule.node_type, "Schedule disabled, skipping");
                continue;
            }

            let node_type = schedule.node_type;
            let pipeline = self.pipeline.clone();
            let job = Job::new_async(schedule.cron.as_str(), move |_uuid, _l| {
                let pipeline = pipeline.clone();
                Box::pin(async move {
                    // 同类网元的周期不会重叠
                    pipeline.try_run_cycle(node_type).await;
                })
            })?;

            let job_id = self.scheduler.add(job).await?;
            info!(
                node_type = %node_type,
                cron = %schedule.cron,
                job_id = %job_id,
                "Cycle scheduled"
            );
            count += 1;
        }

        Ok(count)
    }

    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await?;
        info!("Cycle scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        info!("Cycle scheduler stopped");
        Ok(())
    }
}
