use tokio::task::JoinHandle;
use tracing::Instrument;

use super::stage::Stage;
use crate::EnricherResult;

#[derive(Debug)]
pub struct Node {
    pub name: String,
    stage: Box<dyn Stage>,
}

impl Node {
    pub fn new(stage: Box<dyn Stage>) -> Self {
        let name = stage.name().to_string();
        Self { name, stage }
    }

    pub async fn check(&self) -> EnricherResult<()> {
        self.stage.check().await
    }

    /// Spawns the stage's run followed by its close. The stage is always closed, even when its
    /// run fails, so downstream ports observe completion.
    #[tracing::instrument(level = "debug", name = "run node", skip(self), fields(node=%self.name))]
    pub fn run(mut self) -> JoinHandle<EnricherResult<()>> {
        tokio::spawn(
            async move {
                let run_result = self.stage.run().instrument(tracing::debug_span!("run graph node")).await;
                if let Err(err) = &run_result {
                    tracing::error!(error=?err, "node run failed.");
                }

                let close_result = self
                    .stage
                    .close()
                    .instrument(tracing::debug_span!("close graph node"))
                    .await;
                if let Err(err) = &close_result {
                    tracing::error!(error=?err, "node close failed.");
                }

                run_result.and(close_result)
            }
            .instrument(tracing::debug_span!("spawn-run-graph-node")),
        )
    }
}
