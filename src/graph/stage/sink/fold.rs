use std::fmt::{self, Debug};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::StageError;
use crate::graph::{stage, Inlet, Port, SinkShape, Stage, PORT_DATA};
use crate::{AppData, EnricherResult, SharedString};

/// Terminal stage reducing everything it receives into a single accumulation.
///
/// The accumulation is handed over on the receiver from `take_final_rx()` when the inlet
/// completes or the stage is closed, whichever comes first.
pub struct Fold<F, In, Acc> {
    name: SharedString,
    acc: Option<Acc>,
    operation: F,
    inlet: Inlet<In>,
    tx_final: Option<oneshot::Sender<Acc>>,
    rx_final: Option<oneshot::Receiver<Acc>>,
}

impl<F, In, Acc> Fold<F, In, Acc>
where
    F: FnMut(Acc, In) -> Acc,
{
    pub fn new(name: impl Into<SharedString>, initial: Acc, operation: F) -> Self {
        let name = name.into();
        let inlet = Inlet::new(name.clone(), PORT_DATA);
        let (tx_final, rx_final) = oneshot::channel();

        Self {
            name,
            acc: Some(initial),
            operation,
            inlet,
            tx_final: Some(tx_final),
            rx_final: Some(rx_final),
        }
    }

    #[inline]
    pub fn take_final_rx(&mut self) -> Option<oneshot::Receiver<Acc>> {
        self.rx_final.take()
    }
}

impl<F, In, Acc> Fold<F, In, Acc>
where
    F: FnMut(Acc, In) -> Acc + Send + Sync + 'static,
    In: AppData,
    Acc: AppData,
{
    fn complete_fold(&mut self) -> Result<(), StageError> {
        if let (Some(tx_final), Some(acc)) = (self.tx_final.take(), self.acc.take()) {
            tx_final.send(acc).map_err(|acc| {
                StageError::Materialization(format!("{} final receiver dropped before accumulation: {:?}", self.name, acc))
            })?;
        }

        Ok(())
    }
}

impl<F, In: AppData, Acc> SinkShape for Fold<F, In, Acc> {
    type In = In;

    #[inline]
    fn inlet(&self) -> Inlet<Self::In> {
        self.inlet.clone()
    }
}

#[async_trait]
impl<F, In, Acc> Stage for Fold<F, In, Acc>
where
    F: FnMut(Acc, In) -> Acc + Send + Sync + 'static,
    In: AppData,
    Acc: AppData,
{
    #[inline]
    fn name(&self) -> &str {
        self.name.as_ref()
    }

    async fn check(&self) -> EnricherResult<()> {
        self.inlet.check_attachment().await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", name = "run fold sink", skip(self), fields(stage=%self.name))]
    async fn run(&mut self) -> EnricherResult<()> {
        while let Some(item) = self.inlet.recv().await {
            let _timer = stage::start_stage_eval_time(self.name.as_ref());
            if let Some(acc) = self.acc.take() {
                self.acc = Some((self.operation)(acc, item));
            }
        }

        tracing::trace!(stage=%self.name, "fold inlet depleted");
        self.complete_fold()?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> EnricherResult<()> {
        tracing::trace!(stage=%self.name, "closing fold inlet");
        self.inlet.close().await;
        self.complete_fold()?;
        Ok(())
    }
}

impl<F, In, Acc: Debug> Debug for Fold<F, In, Acc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fold")
            .field("name", &self.name)
            .field("acc", &self.acc)
            .field("inlet", &self.inlet)
            .finish()
    }
}
