use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts};
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::PortError;
use crate::{AppData, SharedString};

pub static STAGE_INGRESS_COUNTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "enricher_stage_ingress_counts",
            "Number of items entering a stage via an Inlet",
        ),
        &["stage", "port"],
    )
    .expect("failed creating enricher_stage_ingress_counts metric")
});

pub static STAGE_EGRESS_COUNTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "enricher_stage_egress_counts",
            "Number of items exiting a stage via an Outlet",
        ),
        &["stage", "port"],
    )
    .expect("failed creating enricher_stage_egress_counts metric")
});

#[inline]
fn track_ingress(stage: &str, port_name: &str) {
    STAGE_INGRESS_COUNTS.with_label_values(&[stage, port_name]).inc()
}

#[inline]
fn track_egress(stage: &str, port_name: &str) {
    STAGE_EGRESS_COUNTS.with_label_values(&[stage, port_name]).inc()
}

pub const PORT_DATA: &str = "data";

#[async_trait]
pub trait Port {
    fn stage(&self) -> &str;
    fn name(&self) -> &str;
    fn full_name(&self) -> String {
        format!("{}::{}", self.stage(), self.name())
    }

    /// Closes this half of the port's channel without dropping it. Items already buffered in the
    /// channel remain available to the receiving side until `recv()` returns `None`.
    async fn close(&mut self);
}

#[async_trait]
pub trait Connect<T> {
    async fn connect(self);
}

#[async_trait]
impl<T: AppData> Connect<T> for (Outlet<T>, Inlet<T>) {
    async fn connect(self) {
        connect_out_to_in(self.0, self.1).await
    }
}

#[async_trait]
impl<T: AppData> Connect<T> for (&Outlet<T>, &Inlet<T>) {
    async fn connect(self) {
        connect_out_to_in(self.0.clone(), self.1.clone()).await
    }
}

pub async fn connect_out_to_in<T: AppData>(mut lhs: Outlet<T>, mut rhs: Inlet<T>) {
    let (tx, rx) = mpsc::channel(num_cpus::get());
    lhs.attach(rhs.full_name().into(), tx).await;
    rhs.attach(lhs.full_name().into(), rx).await;
}

type InletConnection<T> = Arc<Mutex<Option<(mpsc::Receiver<T>, SharedString)>>>;

/// Receiving port of a stage. Clones share the same underlying connection.
pub struct Inlet<T> {
    stage: SharedString,
    name: SharedString,
    connection: InletConnection<T>,
}

impl<T> Inlet<T> {
    pub fn new(stage: impl Into<SharedString>, port_name: impl Into<SharedString>) -> Self {
        Self {
            stage: stage.into(),
            name: port_name.into(),
            connection: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> Clone for Inlet<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            name: self.name.clone(),
            connection: Arc::clone(&self.connection),
        }
    }
}

#[async_trait]
impl<T: Send> Port for Inlet<T> {
    fn stage(&self) -> &str {
        self.stage.as_ref()
    }

    fn name(&self) -> &str {
        self.name.as_ref()
    }

    async fn close(&mut self) {
        match self.connection.lock().await.as_mut() {
            Some((rx, _)) => {
                tracing::trace!(stage=%self.stage, inlet=%self.name, "closing Inlet");
                rx.close()
            },
            None => tracing::trace!(stage=%self.stage, inlet=%self.name, "Inlet close ignored - not attached"),
        }
    }
}

impl<T: AppData> Inlet<T> {
    pub async fn attach(&mut self, sender_name: SharedString, rx: mpsc::Receiver<T>) {
        *self.connection.lock().await = Some((rx, sender_name));
    }

    pub async fn is_attached(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    pub async fn check_attachment(&self) -> Result<(), PortError> {
        match self.connection.lock().await.as_ref() {
            Some((_, sender)) => {
                tracing::trace!("inlet connected: {} -> {}", sender, self.full_name());
                Ok(())
            },
            None => Err(PortError::Detached(format!(
                "{}[{}]",
                self.full_name(),
                std::any::type_name::<Self>()
            ))),
        }
    }

    /// Receives the next value for this port.
    ///
    /// `None` is returned when all senders have dropped or the inlet was never attached,
    /// indicating that no further values will arrive.
    ///
    /// # Examples
    ///
    /// ```
    /// use enricher::graph::Inlet;
    /// use tokio::sync::mpsc;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let (tx, rx) = mpsc::channel(8);
    ///     let mut port = Inlet::new("port", "data");
    ///     port.attach("test_channel".into(), rx).await;
    ///
    ///     tx.send("hello").await.unwrap();
    ///     drop(tx);
    ///
    ///     assert_eq!(Some("hello"), port.recv().await);
    ///     assert_eq!(None, port.recv().await);
    /// }
    /// ```
    pub async fn recv(&mut self) -> Option<T> {
        let mut connection = self.connection.lock().await;
        let (rx, _) = connection.as_mut()?;
        let item = rx.recv().await;
        if item.is_some() {
            track_ingress(self.stage.as_ref(), self.name.as_ref());
        } else {
            tracing::debug!(stage=%self.stage, inlet=%self.name, "Inlet depleted - closing receiver");
            let _ = connection.take();
        }
        item
    }
}

impl<T> fmt::Debug for Inlet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Inlet")
            .field(&format!("{}::{}", self.stage, self.name))
            .finish()
    }
}

type OutletConnection<T> = Arc<Mutex<Option<(mpsc::Sender<T>, SharedString)>>>;

/// Sending port of a stage. Clones share the same underlying connection.
pub struct Outlet<T> {
    stage: SharedString,
    name: SharedString,
    connection: OutletConnection<T>,
}

impl<T> Outlet<T> {
    pub fn new(stage: impl Into<SharedString>, port_name: impl Into<SharedString>) -> Self {
        Self {
            stage: stage.into(),
            name: port_name.into(),
            connection: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> Clone for Outlet<T> {
    fn clone(&self) -> Self {
        Self {
            stage: self.stage.clone(),
            name: self.name.clone(),
            connection: Arc::clone(&self.connection),
        }
    }
}

#[async_trait]
impl<T: Send> Port for Outlet<T> {
    fn stage(&self) -> &str {
        self.stage.as_ref()
    }

    fn name(&self) -> &str {
        self.name.as_ref()
    }

    async fn close(&mut self) {
        tracing::trace!(stage=%self.stage, outlet=%self.name, "closing Outlet");
        self.connection.lock().await.take();
    }
}

impl<T: AppData> Outlet<T> {
    pub async fn attach(&mut self, receiver_name: SharedString, tx: mpsc::Sender<T>) {
        *self.connection.lock().await = Some((tx, receiver_name));
    }

    pub async fn is_attached(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    pub async fn check_attachment(&self) -> Result<(), PortError> {
        match self.connection.lock().await.as_ref() {
            Some((_, receiver)) => {
                tracing::trace!("outlet connected: {} -> {}", self.full_name(), receiver);
                Ok(())
            },
            None => Err(PortError::Detached(format!(
                "{}[{}]",
                self.full_name(),
                std::any::type_name::<Self>()
            ))),
        }
    }

    /// Sends a value, waiting until there is capacity downstream.
    ///
    /// An `Err` means the value will never be received: the outlet is detached or the
    /// receiving half has hung up. An `Ok` does not guarantee the value will be read.
    pub async fn send(&self, value: T) -> Result<(), PortError> {
        // clone the sender so concurrent senders on cloned outlets do not serialize on the lock
        let tx = match self.connection.lock().await.as_ref() {
            Some((tx, _)) => tx.clone(),
            None => return Err(PortError::Detached(self.full_name())),
        };

        tx.send(value)
            .await
            .map_err(|_| PortError::closed_channel::<T>(self.full_name()))?;
        track_egress(self.stage.as_ref(), self.name.as_ref());
        Ok(())
    }
}

impl<T> fmt::Debug for Outlet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Outlet")
            .field(&format!("{}::{}", self.stage, self.name))
            .finish()
    }
}
