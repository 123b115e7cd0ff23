use std::fmt;

use async_trait::async_trait;

use crate::graph::{Outlet, Port, SourceShape, Stage, PORT_DATA};
use crate::{AppData, EnricherResult, SharedString};

/// Source publishing a finite, already materialized collection in order, then completing.
///
/// # Examples
///
/// ```
/// use enricher::graph::stage::{self, Stage};
/// use enricher::graph::{Connect, SinkShape, SourceShape};
/// use enricher::Measurement;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let data = ["cpu", "mem", "disk"].into_iter().map(Measurement::new);
///     let mut src = stage::Sequence::new("measurements", data);
///     let mut names = stage::Fold::new("names", Vec::new(), |mut acc: Vec<String>, m: Measurement| {
///         acc.push(m.name);
///         acc
///     });
///     let rx_names = names.take_final_rx().expect("final receiver");
///
///     (src.outlet(), names.inlet()).connect().await;
///
///     let sink_handle = tokio::spawn(async move { names.run().await });
///     src.run().await?;
///     Box::new(src).close().await?;
///
///     sink_handle.await??;
///     assert_eq!(rx_names.await?, vec!["cpu", "mem", "disk"]);
///     Ok(())
/// }
/// ```
pub struct Sequence<T> {
    name: SharedString,
    data: Vec<T>,
    outlet: Outlet<T>,
}

impl<T> Sequence<T> {
    pub fn new<I>(name: impl Into<SharedString>, data: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let name = name.into();
        let outlet = Outlet::new(name.clone(), PORT_DATA);
        Self { name, data: data.into_iter().collect(), outlet }
    }
}

impl<T: AppData> SourceShape for Sequence<T> {
    type Out = T;

    #[inline]
    fn outlet(&self) -> Outlet<Self::Out> {
        self.outlet.clone()
    }
}

#[async_trait]
impl<T: AppData> Stage for Sequence<T> {
    #[inline]
    fn name(&self) -> &str {
        self.name.as_ref()
    }

    async fn check(&self) -> EnricherResult<()> {
        self.outlet.check_attachment().await?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", name = "run sequence source", skip(self), fields(stage=%self.name))]
    async fn run(&mut self) -> EnricherResult<()> {
        for item in self.data.drain(..) {
            tracing::trace!(?item, "publishing");
            self.outlet.send(item).await?;
        }
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> EnricherResult<()> {
        tracing::trace!(stage=%self.name, "closing sequence outlet");
        self.outlet.close().await;
        Ok(())
    }
}

impl<T> fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name)
            .field("nr_data_items", &self.data.len())
            .field("outlet", &self.outlet)
            .finish()
    }
}
