use super::{Inlet, Outlet};
use crate::AppData;

pub trait SourceShape {
    type Out: AppData;
    fn outlet(&self) -> Outlet<Self::Out>;
}

pub trait SinkShape {
    type In: AppData;
    fn inlet(&self) -> Inlet<Self::In>;
}

pub trait ThroughShape: SourceShape + SinkShape {}

impl<T: SourceShape + SinkShape> ThroughShape for T {}
