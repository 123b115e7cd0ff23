use std::fmt::Debug;

/// AppData is automatically implemented for types compatible with graph stage processing; i.e.,
/// anything that can be debugged and moved across tasks.
pub trait AppData: Debug + Send + Sync + 'static {}

impl<T: Debug + Send + Sync + 'static> AppData for T {}
