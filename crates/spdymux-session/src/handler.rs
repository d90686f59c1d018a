use std::sync::Arc;

use crate::error::Result;
use crate::stream::Stream;

/// Serves streams opened by the peer.
///
/// Each accepted stream is handed to [`serve`](Self::serve) on its own
/// thread. When `serve` returns `Ok` the stream's writer is closed if the
/// handler left it open. An `Err` (or a panic) resets the stream with
/// `INTERNAL_ERROR`.
pub trait StreamHandler: Send + Sync + 'static {
    fn serve(&self, stream: Arc<Stream>) -> Result<()>;
}

impl<F> StreamHandler for F
where
    F: Fn(Arc<Stream>) -> Result<()> + Send + Sync + 'static,
{
    fn serve(&self, stream: Arc<Stream>) -> Result<()> {
        self(stream)
    }
}
