//! Seams between the render driver and the processes around it.
//!
//! The driver talks to the computation engine through [`ContentSource`] and to
//! the presentation layer through [`Presenter`]. The channel-backed
//! implementations here carry the typed messages over tokio channels; tests
//! and the CLI plug in their own.

use tokio::sync::{mpsc, watch};

use crate::error::{Result, SheetTextError};
use crate::layout::Viewport;
use crate::messages::{CellsRequest, ClientMessage};

/// Where cell content comes from. Requests are fire-and-forget; the answer
/// arrives later as a `CoreMessage::Cells`.
pub trait ContentSource {
    fn request_cells(&mut self, request: CellsRequest) -> Result<()>;
}

/// Where rendered buffers go.
pub trait Presenter {
    /// Current viewport of the active sheet. Read synchronously each tick.
    fn viewport(&self) -> Viewport;

    /// Change notifications for [`Presenter::viewport`], if the presenter has
    /// any. An idle driver wakes on them.
    fn viewport_updates(&self) -> Option<watch::Receiver<Viewport>> {
        None
    }

    fn present(&mut self, message: ClientMessage) -> Result<()>;
}

// ============================================================================
// Channel-backed implementations
// ============================================================================

/// Sends content requests to an engine task.
#[derive(Debug, Clone)]
pub struct ChannelContentSource {
    tx: mpsc::UnboundedSender<CellsRequest>,
}

impl ChannelContentSource {
    pub fn new(tx: mpsc::UnboundedSender<CellsRequest>) -> Self {
        Self { tx }
    }
}

impl ContentSource for ChannelContentSource {
    fn request_cells(&mut self, request: CellsRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| SheetTextError::ChannelClosed("cells request"))
    }
}

/// Sends buffers to a presentation task and reads the viewport it publishes.
#[derive(Debug)]
pub struct ChannelPresenter {
    tx: mpsc::UnboundedSender<ClientMessage>,
    viewport: watch::Receiver<Viewport>,
}

impl ChannelPresenter {
    pub fn new(tx: mpsc::UnboundedSender<ClientMessage>, viewport: watch::Receiver<Viewport>) -> Self {
        Self { tx, viewport }
    }
}

impl Presenter for ChannelPresenter {
    fn viewport(&self) -> Viewport {
        *self.viewport.borrow()
    }

    fn viewport_updates(&self) -> Option<watch::Receiver<Viewport>> {
        Some(self.viewport.clone())
    }

    fn present(&mut self, message: ClientMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| SheetTextError::ChannelClosed("client message"))
    }
}

/// Content source plus the receiving end the engine task reads from.
pub fn content_channel() -> (ChannelContentSource, mpsc::UnboundedReceiver<CellsRequest>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelContentSource::new(tx), rx)
}

/// Presenter plus the ends the presentation task uses: the message stream and
/// the viewport publisher.
pub fn presenter_channel(
    initial: Viewport,
) -> (
    ChannelPresenter,
    mpsc::UnboundedReceiver<ClientMessage>,
    watch::Sender<Viewport>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (viewport_tx, viewport_rx) = watch::channel(initial);
    (ChannelPresenter::new(tx, viewport_rx), rx, viewport_tx)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::types::{CellRect, SheetId, TileKey};

    #[test]
    fn test_requests_reach_receiver() {
        let (mut source, mut rx) = content_channel();
        let request = CellsRequest {
            request_id: 1,
            sheet_id: SheetId::new("s"),
            key: TileKey::new(0, 0),
            rect: CellRect::new(0, 0, 15, 30),
        };
        source.request_cells(request.clone()).unwrap();
        assert_eq!(rx.try_recv().unwrap(), request);
    }

    #[test]
    fn test_closed_channel_errors() {
        let (mut source, rx) = content_channel();
        drop(rx);
        let err = source
            .request_cells(CellsRequest {
                request_id: 1,
                sheet_id: SheetId::new("s"),
                key: TileKey::new(0, 0),
                rect: CellRect::new(0, 0, 15, 30),
            })
            .unwrap_err();
        assert!(matches!(err, SheetTextError::ChannelClosed(_)));
    }

    #[test]
    fn test_viewport_follows_publisher() {
        let (presenter, _rx, viewport_tx) = presenter_channel(Viewport::default());
        let mut moved = Viewport::default();
        moved.set_scroll(500.0, -20.0);
        viewport_tx.send(moved).unwrap();
        assert_eq!(presenter.viewport(), moved);
    }

    #[tokio::test]
    async fn test_viewport_updates_notify_changes() {
        let (presenter, _rx, viewport_tx) = presenter_channel(Viewport::default());
        let mut updates = presenter.viewport_updates().unwrap();
        let mut moved = Viewport::default();
        moved.set_scroll(0.0, 300.0);
        viewport_tx.send(moved).unwrap();
        updates.changed().await.unwrap();
        assert_eq!(*updates.borrow(), moved);

        drop(viewport_tx);
        assert!(updates.changed().await.is_err());
    }
}
