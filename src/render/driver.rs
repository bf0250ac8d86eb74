//! Cross-sheet render loop.
//!
//! One [`TileGrid`] per sheet. Each tick advances exactly one sheet by one unit
//! of work: the active sheet first, then the other sheets in round-robin
//! order.

use std::collections::BTreeMap;
use std::rc::Rc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use super::grid::{Scheduled, TileGrid, TileWork};
use super::shaper::GlyphShaper;
use crate::channel::{ContentSource, Presenter};
use crate::config::RenderConfig;
use crate::error::{Result, SheetTextError};
use crate::layout::Viewport;
use crate::messages::{ClientMessage, CoreMessage};
use crate::types::{SheetId, SheetInfo, TileKey};

/// Kind of work a tick performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Headings,
    Fetch(TileKey),
    /// The content request could not be sent; the tile will be retried
    FetchFailed(TileKey),
    Render(TileKey),
    Row(i64),
    /// Tile selected but nothing to do (already in flight)
    Skipped(TileKey),
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub sheet_id: SheetId,
    pub kind: WorkKind,
    pub visible: bool,
}

pub struct RenderDriver<S: ContentSource, P: Presenter> {
    config: RenderConfig,
    shaper: Rc<dyn GlyphShaper>,
    source: S,
    presenter: P,
    sheets: BTreeMap<SheetId, TileGrid>,
    active: Option<SheetId>,
    /// Last background sheet that did work, for round-robin order
    last_background: Option<SheetId>,
    first_paint_done: bool,
}

impl<S: ContentSource, P: Presenter> RenderDriver<S, P> {
    pub fn new(config: RenderConfig, shaper: Rc<dyn GlyphShaper>, source: S, presenter: P) -> Self {
        Self {
            config,
            shaper,
            source,
            presenter,
            sheets: BTreeMap::new(),
            active: None,
            last_background: None,
            first_paint_done: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn active_sheet(&self) -> Option<&SheetId> {
        self.active.as_ref()
    }

    pub fn first_paint_done(&self) -> bool {
        self.first_paint_done
    }

    pub fn sheet_ids(&self) -> impl Iterator<Item = &SheetId> {
        self.sheets.keys()
    }

    pub fn grid(&self, sheet_id: &SheetId) -> Result<&TileGrid> {
        self.sheets
            .get(sheet_id)
            .ok_or_else(|| SheetTextError::UnknownSheet(sheet_id.clone()))
    }

    pub fn grid_mut(&mut self, sheet_id: &SheetId) -> Result<&mut TileGrid> {
        self.sheets
            .get_mut(sheet_id)
            .ok_or_else(|| SheetTextError::UnknownSheet(sheet_id.clone()))
    }

    /// Create the grid for a sheet. An existing sheet with the same id is
    /// replaced.
    pub fn add_sheet(&mut self, info: &SheetInfo) {
        debug!(sheet = %info.sheet_id, "Adding sheet");
        let grid = TileGrid::new(info, self.config.clone(), Rc::clone(&self.shaper));
        self.sheets.insert(info.sheet_id.clone(), grid);
    }

    /// Drop a sheet's grid. Removing the active sheet leaves no sheet active.
    pub fn remove_sheet(&mut self, sheet_id: &SheetId) -> Result<()> {
        if self.sheets.remove(sheet_id).is_none() {
            return Err(SheetTextError::UnknownSheet(sheet_id.clone()));
        }
        debug!(sheet = %sheet_id, "Removed sheet");
        if self.active.as_ref() == Some(sheet_id) {
            self.active = None;
        }
        if self.last_background.as_ref() == Some(sheet_id) {
            self.last_background = None;
        }
        Ok(())
    }

    pub fn set_active_sheet(&mut self, sheet_id: Option<SheetId>) -> Result<()> {
        if let Some(id) = &sheet_id {
            if !self.sheets.contains_key(id) {
                return Err(SheetTextError::UnknownSheet(id.clone()));
            }
        }
        self.active = sheet_id;
        Ok(())
    }

    /// Translate an inbound event into grid state.
    pub fn handle_message(&mut self, message: CoreMessage) -> Result<()> {
        match message {
            CoreMessage::Cells(response) => {
                let sheet_id = response.sheet_id.clone();
                self.grid_mut(&sheet_id)?.receive_cells(response);
            }
            CoreMessage::CellsChanged {
                sheet_id,
                rect,
                sequence,
            } => self.grid_mut(&sheet_id)?.cells_changed(rect, sequence),
            CoreMessage::ColumnResized {
                sheet_id,
                column,
                width,
            } => self.grid_mut(&sheet_id)?.resize_column(column, width)?,
            CoreMessage::RowResized {
                sheet_id,
                row,
                height,
            } => self.grid_mut(&sheet_id)?.resize_row(row, height)?,
            CoreMessage::RowsDirty { sheet_id, rows } => {
                let grid = self.grid_mut(&sheet_id)?;
                for row in rows {
                    grid.mark_row_dirty(row);
                }
            }
            CoreMessage::SheetBounds { sheet_id, bounds } => {
                self.grid_mut(&sheet_id)?.set_bounds(bounds);
            }
            CoreMessage::SheetAdded(info) => self.add_sheet(&info),
            CoreMessage::SheetRemoved { sheet_id } => self.remove_sheet(&sheet_id)?,
            CoreMessage::ActiveSheet { sheet_id } => self.set_active_sheet(sheet_id)?,
        }
        Ok(())
    }

    /// Active sheet first, then the rest starting after the last background
    /// sheet that did work.
    fn sheet_order(&self) -> Vec<SheetId> {
        let others: Vec<&SheetId> = self
            .sheets
            .keys()
            .filter(|id| Some(*id) != self.active.as_ref())
            .collect();
        let split = self
            .last_background
            .as_ref()
            .map_or(0, |last| others.partition_point(|id| *id <= last));
        let (before, after) = others.split_at(split);
        self.active
            .iter()
            .filter(|id| self.sheets.contains_key(*id))
            .chain(after.iter().copied())
            .chain(before.iter().copied())
            .cloned()
            .collect()
    }

    /// Only the active sheet is on screen; every other grid loses its viewport.
    fn sync_viewports(&mut self) {
        let bounds = self.presenter.viewport().bounds();
        for (sheet_id, grid) in &mut self.sheets {
            if self.active.as_ref() == Some(sheet_id) {
                grid.set_viewport(bounds);
            } else {
                grid.clear_viewport();
            }
        }
    }

    /// Do one unit of work on one sheet. `None` when every sheet is idle.
    /// Failures talking to the engine or the presentation layer are logged;
    /// the affected work is retried or dropped, never fatal.
    pub fn tick(&mut self) -> Option<TickReport> {
        self.sync_viewports();

        let mut report = None;
        for sheet_id in self.sheet_order() {
            let Some(grid) = self.sheets.get_mut(&sheet_id) else {
                continue;
            };
            let work = grid.schedule_next();
            let visible = work.is_visible();
            let Some(kind) = self.dispatch(&sheet_id, work) else {
                continue;
            };
            trace!(sheet = %sheet_id, ?kind, visible, "Tick");
            if self.active.as_ref() != Some(&sheet_id) {
                self.last_background = Some(sheet_id.clone());
            }
            report = Some(TickReport {
                sheet_id,
                kind,
                visible,
            });
            break;
        }

        if let Err(e) = self.notify_first_paint() {
            warn!("First paint signal not delivered: {}", e);
        }
        report
    }

    fn present_logged(&mut self, message: ClientMessage) {
        if let Err(e) = self.presenter.present(message) {
            warn!("Presenter rejected message: {}", e);
        }
    }

    /// Forward the products of `work`. `None` for idle.
    fn dispatch(&mut self, sheet_id: &SheetId, work: Scheduled) -> Option<WorkKind> {
        let kind = match work {
            Scheduled::Headings { .. } => WorkKind::Headings,
            Scheduled::Tile {
                key,
                work,
                evicted,
                ..
            } => {
                if let Some(evicted) = evicted {
                    self.present_logged(ClientMessage::TileUnloaded {
                        sheet_id: sheet_id.clone(),
                        key: evicted,
                    });
                }
                match work {
                    TileWork::Fetch(request) => match self.source.request_cells(request) {
                        Ok(()) => WorkKind::Fetch(key),
                        Err(e) => {
                            warn!(sheet = %sheet_id, "Requesting tile {} failed: {}", key, e);
                            if let Some(grid) = self.sheets.get_mut(sheet_id) {
                                grid.fetch_failed(key);
                            }
                            WorkKind::FetchFailed(key)
                        }
                    },
                    TileWork::Rendered(buffers) => {
                        self.present_logged(ClientMessage::TileBuffers {
                            sheet_id: sheet_id.clone(),
                            buffers,
                        });
                        WorkKind::Render(key)
                    }
                    TileWork::Skipped => WorkKind::Skipped(key),
                }
            }
            Scheduled::Row { row, uploads } => {
                for buffers in uploads {
                    self.present_logged(ClientMessage::TileBuffers {
                        sheet_id: sheet_id.clone(),
                        buffers,
                    });
                }
                WorkKind::Row(row)
            }
            Scheduled::Idle => return None,
        };
        Some(kind)
    }

    /// Signal first paint once the active sheet has nothing visible left to
    /// render. Fires at most once per driver. Returns whether it fired now.
    pub fn notify_first_paint(&mut self) -> Result<bool> {
        if self.first_paint_done {
            return Ok(false);
        }
        let Some(grid) = self.active.as_ref().and_then(|id| self.sheets.get(id)) else {
            return Ok(false);
        };
        // a sheet with no tiles yet has nothing visible to wait for
        if grid.has_visible_work() {
            return Ok(false);
        }
        let sheet_id = grid.sheet_id().clone();
        self.presenter.present(ClientMessage::FirstPaintComplete)?;
        info!(sheet = %sheet_id, "First paint complete");
        self.first_paint_done = true;
        Ok(true)
    }

    /// Drain pending messages without blocking. Returns `false` once the
    /// inbox is closed.
    fn drain(&mut self, inbox: &mut mpsc::UnboundedReceiver<CoreMessage>) -> bool {
        loop {
            match inbox.try_recv() {
                Ok(message) => self.handle_logged(message),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_logged(&mut self, message: CoreMessage) {
        if let Err(e) = self.handle_message(message) {
            warn!("Dropping message: {}", e);
        }
    }

    /// Cooperative loop: apply inbound messages, tick, yield to the runtime.
    /// When every sheet is idle the loop sleeps until the next message or a
    /// viewport change, since scrolling can expose deferred or evicted tiles.
    /// Returns when the inbox closes.
    pub async fn run(&mut self, mut inbox: mpsc::UnboundedReceiver<CoreMessage>) -> Result<()> {
        let mut viewport = self.presenter.viewport_updates();
        loop {
            if !self.drain(&mut inbox) {
                return Ok(());
            }
            if self.tick().is_some() {
                tokio::task::yield_now().await;
                continue;
            }
            let publishing = tokio::select! {
                message = inbox.recv() => match message {
                    Some(message) => {
                        self.handle_logged(message);
                        true
                    }
                    None => return Ok(()),
                },
                open = viewport_changed(viewport.as_mut()) => open,
            };
            if !publishing {
                debug!("Viewport publisher closed");
                viewport = None;
            }
        }
    }
}

/// Resolves when the viewport moves: `true`, or `false` once the publisher is
/// gone. Never resolves without a receiver.
async fn viewport_changed(viewport: Option<&mut watch::Receiver<Viewport>>) -> bool {
    match viewport {
        Some(rx) => rx.changed().await.is_ok(),
        None => std::future::pending().await,
    }
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
    use crate::layout::Viewport;
    use crate::messages::CellsRequest;
    use crate::render::shaper::MonospaceShaper;

    #[derive(Default)]
    struct Requests(Vec<CellsRequest>);

    impl ContentSource for Requests {
        fn request_cells(&mut self, request: CellsRequest) -> Result<()> {
            self.0.push(request);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Screen(Vec<ClientMessage>);

    impl Presenter for Screen {
        fn viewport(&self) -> Viewport {
            Viewport::default()
        }

        fn present(&mut self, message: ClientMessage) -> Result<()> {
            self.0.push(message);
            Ok(())
        }
    }

    fn driver() -> RenderDriver<Requests, Screen> {
        RenderDriver::new(
            RenderConfig::default(),
            Rc::new(MonospaceShaper::default()),
            Requests::default(),
            Screen::default(),
        )
    }

    #[test]
    fn test_unknown_sheet_is_error() {
        let mut d = driver();
        let err = d
            .handle_message(CoreMessage::RowsDirty {
                sheet_id: SheetId::new("nope"),
                rows: vec![1],
            })
            .unwrap_err();
        assert!(matches!(err, SheetTextError::UnknownSheet(_)));
        assert!(d.set_active_sheet(Some(SheetId::new("nope"))).is_err());
    }

    #[test]
    fn test_removing_active_sheet_clears_it() {
        let mut d = driver();
        d.add_sheet(&SheetInfo::new("a"));
        d.set_active_sheet(Some(SheetId::new("a"))).unwrap();
        d.remove_sheet(&SheetId::new("a")).unwrap();
        assert_eq!(d.active_sheet(), None);
        assert!(d.remove_sheet(&SheetId::new("a")).is_err());
    }

    #[test]
    fn test_sheet_order_rotates_background() {
        let mut d = driver();
        for id in ["a", "b", "c"] {
            d.add_sheet(&SheetInfo::new(id));
        }
        d.set_active_sheet(Some(SheetId::new("b"))).unwrap();
        let names = |d: &RenderDriver<Requests, Screen>| -> Vec<String> {
            d.sheet_order().into_iter().map(|s| s.0).collect()
        };
        assert_eq!(names(&d), ["b", "a", "c"]);
        d.last_background = Some(SheetId::new("a"));
        assert_eq!(names(&d), ["b", "c", "a"]);
    }

    #[test]
    fn test_idle_driver_reports_nothing() {
        let mut d = driver();
        assert_eq!(d.tick(), None);
        assert!(!d.first_paint_done());
    }
    #[test]
    fn test_empty_active_sheet_paints_immediately() {
        let mut d = driver();
        d.add_sheet(&SheetInfo::new("a"));
        d.set_active_sheet(Some(SheetId::new("a"))).unwrap();
        assert_eq!(d.tick(), None);
        assert!(d.first_paint_done());
        assert_eq!(d.presenter().0, vec![ClientMessage::FirstPaintComplete]);
    }
}
