//! Common test utilities: recording collaborators and sheet builders.
#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

use std::rc::Rc;

use sheettext::channel::{ContentSource, Presenter};
use sheettext::layout::{OffsetIndex, Viewport};
use sheettext::messages::{CellsRequest, CellsResponse, ClientMessage};
use sheettext::render::{MonospaceShaper, RenderDriver, Scheduled, TileGrid, TileWork};
use sheettext::{
    OffsetsData, RenderCell, RenderConfig, Result, SheetInfo, SheetTextError, TileKey,
};

pub const W: f64 = sheettext::config::DEFAULT_COLUMN_WIDTH;
pub const H: f64 = sheettext::config::DEFAULT_ROW_HEIGHT;

// ============================================================================
// Offsets
// ============================================================================

pub fn offsets(columns: &[(i64, f64)], rows: &[(i64, f64)]) -> OffsetIndex {
    let mut index = OffsetIndex::default();
    index
        .load(&OffsetsData {
            columns: columns.to_vec(),
            rows: rows.to_vec(),
        })
        .unwrap();
    index
}

// ============================================================================
// Grid helpers
// ============================================================================

pub fn grid_with(config: RenderConfig) -> TileGrid {
    TileGrid::new(
        &SheetInfo::new("sheet"),
        config,
        Rc::new(MonospaceShaper::default()),
    )
}

pub fn grid() -> TileGrid {
    grid_with(RenderConfig::default())
}

/// Run the grid until idle, answering every fetch from `cells`.
pub fn render_all(grid: &mut TileGrid, cells: &[RenderCell]) -> Vec<Scheduled> {
    let mut done = Vec::new();
    for _ in 0..10_000 {
        let step = grid.schedule_next();
        if step.is_idle() {
            return done;
        }
        if let Some(request) = fetch_request(&step) {
            grid.receive_cells(answer(request, 0, cells));
        }
        done.push(step);
    }
    panic!("grid never went idle");
}

pub fn answer(request: &CellsRequest, sequence: u64, cells: &[RenderCell]) -> CellsResponse {
    let cells = cells
        .iter()
        .filter(|c| request.rect.contains(c.x, c.y))
        .cloned()
        .collect();
    CellsResponse::reply(request, sequence, cells)
}

pub fn fetch_request(step: &Scheduled) -> Option<&CellsRequest> {
    match step {
        Scheduled::Tile {
            work: TileWork::Fetch(request),
            ..
        } => Some(request),
        _ => None,
    }
}

pub fn tile_key(step: &Scheduled) -> Option<TileKey> {
    match step {
        Scheduled::Tile { key, .. } => Some(*key),
        _ => None,
    }
}

// ============================================================================
// Recording collaborators
// ============================================================================

#[derive(Default)]
pub struct RecordingSource {
    pub requests: Vec<CellsRequest>,
}

impl ContentSource for RecordingSource {
    fn request_cells(&mut self, request: CellsRequest) -> Result<()> {
        self.requests.push(request);
        Ok(())
    }
}

/// Fails the first `failures` requests, then hands the rest to `inner`.
pub struct FlakySource<S> {
    pub inner: S,
    pub failures: usize,
    pub calls: usize,
}

impl<S> FlakySource<S> {
    pub fn new(inner: S, failures: usize) -> Self {
        Self {
            inner,
            failures,
            calls: 0,
        }
    }
}

impl<S: ContentSource> ContentSource for FlakySource<S> {
    fn request_cells(&mut self, request: CellsRequest) -> Result<()> {
        self.calls += 1;
        if self.calls <= self.failures {
            return Err(SheetTextError::ChannelClosed("cells request"));
        }
        self.inner.request_cells(request)
    }
}

pub struct RecordingPresenter {
    pub viewport: Viewport,
    pub messages: Vec<ClientMessage>,
    /// Reject every message, like a presentation task that has gone away.
    pub closed: bool,
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self {
            viewport: Viewport::new(800.0, 600.0),
            messages: Vec::new(),
            closed: false,
        }
    }
}

impl RecordingPresenter {
    pub fn first_paints(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, ClientMessage::FirstPaintComplete))
            .count()
    }

    pub fn uploads(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, ClientMessage::TileBuffers { .. }))
            .count()
    }
}

impl Presenter for RecordingPresenter {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn present(&mut self, message: ClientMessage) -> Result<()> {
        if self.closed {
            return Err(SheetTextError::ChannelClosed("client message"));
        }
        self.messages.push(message);
        Ok(())
    }
}

pub type TestDriver = RenderDriver<RecordingSource, RecordingPresenter>;

pub fn driver() -> TestDriver {
    RenderDriver::new(
        RenderConfig::default(),
        Rc::new(MonospaceShaper::default()),
        RecordingSource::default(),
        RecordingPresenter::default(),
    )
}

/// Answer every request the driver has made so far.
pub fn answer_all(driver: &mut TestDriver, cells: &[RenderCell]) {
    let requests = std::mem::take(&mut driver.source_mut().requests);
    for request in &requests {
        driver
            .handle_message(sheettext::messages::CoreMessage::Cells(answer(
                request, 0, cells,
            )))
            .unwrap();
    }
}
