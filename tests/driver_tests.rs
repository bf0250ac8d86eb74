//! Render driver tests
//!
//! Sheet ordering, first paint, message handling and the async loop.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod common;

use std::rc::Rc;
use std::time::Duration;

use common::{
    answer, answer_all, driver, FlakySource, RecordingPresenter, RecordingSource, TestDriver,
};
use sheettext::channel::{content_channel, presenter_channel};
use sheettext::layout::Viewport;
use sheettext::messages::{CellsResponse, ClientMessage, CoreMessage};
use sheettext::render::{MonospaceShaper, RenderDriver, WorkKind};
use sheettext::{CellRect, RenderCell, RenderConfig, SheetId, SheetInfo, TileKey};
use tokio::time::timeout;

fn sheet(id: &str, bounds: CellRect) -> SheetInfo {
    SheetInfo {
        bounds: Some(bounds),
        ..SheetInfo::new(id)
    }
}

fn ticked_sheet(d: &mut TestDriver) -> Option<String> {
    d.tick().map(|r| r.sheet_id.0)
}

// ============================================================================
// Sheet ordering
// ============================================================================

#[test]
fn test_active_sheet_served_first() {
    let mut d = driver();
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.add_sheet(&sheet("b", CellRect::new(0, 0, 30, 30)));
    d.set_active_sheet(Some(SheetId::new("b"))).unwrap();

    // b's tiles are all requested before a gets a turn
    assert_eq!(ticked_sheet(&mut d).as_deref(), Some("b"));
    assert_eq!(ticked_sheet(&mut d).as_deref(), Some("b"));
    assert_eq!(ticked_sheet(&mut d).as_deref(), Some("a"));
    assert_eq!(d.tick(), None);

    answer_all(&mut d, &[]);
    let report = d.tick().unwrap();
    assert_eq!(report.sheet_id, SheetId::new("b"));
    assert_eq!(report.kind, WorkKind::Render(TileKey::new(0, 0)));
    assert!(report.visible);
}

#[test]
fn test_background_sheets_round_robin() {
    let mut d = driver();
    for id in ["a", "b", "c"] {
        d.add_sheet(&sheet(id, CellRect::new(0, 0, 30, 30)));
    }
    let order: Vec<String> = (0..6).filter_map(|_| ticked_sheet(&mut d)).collect();
    assert_eq!(order, ["a", "b", "c", "a", "b", "c"]);
    assert_eq!(d.tick(), None);
}

#[test]
fn test_removing_sheet_keeps_rotation() {
    let mut d = driver();
    for id in ["a", "b", "c"] {
        d.add_sheet(&sheet(id, CellRect::new(0, 0, 30, 30)));
    }
    assert_eq!(ticked_sheet(&mut d).as_deref(), Some("a"));
    d.handle_message(CoreMessage::SheetRemoved {
        sheet_id: SheetId::new("a"),
    })
    .unwrap();
    assert_eq!(ticked_sheet(&mut d).as_deref(), Some("b"));
    assert_eq!(ticked_sheet(&mut d).as_deref(), Some("c"));
    assert_eq!(ticked_sheet(&mut d).as_deref(), Some("b"));
}

#[test]
fn test_removing_active_sheet_clears_it() {
    let mut d = driver();
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.handle_message(CoreMessage::ActiveSheet {
        sheet_id: Some(SheetId::new("a")),
    })
    .unwrap();
    d.handle_message(CoreMessage::SheetRemoved {
        sheet_id: SheetId::new("a"),
    })
    .unwrap();
    assert_eq!(d.active_sheet(), None);
    assert_eq!(d.tick(), None);
}

#[test]
fn test_inactive_sheet_has_no_viewport() {
    let mut d = driver();
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.add_sheet(&sheet("b", CellRect::new(0, 0, 15, 30)));
    d.set_active_sheet(Some(SheetId::new("a"))).unwrap();
    d.tick();
    assert!(d.grid(&SheetId::new("a")).unwrap().viewport().is_some());
    assert!(d.grid(&SheetId::new("b")).unwrap().viewport().is_none());

    // switching away drops the old sheet's view of the screen
    d.set_active_sheet(Some(SheetId::new("b"))).unwrap();
    d.tick();
    assert!(d.grid(&SheetId::new("a")).unwrap().viewport().is_none());
    assert!(d.grid(&SheetId::new("b")).unwrap().viewport().is_some());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_failed_fetch_is_retried() {
    let mut d = RenderDriver::new(
        RenderConfig::default(),
        Rc::new(MonospaceShaper::default()),
        FlakySource::new(RecordingSource::default(), 1),
        RecordingPresenter::default(),
    );
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.set_active_sheet(Some(SheetId::new("a"))).unwrap();

    let report = d.tick().unwrap();
    assert_eq!(report.kind, WorkKind::FetchFailed(TileKey::new(0, 0)));
    assert!(d.source().inner.requests.is_empty());

    let report = d.tick().unwrap();
    assert_eq!(report.kind, WorkKind::Fetch(TileKey::new(0, 0)));
    assert_eq!(d.source().inner.requests.len(), 1);
    assert_eq!(d.tick(), None);

    let request = d.source_mut().inner.requests.pop().unwrap();
    d.handle_message(CoreMessage::Cells(answer(&request, 0, &[])))
        .unwrap();
    assert_eq!(
        d.tick().unwrap().kind,
        WorkKind::Render(TileKey::new(0, 0))
    );
    assert!(d.first_paint_done());
}

#[test]
fn test_rejected_uploads_do_not_stop_rendering() {
    let mut d = driver();
    d.presenter_mut().closed = true;
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.set_active_sheet(Some(SheetId::new("a"))).unwrap();
    assert_eq!(d.tick().unwrap().kind, WorkKind::Fetch(TileKey::new(0, 0)));
    answer_all(&mut d, &[RenderCell::text(0, 0, "lost")]);
    assert_eq!(
        d.tick().unwrap().kind,
        WorkKind::Render(TileKey::new(0, 0))
    );
    // the signal was not delivered, so it is still owed
    assert!(!d.first_paint_done());
    assert_eq!(d.tick(), None);

    d.presenter_mut().closed = false;
    assert_eq!(d.tick(), None);
    assert!(d.first_paint_done());
    assert_eq!(d.presenter().first_paints(), 1);
    assert_eq!(d.presenter().uploads(), 0);
}

// ============================================================================
// First paint
// ============================================================================

#[test]
fn test_first_paint_fires_once() {
    let mut d = driver();
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.set_active_sheet(Some(SheetId::new("a"))).unwrap();

    let cells = [RenderCell::text(0, 0, "hello")];
    d.tick();
    assert_eq!(d.presenter().first_paints(), 0);
    answer_all(&mut d, &cells);
    d.tick();
    assert!(d.first_paint_done());
    assert_eq!(d.presenter().first_paints(), 1);
    assert_eq!(d.presenter().uploads(), 1);

    // an edit makes the same tile visible work again
    d.handle_message(CoreMessage::CellsChanged {
        sheet_id: SheetId::new("a"),
        rect: CellRect::new(0, 0, 1, 1),
        sequence: 1,
    })
    .unwrap();
    d.tick();
    let request = d.source_mut().requests.pop().unwrap();
    d.handle_message(CoreMessage::Cells(answer(&request, 1, &cells)))
        .unwrap();
    while d.tick().is_some() {}
    assert_eq!(d.presenter().first_paints(), 1);
    assert_eq!(d.presenter().uploads(), 2);
}

#[test]
fn test_first_paint_waits_for_active_sheet() {
    let mut d = driver();
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    while d.tick().is_some() {}
    answer_all(&mut d, &[]);
    while d.tick().is_some() {}
    assert_eq!(d.presenter().first_paints(), 0);

    d.set_active_sheet(Some(SheetId::new("a"))).unwrap();
    assert!(d.notify_first_paint().unwrap());
    assert!(!d.notify_first_paint().unwrap());
    assert_eq!(d.presenter().first_paints(), 1);
}

// ============================================================================
// Messages
// ============================================================================

#[test]
fn test_unknown_sheet_rejected() {
    let mut d = driver();
    let response = CellsResponse {
        request_id: None,
        sheet_id: SheetId::new("ghost"),
        key: TileKey::new(0, 0),
        sequence: 0,
        result: Ok(Vec::new()),
    };
    assert!(d.handle_message(CoreMessage::Cells(response)).is_err());
    assert!(d
        .handle_message(CoreMessage::ColumnResized {
            sheet_id: SheetId::new("ghost"),
            column: 0,
            width: 10.0,
        })
        .is_err());
}

#[test]
fn test_column_resize_reuploads_without_fetch() {
    let mut d = driver();
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.set_active_sheet(Some(SheetId::new("a"))).unwrap();
    d.tick();
    answer_all(&mut d, &[RenderCell::text(4, 4, "moved")]);
    while d.tick().is_some() {}

    d.handle_message(CoreMessage::ColumnResized {
        sheet_id: SheetId::new("a"),
        column: 0,
        width: 140.0,
    })
    .unwrap();
    assert_eq!(d.tick().unwrap().kind, WorkKind::Headings);
    assert_eq!(
        d.tick().unwrap().kind,
        WorkKind::Render(TileKey::new(0, 0))
    );
    assert!(d.source().requests.is_empty());

    let Some(ClientMessage::TileBuffers { buffers, .. }) = d.presenter().messages.last() else {
        panic!("expected buffers");
    };
    assert_eq!(buffers.runs[0].quads[0].x, 442.0);
}

#[test]
fn test_dirty_rows_message() {
    let mut d = driver();
    d.add_sheet(&sheet("a", CellRect::new(0, 0, 15, 30)));
    d.set_active_sheet(Some(SheetId::new("a"))).unwrap();
    d.tick();
    answer_all(&mut d, &[RenderCell::text(2, 3, "row")]);
    while d.tick().is_some() {}

    d.handle_message(CoreMessage::RowsDirty {
        sheet_id: SheetId::new("a"),
        rows: vec![3],
    })
    .unwrap();
    assert_eq!(d.tick().unwrap().kind, WorkKind::Row(3));
    assert_eq!(d.tick(), None);
}

// ============================================================================
// Async loop
// ============================================================================

#[tokio::test]
async fn test_run_loop_renders_until_inbox_closes() {
    let (source, mut requests) = content_channel();
    let (presenter, mut client, _viewport) = presenter_channel(Viewport::new(800.0, 600.0));
    let mut d = RenderDriver::new(
        RenderConfig::default(),
        Rc::new(MonospaceShaper::default()),
        source,
        presenter,
    );
    let (tx, inbox) = tokio::sync::mpsc::unbounded_channel();

    let engine = async move {
        tx.send(CoreMessage::RowsDirty {
            sheet_id: SheetId::new("ghost"),
            rows: vec![0],
        })
        .unwrap();
        tx.send(CoreMessage::SheetAdded(sheet("a", CellRect::new(0, 0, 15, 30))))
            .unwrap();
        tx.send(CoreMessage::ActiveSheet {
            sheet_id: Some(SheetId::new("a")),
        })
        .unwrap();

        let request = requests.recv().await.unwrap();
        assert_eq!(request.key, TileKey::new(0, 0));
        tx.send(CoreMessage::Cells(answer(
            &request,
            0,
            &[RenderCell::text(1, 1, "hi")],
        )))
        .unwrap();

        let mut seen = Vec::new();
        while let Some(message) = client.recv().await {
            let done = message == ClientMessage::FirstPaintComplete;
            seen.push(message);
            if done {
                break;
            }
        }
        drop(tx);
        (seen, requests, client)
    };

    let (result, (seen, _requests, _client)) = tokio::join!(d.run(inbox), engine);
    result.unwrap();
    assert_eq!(seen.len(), 2);
    let ClientMessage::TileBuffers { sheet_id, buffers } = &seen[0] else {
        panic!("expected buffers first");
    };
    assert_eq!(sheet_id, &SheetId::new("a"));
    assert_eq!(buffers.glyph_count(), 2);
    assert!(d.first_paint_done());
}

#[tokio::test]
async fn test_idle_loop_wakes_on_scroll() {
    let (source, mut requests) = content_channel();
    let (presenter, client, viewport_tx) = presenter_channel(Viewport::new(800.0, 600.0));
    let config = RenderConfig {
        memory_budget: 1,
        ..RenderConfig::default()
    };
    let mut d = RenderDriver::new(
        config,
        Rc::new(MonospaceShaper::default()),
        source,
        presenter,
    );
    let (tx, inbox) = tokio::sync::mpsc::unbounded_channel();

    let engine = async move {
        tx.send(CoreMessage::SheetAdded(sheet("a", CellRect::new(0, 0, 60, 30))))
            .unwrap();
        tx.send(CoreMessage::ActiveSheet {
            sheet_id: Some(SheetId::new("a")),
        })
        .unwrap();

        // answer until the driver runs out of work under the tight budget
        let mut fetched = Vec::new();
        while let Ok(Some(request)) = timeout(Duration::from_millis(100), requests.recv()).await {
            fetched.push(request.key);
            tx.send(CoreMessage::Cells(answer(&request, 0, &[]))).unwrap();
        }
        assert!(fetched.contains(&TileKey::new(0, 0)));
        assert!(!fetched.contains(&TileKey::new(3, 0)));

        // scrolling alone, with no engine traffic, must wake the driver
        let mut scrolled = Viewport::new(800.0, 600.0);
        scrolled.set_scroll(4600.0, 0.0);
        viewport_tx.send(scrolled).unwrap();
        let request = timeout(Duration::from_millis(500), requests.recv())
            .await
            .expect("driver stayed asleep after scroll")
            .unwrap();
        assert_eq!(request.key, TileKey::new(3, 0));

        drop(tx);
        (requests, client, viewport_tx)
    };

    let (result, _ends) = tokio::join!(d.run(inbox), engine);
    result.unwrap();
}

#[tokio::test]
async fn test_run_loop_retries_failed_fetch() {
    let (source, mut requests) = content_channel();
    let (presenter, mut client, _viewport) = presenter_channel(Viewport::new(800.0, 600.0));
    let mut d = RenderDriver::new(
        RenderConfig::default(),
        Rc::new(MonospaceShaper::default()),
        FlakySource::new(source, 1),
        presenter,
    );
    let (tx, inbox) = tokio::sync::mpsc::unbounded_channel();

    let engine = async move {
        tx.send(CoreMessage::SheetAdded(sheet("a", CellRect::new(0, 0, 15, 30))))
            .unwrap();
        tx.send(CoreMessage::ActiveSheet {
            sheet_id: Some(SheetId::new("a")),
        })
        .unwrap();

        let request = timeout(Duration::from_millis(500), requests.recv())
            .await
            .expect("fetch was never retried")
            .unwrap();
        assert_eq!(request.key, TileKey::new(0, 0));
        tx.send(CoreMessage::Cells(answer(&request, 0, &[])))
            .unwrap();

        while let Some(message) = client.recv().await {
            if message == ClientMessage::FirstPaintComplete {
                break;
            }
        }
        drop(tx);
        (requests, client)
    };

    let (result, _ends) = tokio::join!(d.run(inbox), engine);
    result.unwrap();
    assert_eq!(d.source().calls, 2);
    assert!(d.first_paint_done());
}
