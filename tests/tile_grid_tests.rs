//! Tile grid tests
//!
//! Scheduling order, determinism, eviction, stale responses, heading deltas,
//! dirty rows and clipping across tile boundaries.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]

mod common;

use common::{answer, fetch_request, grid, grid_with, render_all, tile_key};
use sheettext::messages::CellsResponse;
use sheettext::render::{Scheduled, TileState, TileWork};
use sheettext::{CellRect, RenderCell, RenderConfig, ScreenRect, SheetId, TileKey};

fn viewport(width: f64, height: f64) -> ScreenRect {
    ScreenRect::from_span(0.0, 0.0, width, height)
}

// ============================================================================
// Tile registry
// ============================================================================

#[test]
fn test_every_tile_is_in_row_index() {
    let mut g = grid();
    g.set_bounds(CellRect::new(-20, -40, 60, 100));
    g.get_or_create(500, 500);
    let mut indexed = 0;
    for tile in g.tiles() {
        let key = tile.key();
        assert!(g.tiles_in_row(key.hash_y).contains(&key));
        indexed += 1;
    }
    let rows: std::collections::BTreeSet<i64> = g.tiles().map(|t| t.key().hash_y).collect();
    let total: usize = rows.iter().map(|&y| g.tiles_in_row(y).len()).sum();
    assert_eq!(total, indexed);
    assert_eq!(g.row_tiles(500), g.tiles_in_row(16));
    assert_eq!(g.column_tiles(-1), vec![TileKey::new(-1, -2), TileKey::new(-1, -1), TileKey::new(-1, 0), TileKey::new(-1, 1)]);
}

#[test]
fn test_pushed_content_creates_tile() {
    let mut g = grid();
    let accepted = g.receive_cells(CellsResponse {
        request_id: None,
        sheet_id: SheetId::new("sheet"),
        key: TileKey::new(5, -5),
        sequence: 1,
        result: Ok(vec![RenderCell::text(75, -150, "pushed")]),
    });
    assert!(accepted);
    assert_eq!(
        g.tile(TileKey::new(5, -5)).unwrap().state(),
        TileState::Dirty
    );
    assert_eq!(g.tiles_in_row(-5), vec![TileKey::new(5, -5)]);
}

// ============================================================================
// Scheduling order
// ============================================================================

#[test]
fn test_visible_tiles_fill_top_to_bottom() {
    let mut g = grid();
    g.set_bounds(CellRect::new(0, 0, 60, 90));
    // covers hash_x 0..=1, hash_y 0..=1
    g.set_viewport(viewport(3000.0, 1260.0));
    let steps = render_all(&mut g, &[]);

    let mut visible: Vec<TileKey> = Vec::new();
    let mut offscreen: Vec<TileKey> = Vec::new();
    for step in &steps {
        let Scheduled::Tile { key, visible: v, .. } = step else {
            continue;
        };
        let list = if *v { &mut visible } else { &mut offscreen };
        if list.last() != Some(key) {
            list.push(*key);
        }
    }
    assert_eq!(
        visible,
        vec![
            TileKey::new(0, 0),
            TileKey::new(1, 0),
            TileKey::new(0, 1),
            TileKey::new(1, 1)
        ]
    );
    // every visible tile was finished before any prefetch started
    let first_offscreen = steps
        .iter()
        .position(|s| matches!(s, Scheduled::Tile { visible: false, .. }))
        .unwrap();
    assert!(steps[first_offscreen..]
        .iter()
        .all(|s| !s.is_visible()));

    // prefetch goes closest first
    let distances: Vec<f64> = offscreen
        .iter()
        .map(|k| g.tile(*k).unwrap().view_rectangle().distance_squared(&g.viewport().unwrap()))
        .collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(offscreen.len(), 8);
}

#[test]
fn test_selection_is_deterministic() {
    let build = || {
        let mut g = grid();
        g.set_bounds(CellRect::new(-45, -60, 120, 150));
        g.set_viewport(ScreenRect::from_span(-700.0, -300.0, 1600.0, 900.0));
        g
    };
    let g = build();
    assert_eq!(g.select(g.viewport()), g.select(g.viewport()));

    let cells = [RenderCell::text(-1, -1, "a"), RenderCell::text(30, 40, "b")];
    let mut a = build();
    let mut b = build();
    let keys_a: Vec<_> = render_all(&mut a, &cells).iter().map(tile_key).collect();
    let keys_b: Vec<_> = render_all(&mut b, &cells).iter().map(tile_key).collect();
    assert_eq!(keys_a, keys_b);
}

#[test]
fn test_in_flight_tile_not_reselected() {
    let mut g = grid();
    g.get_or_create(0, 0);
    g.get_or_create(15, 0);
    g.set_viewport(viewport(3000.0, 600.0));
    let first = g.schedule_next();
    let second = g.schedule_next();
    assert_eq!(tile_key(&first), Some(TileKey::new(0, 0)));
    assert_eq!(tile_key(&second), Some(TileKey::new(1, 0)));
    assert!(fetch_request(&second).is_some());
    assert!(g.schedule_next().is_idle());
}

#[test]
fn test_without_viewport_work_follows_key_order() {
    let mut g = grid();
    g.set_bounds(CellRect::new(-15, 0, 45, 30));
    assert!(g.viewport().is_none());
    assert!(!g.has_visible_work());

    let steps: Vec<Scheduled> = (0..3).map(|_| g.schedule_next()).collect();
    assert!(steps.iter().all(|s| !s.is_visible()));
    assert_eq!(
        steps.iter().map(tile_key).collect::<Vec<_>>(),
        vec![
            Some(TileKey::new(-1, 0)),
            Some(TileKey::new(0, 0)),
            Some(TileKey::new(1, 0))
        ]
    );

    // a sheet that leaves the screen forgets where it was
    g.set_viewport(viewport(800.0, 600.0));
    g.clear_viewport();
    assert!(g.viewport().is_none());
}

#[test]
fn test_failed_fetch_makes_tile_selectable_again() {
    let mut g = grid();
    g.get_or_create(0, 0);
    g.set_viewport(viewport(800.0, 600.0));
    let first = g.schedule_next();
    let first_id = fetch_request(&first).unwrap().request_id;
    assert!(g.schedule_next().is_idle());

    g.fetch_failed(TileKey::new(0, 0));
    assert_eq!(g.tile(TileKey::new(0, 0)).unwrap().pending_request(), None);
    let retry = g.schedule_next();
    assert!(retry.is_visible());
    assert_ne!(fetch_request(&retry).unwrap().request_id, first_id);
}

// ============================================================================
// Content sequencing
// ============================================================================

#[test]
fn test_stale_response_is_discarded() {
    let mut g = grid();
    g.set_viewport(viewport(800.0, 600.0));
    g.get_or_create(0, 0);
    let step = g.schedule_next();
    let old_request = fetch_request(&step).unwrap().clone();

    // an edit lands while the fetch is in flight
    g.cells_changed(CellRect::new(0, 0, 1, 1), 7);
    let stale = answer(&old_request, 6, &[RenderCell::text(0, 0, "old")]);
    assert!(!g.receive_cells(stale));
    let tile = g.tile(TileKey::new(0, 0)).unwrap();
    assert!(tile.needs_content());
    assert_eq!(tile.sequence(), 7);

    // the tile is fetched again and the fresh content wins
    let step = g.schedule_next();
    let request = fetch_request(&step).unwrap().clone();
    assert!(g.receive_cells(answer(&request, 7, &[RenderCell::text(0, 0, "new")])));
    let Scheduled::Tile {
        work: TileWork::Rendered(buffers),
        ..
    } = g.schedule_next()
    else {
        panic!("expected render");
    };
    assert_eq!(buffers.glyph_count(), 3);
}

// ============================================================================
// Memory governance
// ============================================================================

fn tight_grid() -> sheettext::render::TileGrid {
    let mut g = grid_with(RenderConfig {
        memory_budget: 1,
        ..RenderConfig::default()
    });
    g.set_bounds(CellRect::new(0, 0, 60, 30));
    g.set_viewport(viewport(800.0, 600.0));
    g
}

#[test]
fn test_visible_tile_never_evicted() {
    let mut g = tight_grid();
    let cells = [RenderCell::text(0, 0, "visible"), RenderCell::text(20, 0, "off")];
    let steps = render_all(&mut g, &cells);
    for step in &steps {
        if let Scheduled::Tile { evicted, .. } = step {
            assert_ne!(*evicted, Some(TileKey::new(0, 0)));
        }
    }
    assert!(g.tile(TileKey::new(0, 0)).unwrap().is_loaded());
    // prefetch stops once it would only displace something closer
    assert!(!g.tile(TileKey::new(3, 0)).unwrap().is_loaded());
    assert!(g.memory_usage() > 1);
}

#[test]
fn test_farthest_offscreen_tile_evicted_first() {
    let mut g = tight_grid();
    render_all(&mut g, &[]);
    assert!(g.tile(TileKey::new(0, 0)).unwrap().is_loaded());
    assert!(g.tile(TileKey::new(1, 0)).unwrap().is_loaded());

    // tile (0, 0) gets an edit and its refetch is in flight when we scroll away
    g.cells_changed(CellRect::new(0, 0, 1, 1), 4);
    let TileWork::Fetch(in_flight) = g.process_tile(TileKey::new(0, 0)) else {
        panic!("expected fetch");
    };

    g.set_viewport(ScreenRect::from_span(4500.0, 0.0, 800.0, 600.0));
    let step = g.schedule_next();
    let Scheduled::Tile {
        key,
        visible,
        evicted,
        ..
    } = step
    else {
        panic!("expected tile work");
    };
    assert_eq!(key, TileKey::new(3, 0));
    assert!(visible);
    assert_eq!(evicted, Some(TileKey::new(0, 0)));
    assert_eq!(
        g.tile(TileKey::new(0, 0)).unwrap().state(),
        TileState::Unloaded
    );

    // the response for the evicted tile is still accepted
    assert!(g.receive_cells(answer(&in_flight, 4, &[RenderCell::text(0, 0, "x")])));
    assert_eq!(
        g.tile(TileKey::new(0, 0)).unwrap().state(),
        TileState::Dirty
    );
}

// ============================================================================
// Heading deltas
// ============================================================================

fn laid_out() -> sheettext::render::TileGrid {
    let mut g = grid();
    g.set_bounds(CellRect::new(0, 0, 30, 30));
    g.set_viewport(viewport(3000.0, 600.0));
    render_all(
        &mut g,
        &[RenderCell::text(3, 0, "a"), RenderCell::text(20, 2, "b")],
    );
    g
}

fn first_glyph_x(g: &sheettext::render::TileGrid, key: TileKey) -> f64 {
    g.tile(key).unwrap().buffers().unwrap().runs[0].quads[0].x
}

#[test]
fn test_resize_shifts_glyphs_without_refetch() {
    let mut g = laid_out();
    assert_eq!(first_glyph_x(&g, TileKey::new(1, 0)), 2002.0);

    g.resize_column(1, 150.0).unwrap();
    assert_eq!(
        g.schedule_next(),
        Scheduled::Headings {
            columns: 1,
            rows: 0
        }
    );
    assert_eq!(
        g.tile(TileKey::new(0, 0)).unwrap().state(),
        TileState::DirtyBuffers
    );
    let steps = render_all(&mut g, &[]);
    assert!(steps.iter().all(|s| fetch_request(s).is_none()));
    assert_eq!(first_glyph_x(&g, TileKey::new(0, 0)), 352.0);
    assert_eq!(first_glyph_x(&g, TileKey::new(1, 0)), 2052.0);
    assert_eq!(
        g.tile(TileKey::new(1, 0)).unwrap().view_rectangle().left,
        1550.0
    );
}

#[test]
fn test_accumulated_deltas_match_single_resize() {
    let mut twice = laid_out();
    twice.resize_column(1, 105.0).unwrap();
    twice.resize_column(1, 108.0).unwrap();
    assert_eq!(twice.pending_column_delta(1), Some(8.0));

    let mut once = laid_out();
    once.resize_column(1, 108.0).unwrap();

    render_all(&mut twice, &[]);
    render_all(&mut once, &[]);
    for key in [TileKey::new(0, 0), TileKey::new(1, 0)] {
        assert_eq!(
            twice.tile(key).unwrap().buffers(),
            once.tile(key).unwrap().buffers()
        );
    }
}

#[test]
fn test_row_resize_moves_rows_below() {
    let mut g = laid_out();
    let before = g.tile(TileKey::new(1, 0)).unwrap().buffers().unwrap().runs[0].quads[0].y;
    g.resize_row(0, 31.0).unwrap();
    render_all(&mut g, &[]);
    let after = g.tile(TileKey::new(1, 0)).unwrap().buffers().unwrap().runs[0].quads[0].y;
    assert_eq!(after, before + 10.0);
}

// ============================================================================
// Clipping across tiles
// ============================================================================

#[test]
fn test_overflow_clipped_by_neighbor_tile() {
    let mut g = grid();
    g.set_bounds(CellRect::new(0, 0, 30, 30));
    g.set_viewport(viewport(3000.0, 600.0));
    let long = "x".repeat(60);
    render_all(
        &mut g,
        &[RenderCell::text(14, 0, long), RenderCell::text(16, 0, "stop")],
    );
    let buffers = g.tile(TileKey::new(0, 0)).unwrap().buffers().unwrap();
    let right = buffers
        .runs
        .iter()
        .flat_map(|r| &r.quads)
        .map(|q| q.x + q.width)
        .fold(f64::MIN, f64::max);
    assert_eq!(right, 1600.0);
    assert_eq!(buffers.bounds.unwrap().right, 1599.0);

    // the overflow makes tile (0, 0) visible further right than its own cells
    assert!(g.tile(TileKey::new(0, 0)).unwrap().visible_rectangle().right > 1499.0);
}

#[test]
fn test_overflow_unclipped_without_neighbor() {
    let mut g = grid();
    g.set_bounds(CellRect::new(0, 0, 30, 30));
    g.set_viewport(viewport(3000.0, 600.0));
    render_all(&mut g, &[RenderCell::text(14, 0, "x".repeat(60))]);
    let buffers = g.tile(TileKey::new(0, 0)).unwrap().buffers().unwrap();
    assert_eq!(buffers.glyph_count(), 60);
}

// ============================================================================
// Dirty rows
// ============================================================================

#[test]
fn test_dirty_row_processed_after_tiles() {
    let mut g = laid_out();
    g.mark_row_dirty(2);
    let Scheduled::Row { row, uploads } = g.schedule_next() else {
        panic!("expected row");
    };
    assert_eq!(row, 2);
    assert!(!uploads.is_empty());
    assert!(g.schedule_next().is_idle());
}
