//! CLI tool for sheettext - renders a sheet description offline and reports
//! what the tile cache produced
//!
//! Usage:
//!   sheettext_cli <sheet.json>              # Print JSON report to stdout
//!   sheettext_cli <sheet.json> -o out.json  # Write JSON report to file
//!
//! Input format:
//!   {
//!     "config": { ... },                      # optional RenderConfig
//!     "viewport": { "scrollX": 0, ... },      # optional
//!     "active": "sheet-1",                    # optional, defaults to the first sheet
//!     "sheets": [{ "sheetId": "sheet-1", "offsets": {...}, "bounds": {...}, "cells": [...] }]
//!   }
//!
//! Log verbosity follows `RUST_LOG` (default `sheettext=info`).

#![allow(clippy::exit)]

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::prelude::*;

use sheettext::channel::{ContentSource, Presenter};
use sheettext::layout::Viewport;
use sheettext::messages::{CellsRequest, CellsResponse, ClientMessage, CoreMessage};
use sheettext::render::{MonospaceShaper, RenderDriver};
use sheettext::{
    CellRect, OffsetsData, RenderCell, RenderConfig, Result, SheetId, SheetInfo, SheetTextError,
    TileKey,
};

/// Stop after this many ticks even if work remains.
const MAX_TICKS: usize = 1_000_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetInput {
    sheet_id: SheetId,
    #[serde(default)]
    offsets: OffsetsData,
    #[serde(default)]
    bounds: Option<CellRect>,
    #[serde(default)]
    cells: Vec<RenderCell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Input {
    #[serde(default)]
    config: RenderConfig,
    #[serde(default)]
    viewport: Viewport,
    #[serde(default)]
    active: Option<SheetId>,
    sheets: Vec<SheetInput>,
}

/// Answers content requests from the cells in the input file.
#[derive(Default)]
struct LocalEngine {
    cells: BTreeMap<SheetId, Vec<RenderCell>>,
    queued: Vec<CellsRequest>,
}

impl LocalEngine {
    fn answer(&mut self) -> Vec<CoreMessage> {
        let queued = std::mem::take(&mut self.queued);
        queued
            .iter()
            .map(|request| {
                let cells = self
                    .cells
                    .get(&request.sheet_id)
                    .map(|cells| {
                        cells
                            .iter()
                            .filter(|c| request.rect.contains(c.x, c.y))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                CoreMessage::Cells(CellsResponse::reply(request, 0, cells))
            })
            .collect()
    }
}

impl ContentSource for LocalEngine {
    fn request_cells(&mut self, request: CellsRequest) -> Result<()> {
        self.queued.push(request);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct SheetReport {
    tiles_uploaded: usize,
    glyphs: usize,
    tiles_unloaded: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    empty_tiles: Vec<TileKey>,
}

struct Screen {
    viewport: Viewport,
    first_paint_tick: Option<usize>,
    ticks: usize,
    sheets: BTreeMap<SheetId, SheetReport>,
}

impl Presenter for Screen {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn present(&mut self, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::TileBuffers { sheet_id, buffers } => {
                let report = self.sheets.entry(sheet_id).or_default();
                report.tiles_uploaded += 1;
                report.glyphs += buffers.glyph_count();
                if buffers.runs.is_empty() {
                    report.empty_tiles.push(buffers.key);
                }
            }
            ClientMessage::TileUnloaded { sheet_id, .. } => {
                self.sheets.entry(sheet_id).or_default().tiles_unloaded += 1;
            }
            ClientMessage::FirstPaintComplete => self.first_paint_tick = Some(self.ticks),
        }
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    ticks: usize,
    first_paint_tick: Option<usize>,
    sheets: BTreeMap<SheetId, SheetReport>,
}

fn run(input: Input) -> Result<Report> {
    input.config.validate()?;
    let active = input
        .active
        .or_else(|| input.sheets.first().map(|s| s.sheet_id.clone()));
    let mut engine = LocalEngine::default();
    let mut infos = Vec::new();
    for sheet in input.sheets {
        infos.push(SheetInfo {
            sheet_id: sheet.sheet_id.clone(),
            offsets: sheet.offsets,
            bounds: sheet.bounds,
        });
        engine.cells.insert(sheet.sheet_id, sheet.cells);
    }

    let screen = Screen {
        viewport: input.viewport,
        first_paint_tick: None,
        ticks: 0,
        sheets: BTreeMap::new(),
    };
    let mut driver = RenderDriver::new(
        input.config,
        Rc::new(MonospaceShaper::default()),
        engine,
        screen,
    );
    for info in &infos {
        driver.handle_message(CoreMessage::SheetAdded(info.clone()))?;
    }
    driver.set_active_sheet(active)?;

    let mut ticks = 0;
    while ticks < MAX_TICKS {
        ticks += 1;
        driver.presenter_mut().ticks = ticks;
        let worked = driver.tick().is_some();
        let responses = driver.source_mut().answer();
        if !worked && responses.is_empty() {
            break;
        }
        for message in responses {
            driver.handle_message(message)?;
        }
    }
    info!(ticks, "Render loop idle");

    let screen = driver.presenter();
    Ok(Report {
        ticks,
        first_paint_tick: screen.first_paint_tick,
        sheets: screen.sheets.clone(),
    })
}

fn load(path: &str) -> Result<Input> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(SheetTextError::from)
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sheettext=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    let Some(input_path) = args.get(1) else {
        eprintln!("Usage: sheettext_cli <sheet.json> [-o report.json]");
        std::process::exit(1);
    };
    let output_path = match (args.get(2), args.get(3)) {
        (Some(flag), Some(path)) if flag == "-o" => Some(path),
        _ => None,
    };

    let input = match load(input_path) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("Error reading {}: {}", input_path, e);
            std::process::exit(1);
        }
    };

    let report = match run(input) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error rendering: {}", e);
            std::process::exit(1);
        }
    };

    let json = match serde_json::to_string_pretty(&report) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error serializing JSON: {}", e);
            std::process::exit(1);
        }
    };

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(path, &json) {
                eprintln!("Error writing {}: {}", path, e);
                std::process::exit(1);
            }
            eprintln!("Written: {}", path);
        }
        None => {
            let mut stdout = io::stdout();
            if let Err(e) = writeln!(stdout, "{json}") {
                eprintln!("Error writing stdout: {}", e);
                std::process::exit(1);
            }
        }
    }
}
