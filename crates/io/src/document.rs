// Sheet document load/save
//
// {
//   "format": 1,
//   "version": "default",
//   "cells": [ { "name": "A1", "contents": "5" }, { "name": "B1", "contents": "=A1*2" } ]
// }
//
// Contents are stored in canonical input form, so loading is just replaying
// them through `set_contents_of_cell`. Cells are written in first-written
// order; formulas may reference cells that appear later in the list.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use gridsync_engine::{NameRules, Sheet};

use crate::error::ReadWriteError;
use crate::DOCUMENT_FORMAT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub name: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetDocument {
    #[serde(default = "default_format")]
    pub format: u32,
    pub version: String,
    #[serde(default)]
    pub cells: Vec<CellRecord>,
}

fn default_format() -> u32 {
    DOCUMENT_FORMAT
}

impl SheetDocument {
    /// Snapshot every nonempty cell of `sheet`.
    pub fn from_sheet(sheet: &Sheet) -> Self {
        let cells = sheet
            .nonempty_cells()
            .into_iter()
            .filter_map(|name| {
                let contents = sheet.get_cell_contents(&name).ok()?.to_input();
                Some(CellRecord { name, contents })
            })
            .collect();
        Self {
            format: DOCUMENT_FORMAT,
            version: sheet.version().to_string(),
            cells,
        }
    }

    /// Write this document to `path`.
    ///
    /// Written to a temporary sibling first and renamed into place, so a crash
    /// mid-write never leaves a truncated document behind.
    pub fn write(&self, path: &Path) -> Result<(), ReadWriteError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ReadWriteError::Format(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ReadWriteError::Io(e.to_string()))?;
            }
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(|e| ReadWriteError::Io(format!("{}: {}", tmp_path.display(), e)))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| ReadWriteError::Io(format!("failed to rename tmp to {}: {}", path.display(), e)))?;

        log::debug!("Saved {} cells to {}", self.cells.len(), path.display());
        Ok(())
    }

    /// Replay the stored cells into `sheet`.
    pub fn apply_to(&self, sheet: &mut Sheet) -> Result<(), ReadWriteError> {
        for cell in &self.cells {
            sheet
                .set_contents_of_cell(&cell.name, &cell.contents)
                .map_err(|e| ReadWriteError::InvalidCell {
                    name: cell.name.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }
}

fn read_document(path: &Path) -> Result<SheetDocument, ReadWriteError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ReadWriteError::Io(format!("{}: {}", path.display(), e)))?;
    let doc: SheetDocument =
        serde_json::from_str(&text).map_err(|e| ReadWriteError::Format(e.to_string()))?;
    if doc.format > DOCUMENT_FORMAT {
        return Err(ReadWriteError::Format(format!(
            "document format {} is newer than supported format {}",
            doc.format, DOCUMENT_FORMAT
        )));
    }
    Ok(doc)
}

/// Write `sheet` to `path` and clear its changed flag.
pub fn save(sheet: &mut Sheet, path: &Path) -> Result<(), ReadWriteError> {
    SheetDocument::from_sheet(sheet).write(path)?;
    sheet.mark_saved();
    Ok(())
}

/// Load a sheet saved with `version`.
///
/// The returned sheet uses `rules` and starts out unchanged.
pub fn load(path: &Path, rules: NameRules, version: &str) -> Result<Sheet, ReadWriteError> {
    let doc = read_document(path)?;
    if doc.version != version {
        return Err(ReadWriteError::VersionMismatch {
            expected: version.to_string(),
            found: doc.version,
        });
    }

    let mut sheet = Sheet::with_rules(rules, version);
    doc.apply_to(&mut sheet)?;
    sheet.mark_saved();
    Ok(sheet)
}

/// Like [`load`], but a missing file yields a new empty sheet.
pub fn load_or_new(path: &Path, rules: NameRules, version: &str) -> Result<Sheet, ReadWriteError> {
    if path.exists() {
        load(path, rules, version)
    } else {
        Ok(Sheet::with_rules(rules, version))
    }
}

/// Version string stored in the document at `path`, without loading cells.
pub fn saved_version(path: &Path) -> Result<String, ReadWriteError> {
    read_document(path).map(|doc| doc.version)
}
