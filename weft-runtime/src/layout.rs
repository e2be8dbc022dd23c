//! Slot assignment for page sections.

use crate::error::{RuntimeError, RuntimeResult};
use crate::subscription::lock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use weft_model::{Breakpoint, Direction, LayoutConfig, LayoutKind};

/// Position of one component. Rows and columns are zero-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAssignment {
    pub component_id: String,
    pub slot: String,
    pub row: u32,
    pub column: u32,
    pub span: u32,
}

/// A section laid out for one viewport width.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLayout {
    pub section_id: String,
    pub kind: LayoutKind,
    pub columns: u32,
    pub gap: u32,
    pub breakpoint: Option<String>,
    pub slots: Vec<SlotAssignment>,
}

impl ResolvedLayout {
    pub fn slot_of(&self, component_id: &str) -> Option<&SlotAssignment> {
        self.slots.iter().find(|s| s.component_id == component_id)
    }
}

/// Breakpoint with the largest `min_width` not exceeding `width`.
pub fn active_breakpoint(config: &LayoutConfig, width: u32) -> Option<&Breakpoint> {
    config
        .breakpoints
        .iter()
        .filter(|b| b.min_width <= width)
        .max_by_key(|b| b.min_width)
}

/// Layout configs keyed by section id.
#[derive(Default)]
pub struct LayoutManager {
    layouts: Mutex<HashMap<String, LayoutConfig>>,
}

impl LayoutManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a section layout, replacing any previous config wholesale.
    pub fn register(&self, section_id: &str, config: LayoutConfig) -> Option<LayoutConfig> {
        lock(&self.layouts).insert(section_id.to_string(), config)
    }

    pub fn unregister(&self, section_id: &str) -> Option<LayoutConfig> {
        lock(&self.layouts).remove(section_id)
    }

    pub fn config(&self, section_id: &str) -> Option<LayoutConfig> {
        lock(&self.layouts).get(section_id).cloned()
    }

    pub fn clear(&self) {
        lock(&self.layouts).clear();
    }

    /// Assigns each component, in order, to a slot of the section.
    pub fn resolve<S: AsRef<str>>(
        &self,
        section_id: &str,
        components: &[S],
        width: u32,
    ) -> RuntimeResult<ResolvedLayout> {
        let config = self
            .config(section_id)
            .ok_or_else(|| RuntimeError::LayoutNotFound(section_id.to_string()))?;
        let breakpoint = active_breakpoint(&config, width);
        let gap = breakpoint.and_then(|b| b.gap).unwrap_or(config.gap);
        let ids: Vec<&str> = components.iter().map(AsRef::as_ref).collect();

        let (columns, slots) = match config.kind {
            LayoutKind::Stack => stack(&config, &ids),
            LayoutKind::Grid => {
                let columns = breakpoint.and_then(|b| b.columns).unwrap_or(config.columns).max(1);
                (columns, grid(&config, &ids, columns))
            }
            LayoutKind::Custom => (config.columns.max(1), custom(&config, &ids)),
        };

        Ok(ResolvedLayout {
            section_id: section_id.to_string(),
            kind: config.kind,
            columns,
            gap,
            breakpoint: breakpoint.map(|b| b.name.clone()),
            slots,
        })
    }
}

fn slot_name(config: &LayoutConfig, id: &str) -> String {
    config
        .placements
        .get(id)
        .map(|p| p.slot.clone())
        .unwrap_or_else(|| "default".to_string())
}

fn stack(config: &LayoutConfig, ids: &[&str]) -> (u32, Vec<SlotAssignment>) {
    let horizontal = config.direction == Direction::Horizontal;
    let slots = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let i = i as u32;
            SlotAssignment {
                component_id: id.to_string(),
                slot: slot_name(config, id),
                row: if horizontal { 0 } else { i },
                column: if horizontal { i } else { 0 },
                span: 1,
            }
        })
        .collect();
    let columns = if horizontal { (ids.len() as u32).max(1) } else { 1 };
    (columns, slots)
}

/// Row-major flow. A component whose span does not fit the rest of the row
/// wraps to the next one. Explicit row/column placements are honoured and
/// do not move the cursor.
fn grid(config: &LayoutConfig, ids: &[&str], columns: u32) -> Vec<SlotAssignment> {
    let (mut row, mut column) = (0u32, 0u32);
    let mut slots = Vec::with_capacity(ids.len());
    for id in ids {
        let placement = config.placements.get(*id);
        let span = placement.map(|p| p.span).unwrap_or(1).clamp(1, columns);

        if let Some((r, c)) = placement.and_then(|p| Some((p.row?, p.column?))) {
            slots.push(SlotAssignment {
                component_id: id.to_string(),
                slot: slot_name(config, id),
                row: r,
                column: c.min(columns - 1),
                span,
            });
            continue;
        }

        if column + span > columns {
            row += 1;
            column = 0;
        }
        slots.push(SlotAssignment {
            component_id: id.to_string(),
            slot: slot_name(config, id),
            row,
            column,
            span,
        });
        column += span;
        if column >= columns {
            row += 1;
            column = 0;
        }
    }
    slots
}

/// Placed components keep their placement; the rest stack in the
/// `default` slot after whatever was placed there.
fn custom(config: &LayoutConfig, ids: &[&str]) -> Vec<SlotAssignment> {
    let mut next_row: BTreeMap<String, u32> = BTreeMap::new();
    ids.iter()
        .map(|id| match config.placements.get(*id) {
            Some(p) => {
                let row = p.row.unwrap_or_else(|| *next_row.get(&p.slot).unwrap_or(&0));
                let entry = next_row.entry(p.slot.clone()).or_insert(0);
                *entry = (*entry).max(row + 1);
                SlotAssignment {
                    component_id: id.to_string(),
                    slot: p.slot.clone(),
                    row,
                    column: p.column.unwrap_or(0),
                    span: p.span.max(1),
                }
            }
            None => {
                let entry = next_row.entry("default".to_string()).or_insert(0);
                let row = *entry;
                *entry += 1;
                SlotAssignment {
                    component_id: id.to_string(),
                    slot: "default".to_string(),
                    row,
                    column: 0,
                    span: 1,
                }
            }
        })
        .collect()
}
