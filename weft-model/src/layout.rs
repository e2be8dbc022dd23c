use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declarative layout for a section (usually a page).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutConfig {
    #[serde(rename = "type", default)]
    pub kind: LayoutKind,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub gap: u32,
    #[serde(default = "default_columns")]
    pub columns: u32,
    /// Width-dependent overrides, matched on the largest `min_width` that
    /// does not exceed the viewport.
    #[serde(default)]
    pub breakpoints: Vec<Breakpoint>,
    /// Explicit placements keyed by component id.
    #[serde(default)]
    pub placements: BTreeMap<String, Placement>,
}

fn default_columns() -> u32 {
    1
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            kind: LayoutKind::Stack,
            direction: Direction::Vertical,
            gap: 0,
            columns: 1,
            breakpoints: Vec::new(),
            placements: BTreeMap::new(),
        }
    }
}

impl LayoutConfig {
    pub fn stack(direction: Direction, gap: u32) -> Self {
        Self {
            direction,
            gap,
            ..Self::default()
        }
    }

    pub fn grid(columns: u32, gap: u32) -> Self {
        Self {
            kind: LayoutKind::Grid,
            columns,
            gap,
            ..Self::default()
        }
    }

    pub fn with_breakpoint(mut self, breakpoint: Breakpoint) -> Self {
        self.breakpoints.push(breakpoint);
        self
    }

    pub fn with_placement(mut self, component_id: impl Into<String>, placement: Placement) -> Self {
        self.placements.insert(component_id.into(), placement);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Stack,
    Grid,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub name: String,
    pub min_width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap: Option<u32>,
}

impl Breakpoint {
    pub fn new(name: impl Into<String>, min_width: u32) -> Self {
        Self {
            name: name.into(),
            min_width,
            columns: None,
            gap: None,
        }
    }

    pub fn columns(mut self, columns: u32) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn gap(mut self, gap: u32) -> Self {
        self.gap = Some(gap);
        self
    }
}

/// Where a component goes. Row/column are zero-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(default = "default_slot")]
    pub slot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default = "default_span")]
    pub span: u32,
}

fn default_slot() -> String {
    "default".to_string()
}

fn default_span() -> u32 {
    1
}

impl Placement {
    pub fn slot(slot: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            row: None,
            column: None,
            span: 1,
        }
    }

    pub fn at(mut self, row: u32, column: u32) -> Self {
        self.row = Some(row);
        self.column = Some(column);
        self
    }

    pub fn span(mut self, span: u32) -> Self {
        self.span = span;
        self
    }
}
