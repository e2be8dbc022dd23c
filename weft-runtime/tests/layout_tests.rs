//! Tests for layout.rs: stacks, grids, breakpoints and custom slots.

use pretty_assertions::assert_eq;
use weft_model::{Breakpoint, Direction, LayoutConfig, LayoutKind, Placement};
use weft_runtime::{active_breakpoint, LayoutManager, ResolvedLayout, RuntimeError};

fn positions(layout: &ResolvedLayout) -> Vec<(&str, u32, u32, u32)> {
    layout
        .slots
        .iter()
        .map(|s| (s.component_id.as_str(), s.row, s.column, s.span))
        .collect()
}

// ── Stack ───────────────────────────────────────────────────────

#[test]
fn vertical_stack_puts_each_component_on_its_own_row() {
    let layouts = LayoutManager::new();
    layouts.register("home", LayoutConfig::stack(Direction::Vertical, 8));

    let layout = layouts.resolve("home", &["a", "b", "c"], 1024).unwrap();
    assert_eq!(layout.kind, LayoutKind::Stack);
    assert_eq!(layout.columns, 1);
    assert_eq!(layout.gap, 8);
    assert_eq!(positions(&layout), vec![("a", 0, 0, 1), ("b", 1, 0, 1), ("c", 2, 0, 1)]);
    assert!(layout.slots.iter().all(|s| s.slot == "default"));
}

#[test]
fn horizontal_stack_uses_one_row() {
    let layouts = LayoutManager::new();
    layouts.register("toolbar", LayoutConfig::stack(Direction::Horizontal, 4));

    let layout = layouts.resolve("toolbar", &["a", "b"], 1024).unwrap();
    assert_eq!(layout.columns, 2);
    assert_eq!(positions(&layout), vec![("a", 0, 0, 1), ("b", 0, 1, 1)]);
}

// ── Grid ────────────────────────────────────────────────────────

#[test]
fn grid_flows_row_major() {
    let layouts = LayoutManager::new();
    layouts.register("grid", LayoutConfig::grid(2, 12));

    let layout = layouts.resolve("grid", &["a", "b", "c"], 1024).unwrap();
    assert_eq!(layout.columns, 2);
    assert_eq!(positions(&layout), vec![("a", 0, 0, 1), ("b", 0, 1, 1), ("c", 1, 0, 1)]);
}

#[test]
fn grid_wraps_spans_that_do_not_fit() {
    let layouts = LayoutManager::new();
    layouts.register(
        "grid",
        LayoutConfig::grid(3, 0)
            .with_placement("a", Placement::slot("main").span(2))
            .with_placement("b", Placement::slot("main").span(2))
            .with_placement("d", Placement::slot("main").span(9)),
    );

    let layout = layouts.resolve("grid", &["a", "b", "c", "d"], 1024).unwrap();
    assert_eq!(
        positions(&layout),
        vec![("a", 0, 0, 2), ("b", 1, 0, 2), ("c", 1, 2, 1), ("d", 2, 0, 3)]
    );
    assert_eq!(layout.slot_of("a").map(|s| s.slot.as_str()), Some("main"));
    assert_eq!(layout.slot_of("c").map(|s| s.slot.as_str()), Some("default"));
}

#[test]
fn explicit_grid_positions_do_not_move_the_cursor() {
    let layouts = LayoutManager::new();
    layouts.register(
        "grid",
        LayoutConfig::grid(2, 0).with_placement("pinned", Placement::slot("default").at(5, 1)),
    );

    let layout = layouts.resolve("grid", &["a", "pinned", "b"], 1024).unwrap();
    assert_eq!(
        positions(&layout),
        vec![("a", 0, 0, 1), ("pinned", 5, 1, 1), ("b", 0, 1, 1)]
    );
}

#[test]
fn breakpoints_override_columns_and_gap() {
    let config = LayoutConfig::grid(4, 16)
        .with_breakpoint(Breakpoint::new("mobile", 0).columns(1).gap(4))
        .with_breakpoint(Breakpoint::new("tablet", 600).columns(2))
        .with_breakpoint(Breakpoint::new("desktop", 1200));
    assert_eq!(active_breakpoint(&config, 320).map(|b| b.name.as_str()), Some("mobile"));
    assert_eq!(active_breakpoint(&config, 600).map(|b| b.name.as_str()), Some("tablet"));
    assert_eq!(active_breakpoint(&config, 1920).map(|b| b.name.as_str()), Some("desktop"));

    let layouts = LayoutManager::new();
    layouts.register("grid", config);

    let mobile = layouts.resolve("grid", &["a", "b"], 320).unwrap();
    assert_eq!((mobile.columns, mobile.gap), (1, 4));
    assert_eq!(positions(&mobile), vec![("a", 0, 0, 1), ("b", 1, 0, 1)]);

    let tablet = layouts.resolve("grid", &["a", "b"], 800).unwrap();
    assert_eq!((tablet.columns, tablet.gap), (2, 16));
    assert_eq!(tablet.breakpoint.as_deref(), Some("tablet"));

    let desktop = layouts.resolve("grid", &["a", "b"], 1920).unwrap();
    assert_eq!(desktop.columns, 4);
}

#[test]
fn no_breakpoint_below_smallest_min_width() {
    let config = LayoutConfig::grid(3, 0).with_breakpoint(Breakpoint::new("wide", 1000).columns(6));
    assert!(active_breakpoint(&config, 999).is_none());
}

// ── Custom ──────────────────────────────────────────────────────

#[test]
fn custom_layout_honours_slots_and_stacks_the_rest() {
    let layouts = LayoutManager::new();
    let mut config = LayoutConfig::default()
        .with_placement("logo", Placement::slot("header"))
        .with_placement("nav", Placement::slot("header"))
        .with_placement("body", Placement::slot("main").at(0, 1).span(2));
    config.kind = LayoutKind::Custom;
    layouts.register("page", config);

    let components = ["logo", "nav", "body", "footer", "extra"];
    let layout = layouts.resolve("page", &components, 1024).unwrap();
    let by_slot: Vec<(&str, &str, u32)> = layout
        .slots
        .iter()
        .map(|s| (s.component_id.as_str(), s.slot.as_str(), s.row))
        .collect();
    assert_eq!(
        by_slot,
        vec![
            ("logo", "header", 0),
            ("nav", "header", 1),
            ("body", "main", 0),
            ("footer", "default", 0),
            ("extra", "default", 1)
        ]
    );
    assert_eq!(layout.slot_of("body").map(|s| (s.column, s.span)), Some((1, 2)));
}

// ── Registry ────────────────────────────────────────────────────

#[test]
fn unknown_sections_fail() {
    let layouts = LayoutManager::new();
    let err = layouts.resolve("nope", &["a"], 1024).unwrap_err();
    assert!(matches!(err, RuntimeError::LayoutNotFound(ref s) if s == "nope"));
}

#[test]
fn register_replaces_wholesale() {
    let layouts = LayoutManager::new();
    assert!(layouts.register("home", LayoutConfig::grid(3, 0)).is_none());
    let previous = layouts.register("home", LayoutConfig::stack(Direction::Vertical, 0));
    assert_eq!(previous.map(|c| c.columns), Some(3));
    assert_eq!(layouts.config("home").map(|c| c.kind), Some(LayoutKind::Stack));

    assert!(layouts.unregister("home").is_some());
    layouts.register("other", LayoutConfig::default());
    layouts.clear();
    assert!(layouts.config("other").is_none());
}

#[test]
fn empty_sections_resolve_to_no_slots() {
    let layouts = LayoutManager::new();
    layouts.register("empty", LayoutConfig::grid(2, 0));
    let none: [&str; 0] = [];
    assert!(layouts.resolve("empty", &none, 1024).unwrap().slots.is_empty());
}
