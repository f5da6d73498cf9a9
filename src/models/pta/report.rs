//! Parameter tables for run reports.

use comfy_table::{
    Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED,
};

use super::layout::ParameterLayout;

/// Render the layout as a table of index, label, component and bounds.
///
/// When `values` is given (a point of the parameter vector) a value column is
/// added; values outside their bounds are highlighted in red.
#[must_use]
pub fn render_parameter_table(layout: &ParameterLayout, values: Option<&[f64]>) -> Table {
    let mut headers = vec!["index", "parameter", "component", "lower", "upper"];
    if values.is_some() {
        headers.push("value");
    }
    let mut table = make_table(&headers);
    for slice in layout.slices() {
        for index in slice.range() {
            let lower = layout.lower()[index];
            let upper = layout.upper()[index];
            let mut row = vec![
                Cell::new(index),
                Cell::new(&layout.labels()[index]),
                Cell::new(slice.component.name()),
                Cell::new(format!("{lower:.4}")),
                Cell::new(format!("{upper:.4}")),
            ];
            if let Some(value) = values.and_then(|v| v.get(index)) {
                row.push(value_cell(*value, lower, upper));
            }
            table.add_row(row);
        }
    }
    table
}

fn make_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|h| Cell::new(*h)).collect::<Vec<_>>());
    table
}

fn value_cell(value: f64, lower: f64, upper: f64) -> Cell {
    let cell = Cell::new(format!("{value:.4}"));
    if (lower..=upper).contains(&value) {
        cell
    } else {
        cell.fg(Color::Red).add_attribute(Attribute::Bold)
    }
}
