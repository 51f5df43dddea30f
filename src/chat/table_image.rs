//! Renders large result sets as an SVG table served from the charts directory.

use super::format::display_cell;
use super::rows::ResultRow;
use minijinja::{context, AutoEscape, Environment};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

const ROW_HEIGHT: usize = 28;
const CHAR_WIDTH: usize = 8;
const PADDING: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum TableImageError {
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("Could not write table image: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct Cell {
    x: usize,
    text: String,
    numeric: bool,
}

#[derive(Serialize)]
struct Row {
    y: usize,
    shaded: bool,
    cells: Vec<Cell>,
}

pub struct TableRenderer {
    env: Environment<'static>,
    charts_dir: PathBuf,
}

impl TableRenderer {
    pub fn new(charts_dir: impl Into<PathBuf>) -> Result<Self, TableImageError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env.add_template("table.svg", include_str!("../../templates/table.svg.j2"))?;
        Ok(Self {
            env,
            charts_dir: charts_dir.into(),
        })
    }

    /// Writes `table_<uuid>.svg` and returns the `TABLE:charts/<file>` sentinel.
    pub fn render(&self, rows: &[ResultRow]) -> Result<String, TableImageError> {
        let svg = self.render_svg(rows)?;
        std::fs::create_dir_all(&self.charts_dir)?;

        let file_name = format!("table_{}.svg", uuid::Uuid::new_v4());
        let path = self.charts_dir.join(&file_name);
        std::fs::write(&path, svg)?;
        info!("Rendered {} rows to {}", rows.len(), path.display());

        Ok(format!("TABLE:charts/{}", file_name))
    }

    pub fn render_svg(&self, rows: &[ResultRow]) -> Result<String, TableImageError> {
        let header = header_for(rows);
        let body: Vec<Vec<(String, bool)>> = rows
            .iter()
            .map(|row| {
                row.cells()
                    .iter()
                    .map(|c| (display_cell(c), c.is_numeric()))
                    .collect()
            })
            .collect();

        let columns = body.iter().map(Vec::len).chain(std::iter::once(header.len())).max().unwrap_or(0);
        let mut widths = vec![0usize; columns];
        for (i, h) in header.iter().enumerate() {
            widths[i] = widths[i].max(h.chars().count());
        }
        for row in &body {
            for (i, (text, _)) in row.iter().enumerate() {
                widths[i] = widths[i].max(text.chars().count());
            }
        }
        let widths: Vec<usize> = widths.iter().map(|w| w * CHAR_WIDTH + 2 * PADDING).collect();
        let starts: Vec<usize> = widths
            .iter()
            .scan(0, |acc, w| {
                let start = *acc;
                *acc += w;
                Some(start)
            })
            .collect();

        let header_cells: Vec<Cell> = header
            .iter()
            .enumerate()
            .map(|(i, text)| Cell {
                x: starts[i] + PADDING,
                text: text.to_string(),
                numeric: false,
            })
            .collect();

        let offset = if header_cells.is_empty() { 0 } else { ROW_HEIGHT };
        let rendered_rows: Vec<Row> = body
            .into_iter()
            .enumerate()
            .map(|(r, cells)| Row {
                y: offset + r * ROW_HEIGHT,
                shaded: r % 2 == 1,
                cells: cells
                    .into_iter()
                    .enumerate()
                    .map(|(i, (text, numeric))| Cell {
                        x: if numeric {
                            starts[i] + widths[i] - PADDING
                        } else {
                            starts[i] + PADDING
                        },
                        text,
                        numeric,
                    })
                    .collect(),
            })
            .collect();

        let width = widths.iter().sum::<usize>().max(2 * PADDING);
        let height = offset + rows.len() * ROW_HEIGHT;
        let template = self.env.get_template("table.svg")?;
        Ok(template.render(context! {
            width => width,
            height => height.max(ROW_HEIGHT),
            row_height => ROW_HEIGHT,
            text_offset => ROW_HEIGHT * 2 / 3,
            header => header_cells,
            rows => rendered_rows,
        })?)
    }
}

fn header_for(rows: &[ResultRow]) -> Vec<&'static str> {
    match rows.first() {
        Some(ResultRow::Customer { .. }) => vec!["First name", "Last name", "Total"],
        Some(ResultRow::Product { .. }) => vec!["Name", "Category", "Value"],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::values::Scalar;

    fn products(n: usize) -> Vec<ResultRow> {
        (0..n)
            .map(|i| ResultRow::Product {
                name: format!("Item <{}>", i),
                category: "Home & Garden".to_string(),
                value: Scalar::Float(1000.0 * i as f64),
            })
            .collect()
    }

    #[test]
    fn svg_escapes_text_and_formats_numbers() {
        let renderer = TableRenderer::new(std::env::temp_dir()).unwrap();
        let svg = renderer.render_svg(&products(6)).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Item &lt;5&gt;"));
        assert!(svg.contains("Home &amp; Garden"));
        assert!(svg.contains("5,000.00"));
        assert!(svg.contains(">Category<"));
    }

    #[test]
    fn render_writes_file_and_returns_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = TableRenderer::new(dir.path().join("charts")).unwrap();
        let sentinel = renderer.render(&products(7)).unwrap();

        let file = sentinel.strip_prefix("TABLE:charts/").unwrap();
        assert!(file.starts_with("table_") && file.ends_with(".svg"));
        assert!(dir.path().join("charts").join(file).exists());
    }
}
