use crate::db::values::Scalar;

/// One answer row, tagged by what it describes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultRow {
    Customer {
        first_name: String,
        last_name: String,
        total: Scalar,
    },
    Product {
        name: String,
        category: String,
        value: Scalar,
    },
    Generic(Vec<Scalar>),
}

impl ResultRow {
    /// Cells in display order, for tabular rendering.
    pub fn cells(&self) -> Vec<Scalar> {
        match self {
            ResultRow::Customer {
                first_name,
                last_name,
                total,
            } => vec![
                Scalar::Text(first_name.clone()),
                Scalar::Text(last_name.clone()),
                total.clone(),
            ],
            ResultRow::Product {
                name,
                category,
                value,
            } => vec![
                Scalar::Text(name.clone()),
                Scalar::Text(category.clone()),
                value.clone(),
            ],
            ResultRow::Generic(cells) => cells.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RowShape {
    Customer { first: usize, last: usize, total: usize },
    Product { name: usize, category: usize, value: usize },
    Generic,
}

impl RowShape {
    fn detect(columns: &[String]) -> Self {
        let lowered: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
        let position = |needle: &str| lowered.iter().position(|c| c.contains(needle));
        let Some(last_col) = lowered.len().checked_sub(1) else {
            return RowShape::Generic;
        };

        if let (Some(first), Some(last)) = (position("first_name"), position("last_name")) {
            if last_col != first && last_col != last {
                return RowShape::Customer {
                    first,
                    last,
                    total: last_col,
                };
            }
        }

        let name = position("product_name").or_else(|| lowered.iter().position(|c| c == "name"));
        if let (Some(name), Some(category)) = (name, position("category")) {
            if last_col != name && last_col != category {
                return RowShape::Product {
                    name,
                    category,
                    value: last_col,
                };
            }
        }

        RowShape::Generic
    }

    fn apply(&self, cells: Vec<Scalar>) -> ResultRow {
        match *self {
            RowShape::Customer { first, last, total } if cells.len() > total && cells[total].is_numeric() => {
                ResultRow::Customer {
                    first_name: text_of(&cells[first]),
                    last_name: text_of(&cells[last]),
                    total: cells[total].clone(),
                }
            }
            RowShape::Product {
                name,
                category,
                value,
            } if cells.len() > value && cells[value].is_numeric() => ResultRow::Product {
                name: text_of(&cells[name]),
                category: text_of(&cells[category]),
                value: cells[value].clone(),
            },
            _ => ResultRow::Generic(cells),
        }
    }
}

fn text_of(value: &Scalar) -> String {
    match value {
        Scalar::Text(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tags raw rows using the column names of the statement that produced them.
/// Rows that do not fit the detected shape stay generic.
pub fn tag_rows(columns: &[String], rows: Vec<Vec<Scalar>>) -> Vec<ResultRow> {
    let shape = RowShape::detect(columns);
    rows.into_iter()
        .map(|cells| {
            if cells.len() == columns.len() {
                shape.apply(cells)
            } else {
                ResultRow::Generic(cells)
            }
        })
        .collect()
}
