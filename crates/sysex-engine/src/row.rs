use std::fmt;
use std::sync::{Arc, Weak};

use crate::ast::Cell;
use crate::error::{CellError, CellResult};
use crate::eval::Scope;
use crate::table::Table;
use crate::value::{Symbols, Value};

/// Column that restricts which request engines may select a row.
pub const ENGINE_COLUMN: &str = "engine";

/// One data row: a parsed cell per logical column, in column order.
pub struct Row {
    line: usize,
    module_name: String,
    table_name: String,
    table: Weak<Table>,
    cells: Vec<(String, Cell)>,
    key: Option<Value>,
}

impl Row {
    pub(crate) fn new(
        line: usize,
        module_name: String,
        table_name: String,
        table: Weak<Table>,
        cells: Vec<(String, Cell)>,
        key: Option<Value>,
    ) -> Self {
        Self {
            line,
            module_name,
            table_name,
            table,
            cells,
            key,
        }
    }

    /// Source line the row was read from.
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn table(&self) -> Option<Arc<Table>> {
        self.table.upgrade()
    }

    /// The unevaluated cell of `column`.
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells
            .iter()
            .find_map(|(name, cell)| (name == column).then_some(cell))
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.cells.iter().map(|(name, cell)| (name.as_str(), cell))
    }

    /// Cached value of the key cell, if the table has a key column.
    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    /// Evaluate `column` on behalf of this row.
    pub fn evaluate(
        self: &Arc<Self>,
        column: &str,
        arg: Option<&Value>,
        symbols: &Symbols,
    ) -> CellResult<Value> {
        let cell = self.get(column).ok_or_else(|| {
            CellError::lookup(
                "column",
                column,
                "not found",
                format!("{} {} {}", self.module_name, self.table_name, self.line),
            )
        })?;
        cell.evaluate_in(Scope::row(self), arg, symbols)
    }

    /// Evaluate `column` with no call argument; a missing column is absent.
    pub fn value(self: &Arc<Self>, column: &str) -> CellResult<Value> {
        if self.get(column).is_none() {
            return Ok(Value::Absent);
        }
        self.evaluate(column, None, &Symbols::new())
    }

    /// Whether a request for `engine` may select this row.
    ///
    /// Rows without an engine value accept every request, as does a request
    /// with no engine. Otherwise the request engine, cut at its first `.`,
    /// must appear in the row's engine value.
    pub fn in_engine(self: &Arc<Self>, engine: Option<&str>) -> CellResult<bool> {
        let Some(engine) = engine else {
            return Ok(true);
        };
        let accepted = self.value(ENGINE_COLUMN)?;
        if matches!(accepted, Value::Absent) {
            return Ok(true);
        }
        let family = engine.split('.').next().unwrap_or(engine);
        Ok(accepted.contains_text(family))
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("table", &self.table_name)
            .field("line", &self.line)
            .field("cells", &self.cells)
            .finish()
    }
}

/// A named column of a specific row, produced by a `$` reference and not
/// yet evaluated.
#[derive(Clone)]
pub struct CellRef {
    row: Arc<Row>,
    column: String,
}

impl CellRef {
    pub(crate) fn new(row: Arc<Row>, column: String) -> Self {
        Self { row, column }
    }

    pub fn row(&self) -> &Arc<Row> {
        &self.row
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn cell(&self) -> Option<&Cell> {
        self.row.get(&self.column)
    }

    pub fn evaluate(&self, arg: Option<&Value>, symbols: &Symbols) -> CellResult<Value> {
        self.row.evaluate(&self.column, arg, symbols)
    }
}

impl PartialEq for CellRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.row, &other.row) && self.column == other.column
    }
}
