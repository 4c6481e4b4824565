use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use crate::ast::{Cell, CellKind};
use crate::error::{CellError, CellResult, Location};
use crate::eval::{Scope, DEFAULT_IDENT};
use crate::module::Module;
use crate::parser::parse_cell;
use crate::row::Row;
use crate::value::{Symbols, Value};

/// Overlay chains longer than this are treated as cycles.
pub const MAX_OVERLAY_DEPTH: usize = 32;

/// The fixed set of table classes a module source may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableClass {
    Ctrl,
    Device,
    Drum,
    Choice,
    Fm,
    Fx,
    Header,
    Io,
    Kb,
    Key,
    Proto,
    MemoryMap,
    Param,
    Seq,
    Tg,
    Toc,
    Value,
    Vendor,
}

impl TableClass {
    pub const ALL: [TableClass; 18] = [
        TableClass::Ctrl,
        TableClass::Device,
        TableClass::Drum,
        TableClass::Choice,
        TableClass::Fm,
        TableClass::Fx,
        TableClass::Header,
        TableClass::Io,
        TableClass::Kb,
        TableClass::Key,
        TableClass::Proto,
        TableClass::MemoryMap,
        TableClass::Param,
        TableClass::Seq,
        TableClass::Tg,
        TableClass::Toc,
        TableClass::Value,
        TableClass::Vendor,
    ];

    /// Name used in module sources.
    pub fn name(self) -> &'static str {
        match self {
            TableClass::Ctrl => "CTRLTable",
            TableClass::Device => "DeviceTable",
            TableClass::Drum => "DrumTable",
            TableClass::Choice => "ChoiceTable",
            TableClass::Fm => "FMTable",
            TableClass::Fx => "FXTable",
            TableClass::Header => "HeaderTable",
            TableClass::Io => "IOTable",
            TableClass::Kb => "KBTable",
            TableClass::Key => "KeyTable",
            TableClass::Proto => "ProtoTable",
            TableClass::MemoryMap => "MemoryMap",
            TableClass::Param => "ParamTable",
            TableClass::Seq => "SeqTable",
            TableClass::Tg => "TGTable",
            TableClass::Toc => "TOC",
            TableClass::Value => "ValueTable",
            TableClass::Vendor => "VendorTable",
        }
    }
}

impl fmt::Display for TableClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TableClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TableClass::ALL
            .into_iter()
            .find(|class| class.name() == s)
            .ok_or_else(|| format!("unknown table class `{s}`"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnSpec {
    Padding,
    Data(String),
}

/// Column roles bound from a table's column header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
    identity: Option<String>,
    key: Option<String>,
    ellipsis: Option<String>,
}

impl TableSchema {
    /// Bind column header tokens.
    ///
    /// `-x` is padding, `@x` the identity column, `*x` the key column, and
    /// `x...` the ellipsis column, which must come last. An empty or `#`
    /// header ends the list.
    pub fn bind<S: AsRef<str>>(loc: &Location, headers: &[S]) -> CellResult<Self> {
        let mut schema = TableSchema {
            columns: Vec::new(),
            identity: None,
            key: None,
            ellipsis: None,
        };

        for (nth, header) in headers.iter().enumerate() {
            let header = header.as_ref().trim();
            let loc = Location {
                column: nth + 1,
                ..loc.clone()
            };
            if header.is_empty() || header.starts_with('#') {
                break;
            }
            if header.starts_with('-') {
                schema.columns.push(ColumnSpec::Padding);
                continue;
            }
            if let Some(previous) = &schema.ellipsis {
                return Err(CellError::syntax(
                    &loc,
                    format!("ellipsis column `{previous}` must be the last column"),
                ));
            }

            let name = if let Some(name) = header.strip_prefix('@') {
                claim_role(&loc, &mut schema.identity, name, "identity")?;
                name
            } else if let Some(name) = header.strip_prefix('*') {
                claim_role(&loc, &mut schema.key, name, "key")?;
                name
            } else if let Some(name) = header.strip_suffix("...") {
                schema.ellipsis = Some(name.to_string());
                name
            } else {
                header
            };

            if name.is_empty() {
                return Err(CellError::syntax(&loc, format!("empty column id in `{header}`")));
            }
            if schema.data_columns().any(|existing| existing == name) {
                return Err(CellError::uniqueness(
                    &loc,
                    format!("duplicate column id `{name}`"),
                ));
            }
            schema.columns.push(ColumnSpec::Data(name.to_string()));
        }

        Ok(schema)
    }

    /// Logical (non-padding) column ids in order.
    pub fn data_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter_map(|column| match column {
            ColumnSpec::Data(name) => Some(name.as_str()),
            ColumnSpec::Padding => None,
        })
    }

    pub fn identity_column(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn key_column(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn ellipsis_column(&self) -> Option<&str> {
        self.ellipsis.as_deref()
    }

    /// Physical column count, padding included.
    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

fn claim_role(
    loc: &Location,
    slot: &mut Option<String>,
    name: &str,
    role: &str,
) -> CellResult<()> {
    if let Some(existing) = slot {
        return Err(CellError::uniqueness(
            loc,
            format!("{existing} and {name} cannot both be {role} columns"),
        ));
    }
    *slot = Some(name.to_string());
    Ok(())
}

struct PendingRow {
    line: usize,
    cells: Vec<(String, Cell)>,
    key: Option<Value>,
}

/// Collects a table's rows during load.
pub struct TableBuilder {
    loc: Location,
    name: String,
    class: TableClass,
    description: Option<String>,
    overlay: Option<Cell>,
    schema: TableSchema,
    rows: Vec<PendingRow>,
    key_index: HashMap<Value, usize>,
}

impl TableBuilder {
    /// `loc` is the location of the table header; a `TOC` table is always
    /// named `TOC`.
    pub fn new(
        loc: &Location,
        name: impl Into<String>,
        class: TableClass,
        schema: TableSchema,
    ) -> Self {
        let name = if class == TableClass::Toc {
            TableClass::Toc.name().to_string()
        } else {
            name.into()
        };
        Self {
            loc: loc.clone().in_table(name.clone()),
            name,
            class,
            description: None,
            overlay: None,
            schema,
            rows: Vec::new(),
            key_index: HashMap::new(),
        }
    }

    /// An absent overlay cell means no overlay.
    pub fn with_overlay(mut self, overlay: Cell) -> Self {
        self.overlay = (!overlay.is_absent()).then_some(overlay);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Parse one row of raw cell text read from source line `line`.
    pub fn push_row<S: AsRef<str>>(&mut self, line: usize, fields: &[S]) -> CellResult<()> {
        let mut cells = Vec::new();
        let mut consumed = self.schema.columns.len();

        for (nth, column) in self.schema.columns.iter().enumerate() {
            let ColumnSpec::Data(name) = column else {
                continue;
            };
            let loc = Location {
                row: line,
                column: nth + 1,
                arg: None,
                ..self.loc.clone()
            };

            if self.schema.ellipsis.as_deref() == Some(name.as_str()) {
                let mut items = Vec::new();
                for (jth, field) in fields.iter().enumerate().skip(nth) {
                    let field = field.as_ref();
                    if field.trim().is_empty() {
                        continue;
                    }
                    items.push(parse_cell(&loc.with_arg(jth - nth), field)?);
                }
                cells.push((name.clone(), Cell::new(loc, CellKind::List(items))));
                consumed = fields.len().max(consumed);
                break;
            }

            let text = fields.get(nth).map(|field| field.as_ref()).unwrap_or("");
            cells.push((name.clone(), parse_cell(&loc, text)?));
        }

        if fields
            .iter()
            .skip(consumed)
            .any(|field| !field.as_ref().trim().is_empty())
        {
            log::warn!(
                "{}:{line}: {} cells for {} columns, extra cells ignored",
                self.loc,
                fields.len(),
                consumed
            );
        }

        let key = match self.schema.key.as_deref() {
            Some(column) => {
                let cell = cells
                    .iter()
                    .find_map(|(name, cell)| (name == column).then_some(cell))
                    .ok_or_else(|| {
                        CellError::metadata(&self.loc, format!("key column `{column}` has no cells"))
                    })?;
                let key = cell.evaluate(None, &Symbols::new())?;
                if self.key_index.contains_key(&key) {
                    return Err(CellError::uniqueness(
                        cell.location(),
                        format!(
                            "table {}: duplicate value {key} for key {column}",
                            self.name
                        ),
                    ));
                }
                self.key_index.insert(key.clone(), self.rows.len());
                Some(key)
            }
            None => None,
        };

        self.rows.push(PendingRow { line, cells, key });
        Ok(())
    }

    /// Freeze the table outside of any module.
    pub fn build(self) -> Arc<Table> {
        self.build_in(Weak::new())
    }

    pub(crate) fn build_in(self, module: Weak<Module>) -> Arc<Table> {
        log::debug!(
            "built {} {} with {} rows",
            self.class,
            self.loc,
            self.rows.len()
        );
        let module_name = self.loc.module.clone();
        let name = self.name;
        Arc::new_cyclic(|this: &Weak<Table>| {
            let rows = self
                .rows
                .into_iter()
                .map(|pending| {
                    Arc::new(Row::new(
                        pending.line,
                        module_name.clone(),
                        name.clone(),
                        this.clone(),
                        pending.cells,
                        pending.key,
                    ))
                })
                .collect();
            Table {
                loc: self.loc,
                name,
                module_name,
                class: self.class,
                description: self.description,
                overlay: self.overlay,
                schema: self.schema,
                rows,
                key_index: self.key_index,
                module,
                this: this.clone(),
            }
        })
    }
}

/// An immutable table of rows.
pub struct Table {
    loc: Location,
    name: String,
    module_name: String,
    class: TableClass,
    description: Option<String>,
    overlay: Option<Cell>,
    schema: TableSchema,
    rows: Vec<Arc<Row>>,
    key_index: HashMap<Value, usize>,
    module: Weak<Module>,
    this: Weak<Table>,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Location of the table header.
    pub fn location(&self) -> &Location {
        &self.loc
    }

    pub fn class(&self) -> TableClass {
        self.class
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn overlay(&self) -> Option<&Cell> {
        self.overlay.as_ref()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn identity_column(&self) -> Option<&str> {
        self.schema.identity_column()
    }

    pub fn key_column(&self) -> Option<&str> {
        self.schema.key_column()
    }

    pub fn rows(&self) -> &[Arc<Row>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The owning module, if the table was built as part of one.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// A shared handle to this table.
    pub fn handle(&self) -> Option<Arc<Table>> {
        self.this.upgrade()
    }

    /// Rows whose `column` (default: the identity column, else `ident`)
    /// equals `rowid` and that accept `engine`.
    ///
    /// Without an explicit column a key-index hit wins outright. When nothing
    /// matches locally the lookup continues in the overlay table.
    pub fn get_rows(
        &self,
        rowid: &Value,
        engine: Option<&str>,
        column: Option<&str>,
        first: bool,
    ) -> CellResult<Vec<Arc<Row>>> {
        self.find_rows(rowid, engine, column, first, 0)
    }

    /// The single row matching `rowid`; more than one match is an error.
    pub fn get_one_row(
        &self,
        rowid: &Value,
        engine: Option<&str>,
        column: Option<&str>,
    ) -> CellResult<Arc<Row>> {
        let mut rows = self.get_rows(rowid, engine, column, false)?;
        if rows.len() > 1 {
            return Err(CellError::uniqueness(
                &self.loc,
                format!(
                    "{} rows match {}",
                    rows.len(),
                    lookup_params(rowid, engine, column)
                ),
            ));
        }
        rows.pop().ok_or_else(|| {
            CellError::lookup(
                "row",
                self.name.clone(),
                "no values found",
                lookup_params(rowid, engine, column),
            )
        })
    }

    fn find_rows(
        &self,
        rowid: &Value,
        engine: Option<&str>,
        column: Option<&str>,
        first: bool,
        depth: usize,
    ) -> CellResult<Vec<Arc<Row>>> {
        if column.is_none() {
            if let Some(&index) = self.key_index.get(rowid) {
                return Ok(vec![self.rows[index].clone()]);
            }
        }

        let column = column
            .or(self.schema.identity_column())
            .unwrap_or(DEFAULT_IDENT);

        let mut rows = Vec::new();
        for row in &self.rows {
            if row.get(column).is_none() {
                continue;
            }
            if row.value(column)? == *rowid && row.in_engine(engine)? {
                rows.push(row.clone());
                if first {
                    break;
                }
            }
        }
        if !rows.is_empty() {
            return Ok(rows);
        }

        match self.parent()? {
            Some(parent) => {
                if depth >= MAX_OVERLAY_DEPTH {
                    return Err(CellError::lookup(
                        "table",
                        self.name.clone(),
                        "overlay chain too deep",
                        lookup_params(rowid, engine, Some(column)),
                    ));
                }
                log::trace!("{}: {rowid} not found, trying overlay {}", self.loc, parent.name());
                parent.find_rows(rowid, engine, Some(column), first, depth + 1)
            }
            None => Err(CellError::lookup(
                "row",
                self.name.clone(),
                "no values found",
                lookup_params(rowid, engine, Some(column)),
            )),
        }
    }

    /// Evaluate the overlay cell; an absent result means no parent.
    fn parent(&self) -> CellResult<Option<Arc<Table>>> {
        let Some(overlay) = &self.overlay else {
            return Ok(None);
        };
        match overlay.evaluate_in(Scope::table(self), None, &Symbols::new())? {
            Value::Table(table) => Ok(Some(table)),
            Value::Absent => Ok(None),
            other => Err(CellError::type_error(
                overlay.location(),
                format!("overlay must name a table, got {} `{other}`", other.type_name()),
            )),
        }
    }
}

fn lookup_params(rowid: &Value, engine: Option<&str>, column: Option<&str>) -> String {
    format!(
        "({rowid}, {}, {})",
        engine.unwrap_or("none"),
        column.unwrap_or("none")
    )
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("module", &self.module_name)
            .field("class", &self.class)
            .field("rows", &self.rows.len())
            .finish()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Table {} ({})", self.name, self.class)?;
        if let Some(description) = &self.description {
            writeln!(f, "    {description}")?;
        }
        let columns: Vec<&str> = self.schema.data_columns().collect();
        writeln!(f, "    Columns: {}", columns.join(", "))?;
        writeln!(f, "    Key: {}", self.key_column().unwrap_or("none"))?;
        writeln!(f, "    Ident: {}", self.identity_column().unwrap_or("none"))?;
        if let Some(overlay) = &self.overlay {
            writeln!(f, "    Overlay: {overlay}")?;
        }
        for row in &self.rows {
            write!(f, "     ")?;
            for (_, cell) in row.columns() {
                write!(f, " | {cell}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
