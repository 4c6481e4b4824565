//! Reading modules from their CSV sources.
//!
//! Every record has at least three fields; the first selects its role:
//!
//! | first field   | meaning |
//! |---------------|---------|
//! | `!END`        | end of module, the rest of the file is ignored |
//! | `#...`        | comment |
//! | `]]...`       | description of the next table |
//! | `]name`       | table header: `]name,Class,overlay` |
//! | `*`           | column header, starts the rows of the pending table |
//! | `\|`          | data row of the current table |

use std::env;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use csv::StringRecord;
use thiserror::Error;

use crate::error::{CellError, Location};
use crate::module::{self, Module, ModuleBuilder};
use crate::parser::parse_cell;
use crate::table::{TableBuilder, TableClass, TableSchema};

/// Environment variable naming the module search path.
pub const MODS_ENV: &str = "PSYSEX_MODS";

#[derive(Clone, Debug)]
pub struct LoadOptions {
    /// Directory module names are resolved against.
    pub search_path: PathBuf,
    pub delimiter: u8,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            search_path: PathBuf::from("."),
            delimiter: b',',
        }
    }
}

impl LoadOptions {
    /// Defaults, with the search path taken from `PSYSEX_MODS` when set.
    pub fn from_env() -> Self {
        let mut options = Self::default();
        if let Some(path) = env::var_os(MODS_ENV).filter(|p| !p.is_empty()) {
            options.search_path = PathBuf::from(path);
        }
        options
    }

    /// Module name and source path for `name`.
    ///
    /// Dotted names map to directories (`roland.jv1080` is
    /// `roland/jv1080.csv`); names ending in `.csv` are paths and the module
    /// is named after them the other way round.
    pub fn resolve(&self, name: &str) -> (String, PathBuf) {
        if let Some(stem) = name.strip_suffix(".csv") {
            let dotted = Path::new(stem)
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(".");
            return (dotted, self.search_path.join(name));
        }
        let mut path = self.search_path.clone();
        for part in name.split('.') {
            path.push(part);
        }
        path.set_extension("csv");
        (name.to_string(), path)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module {module}: cannot read {}: {source}", path.display())]
    Io {
        module: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("module {module}: csv parse error at line {line}: {reason}")]
    Parse {
        module: String,
        line: u64,
        reason: String,
    },
    #[error(transparent)]
    Cell(#[from] CellError),
}

/// Load `name` from the search path and register it. A module that is
/// already registered is returned as is.
pub fn load_module(name: &str, options: &LoadOptions) -> Result<Arc<Module>, LoadError> {
    let (module_name, path) = options.resolve(name);
    if let Ok(module) = module::lookup(&module_name) {
        log::debug!("module {module_name} already loaded");
        return Ok(module);
    }
    let file = File::open(&path).map_err(|source| LoadError::Io {
        module: module_name.clone(),
        path: path.clone(),
        source,
    })?;
    log::debug!("loading module {module_name} from {}", path.display());
    let module = read_module(&module_name, file, options)?;
    Ok(module::register(module)?)
}

/// Parse a module source without registering it.
pub fn read_module<R: Read>(
    name: &str,
    reader: R,
    options: &LoadOptions,
) -> Result<Arc<Module>, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut loader = Loader::new(name);
    let mut record = StringRecord::new();
    loop {
        let more = csv_reader
            .read_record(&mut record)
            .map_err(|err| map_csv_error(name, err))?;
        if !more {
            break;
        }
        let line = record.position().map_or(0, |p| p.line()) as usize;
        if !loader.feed(line, &record)? {
            break;
        }
    }
    Ok(loader.finish()?)
}

fn map_csv_error(module: &str, err: csv::Error) -> LoadError {
    let reason = err.to_string();
    let line = err.position().map_or(0, |p| p.line());
    match err.into_kind() {
        csv::ErrorKind::Io(source) => LoadError::Io {
            module: module.to_string(),
            path: PathBuf::new(),
            source,
        },
        _ => LoadError::Parse {
            module: module.to_string(),
            line,
            reason,
        },
    }
}

struct TableHeader {
    loc: Location,
    name: String,
    class: TableClass,
    overlay: crate::ast::Cell,
}

/// Record-at-a-time module reader.
struct Loader {
    module: ModuleBuilder,
    header: Option<TableHeader>,
    description: Option<String>,
    current: Option<TableBuilder>,
}

impl Loader {
    fn new(name: &str) -> Self {
        Self {
            module: ModuleBuilder::new(name),
            header: None,
            description: None,
            current: None,
        }
    }

    fn loc(&self, line: usize, column: usize) -> Location {
        Location::new(self.module.name(), line, column)
    }

    /// Handle one record; `false` at the end marker.
    fn feed(&mut self, line: usize, record: &StringRecord) -> Result<bool, CellError> {
        let first = record.get(0).unwrap_or("").trim();

        if first.starts_with('#') {
            return Ok(true);
        }
        if first.starts_with('|') {
            let Some(table) = self.current.as_mut() else {
                return Err(CellError::metadata(
                    &self.loc(line, 1),
                    "missing table header",
                ));
            };
            let fields: Vec<&str> = record.iter().skip(1).collect();
            table.push_row(line, &fields)?;
            return Ok(true);
        }

        if record.len() < 3 {
            return Err(CellError::metadata(
                &self.loc(line, 1),
                "row has fewer than 3 columns",
            ));
        }
        if first.starts_with("!END") {
            return Ok(false);
        }

        if let Some(text) = first.strip_prefix("]]") {
            let description = std::iter::once(text)
                .chain(record.iter().skip(1))
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            self.description = Some(description);
            return Ok(true);
        }

        if let Some(name) = first.strip_prefix(']') {
            self.close_table()?;
            self.header = Some(self.table_header(line, name, record)?);
            return Ok(true);
        }

        if first.starts_with('*') {
            self.close_table()?;
            let Some(header) = self.header.take() else {
                return Err(CellError::metadata(
                    &self.loc(line, 1),
                    "\"*\" but no table header",
                ));
            };
            let headers: Vec<&str> = record.iter().skip(1).collect();
            let schema = TableSchema::bind(&self.loc(line, 1).in_table(header.name.clone()), &headers)?;
            let mut table = TableBuilder::new(&header.loc, header.name, header.class, schema)
                .with_overlay(header.overlay);
            if let Some(description) = self.description.take() {
                table = table.with_description(description);
            }
            self.current = Some(table);
            return Ok(true);
        }

        log::debug!(
            "{}: skipping record starting with `{first}`",
            self.loc(line, 1)
        );
        self.close_table()?;
        Ok(true)
    }

    fn table_header(
        &self,
        line: usize,
        name: &str,
        record: &StringRecord,
    ) -> Result<TableHeader, CellError> {
        let name = name.trim();
        let class = record.get(1).unwrap_or("").trim();
        let overlay = record.get(2).unwrap_or("").trim();
        if name.is_empty() {
            return Err(CellError::metadata(&self.loc(line, 1), "missing table name"));
        }
        if class.is_empty() {
            return Err(CellError::metadata(&self.loc(line, 2), "missing table class"));
        }
        if overlay.is_empty() {
            return Err(CellError::metadata(&self.loc(line, 3), "missing table overlay"));
        }
        let class = class
            .parse::<TableClass>()
            .map_err(|message| CellError::metadata(&self.loc(line, 2), message))?;
        let overlay = parse_cell(&self.loc(line, 3).in_table(name), overlay)?;
        Ok(TableHeader {
            loc: self.loc(line, 0),
            name: name.to_string(),
            class,
            overlay,
        })
    }

    fn close_table(&mut self) -> Result<(), CellError> {
        if let Some(table) = self.current.take() {
            self.module.add_table(table)?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Arc<Module>, CellError> {
        self.close_table()?;
        if let Some(header) = self.header {
            log::warn!("{}: table {} has no column header", header.loc, header.name);
        }
        Ok(self.module.build())
    }
}
