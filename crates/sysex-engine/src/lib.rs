//! `sysex-engine` models a device's MIDI System Exclusive protocol as a set of
//! cross-referencing tables whose cells hold small Lisp-like expressions.
//!
//! Cells are parsed once when a module is loaded and evaluated lazily:
//! - scalars, `a;b;c` lists and `a..b` ranges
//! - operators `(+ ...)`, `(& ...)`, `(<< ...)`, hex literals `(#41 10)`,
//!   string paste `(% ...)`
//! - references to modules `(! m)`, tables `(] t)`, rows `(@ t r)`, columns
//!   `($ r c)` and decode symbols `(: name)`
//! - match expressions `(= count dest ...)` that decode a byte buffer into a
//!   symbol table
//!
//! Modules are read from CSV sources (see [`import`]) and registered in a
//! process-wide registry through which `(! name)` resolves.

mod ast;
mod classes;
mod decode;
mod error;
mod eval;
pub mod import;
mod lexer;
pub mod module;
mod parser;
mod row;
mod table;
mod value;

pub use ast::{Cell, CellKind, OpKind, RefKind};
pub use classes::{mma_id_len, sniffers};
pub use error::{CellError, CellResult, Location};
pub use eval::{Scope, DEFAULT_IDENT};
pub use import::{load_module, read_module, LoadError, LoadOptions};
pub use module::{lookup, register, Module, ModuleBuilder};
pub use parser::{encast, parse_cell};
pub use row::{CellRef, Row, ENGINE_COLUMN};
pub use table::{TableBuilder, Table, TableClass, TableSchema, MAX_OVERLAY_DEPTH};
pub use value::{Symbols, Value};
