//! Lazy evaluation of parsed cells.
//!
//! Evaluation is call-by-need: a cell is only evaluated when a caller asks
//! for its value, with an optional call argument and the symbol table of the
//! current decode. Reference cells additionally need a [`Scope`] naming the
//! row (or table) that owns them.

use std::sync::Arc;

use sysex_codec::{add_address, MIDI_BITS};

use crate::ast::{Cell, CellKind, OpKind, RefKind};
use crate::error::{CellError, CellResult, Location};
use crate::module::{self, Module};
use crate::row::{CellRef, Row};
use crate::table::Table;
use crate::value::{Symbols, Value};

/// Column consulted for `@` and for lookups when a table has no identity column.
pub const DEFAULT_IDENT: &str = "ident";

/// The owner of the cell being evaluated.
#[derive(Clone, Copy, Default)]
pub struct Scope<'a> {
    row: Option<&'a Arc<Row>>,
    table: Option<&'a Table>,
}

impl<'a> Scope<'a> {
    /// Evaluate on behalf of a row; its table and module are implied.
    pub fn row(row: &'a Arc<Row>) -> Self {
        Self {
            row: Some(row),
            table: None,
        }
    }

    /// Evaluate on behalf of a table (used for overlay cells).
    pub fn table(table: &'a Table) -> Self {
        Self {
            row: None,
            table: Some(table),
        }
    }

    fn current_row(&self, loc: &Location) -> CellResult<&'a Arc<Row>> {
        self.row.ok_or_else(|| {
            CellError::lookup("row", "<current>", "no current row", "").at(loc)
        })
    }

    fn current_table(&self, loc: &Location) -> CellResult<Arc<Table>> {
        if let Some(row) = self.row {
            if let Some(table) = row.table() {
                return Ok(table);
            }
        }
        if let Some(table) = self.table.and_then(Table::handle) {
            return Ok(table);
        }
        Err(CellError::lookup("table", "<current>", "no current table", "").at(loc))
    }

    fn current_module(&self, loc: &Location) -> CellResult<Arc<Module>> {
        let owned = self
            .row
            .and_then(|row| row.table())
            .and_then(|table| table.module())
            .or_else(|| self.table.and_then(Table::module));
        match owned {
            Some(module) => Ok(module),
            None => module::lookup(&loc.module),
        }
    }
}

impl Cell {
    /// Evaluate without an owning row.
    pub fn evaluate(&self, arg: Option<&Value>, symbols: &Symbols) -> CellResult<Value> {
        self.evaluate_in(Scope::default(), arg, symbols)
    }

    pub fn evaluate_in(
        &self,
        scope: Scope<'_>,
        arg: Option<&Value>,
        symbols: &Symbols,
    ) -> CellResult<Value> {
        let loc = self.location();
        match self.kind() {
            CellKind::Literal(value) => Ok(value.clone()),
            CellKind::CompactList(items) | CellKind::List(items) => {
                evaluate_all(items, scope, arg, symbols).map(Value::List)
            }
            CellKind::Range(start, end) => {
                let start = start.evaluate_in(scope, arg, symbols)?;
                let end = end.evaluate_in(scope, arg, symbols)?;
                match (&start, &end) {
                    (Value::Int(a), Value::Int(b)) => Ok(Value::Range(*a..*b)),
                    _ => Err(CellError::RangeType {
                        loc: loc.clone(),
                        start: start.to_string(),
                        end: end.to_string(),
                    }),
                }
            }
            CellKind::Hex(args) => {
                let mut values = evaluate_all(args, scope, arg, symbols)?;
                if values.len() == 1 {
                    Ok(values.remove(0))
                } else {
                    Ok(Value::List(values))
                }
            }
            CellKind::Op(op, args) => evaluate_op(loc, *op, args, scope, arg, symbols),
            CellKind::Ref(kind, args) => evaluate_ref(loc, *kind, args, scope, arg, symbols)
                .map_err(|err| err.at(loc)),
            CellKind::Match(_) => Err(CellError::type_error(
                loc,
                "match expressions are decoded against a byte buffer, not evaluated",
            )),
        }
    }
}

impl Cell {
    /// Offset the address held by a hex cell such as `(#01 00 7F)`, seven
    /// bits per byte. With `carry` a full byte spills into the next one.
    pub fn offset_address(&self, offset: &[u8], carry: bool) -> CellResult<Vec<u8>> {
        let loc = self.location();
        let CellKind::Hex(args) = self.kind() else {
            return Err(CellError::type_error(loc, format!("`{self}` is not a hex address")));
        };
        let address = args
            .iter()
            .map(|arg| match arg.evaluate(None, &Symbols::new())? {
                Value::Int(n) => u8::try_from(n).map_err(|_| {
                    CellError::type_error(arg.location(), format!("address byte {n} out of range"))
                }),
                other => Err(CellError::type_error(
                    arg.location(),
                    format!("address byte must be an integer, got `{other}`"),
                )),
            })
            .collect::<CellResult<Vec<u8>>>()?;
        add_address(&address, offset, MIDI_BITS, carry).map_err(|source| CellError::Codec {
            loc: loc.clone(),
            source,
        })
    }
}

fn evaluate_all(
    cells: &[Cell],
    scope: Scope<'_>,
    arg: Option<&Value>,
    symbols: &Symbols,
) -> CellResult<Vec<Value>> {
    cells
        .iter()
        .map(|cell| cell.evaluate_in(scope, arg, symbols))
        .collect()
}

fn evaluate_op(
    loc: &Location,
    op: OpKind,
    args: &[Cell],
    scope: Scope<'_>,
    arg: Option<&Value>,
    symbols: &Symbols,
) -> CellResult<Value> {
    let mut values = Vec::with_capacity(args.len());
    for cell in args {
        // Paste arguments that name a bound symbol take the symbol's value.
        if let (OpKind::Paste, CellKind::Literal(Value::Text(name))) = (op, cell.kind()) {
            if let Some(bound) = symbols.get(name) {
                values.push(bound.clone());
                continue;
            }
        }
        values.push(cell.evaluate_in(scope, arg, symbols)?);
    }

    if op == OpKind::Not {
        return match values.pop() {
            Some(last) => job(loc, op, Value::Absent, last),
            None => match arg {
                Some(arg) => job(loc, op, Value::Absent, arg.clone()),
                None => Err(CellError::Arity {
                    loc: loc.clone(),
                    message: "`~` needs an argument or a call argument".to_string(),
                }),
            },
        };
    }

    let mut values = values.into_iter();
    let Some(first) = values.next() else {
        return Err(CellError::Arity {
            loc: loc.clone(),
            message: format!("`{}` needs at least one argument", op.sigil()),
        });
    };

    if args.len() == 1 {
        return match arg {
            Some(arg) => job(loc, op, first, arg.clone()),
            None => Err(CellError::Arity {
                loc: loc.clone(),
                message: format!(
                    "`{}` with a single argument applies to the call argument, but none was given",
                    op.sigil()
                ),
            }),
        };
    }

    values.try_fold(first, |acc, value| job(loc, op, acc, value))
}

pub(crate) fn job(loc: &Location, op: OpKind, left: Value, right: Value) -> CellResult<Value> {
    match op {
        OpKind::Paste => Ok(Value::Text(format!("{left}{}", unescape(&right)))),
        OpKind::Add | OpKind::Mul | OpKind::Sub => arithmetic(loc, op, left, right),
        OpKind::And | OpKind::Or | OpKind::ShiftLeft | OpKind::ShiftRight | OpKind::Not => {
            bitwise(loc, op, left, right)
        }
    }
}

fn unescape(value: &Value) -> String {
    match value {
        Value::Text(s) if s == "%" => " ".to_string(),
        Value::Text(s) if s == "%%" => "%".to_string(),
        other => other.to_string(),
    }
}

enum Number {
    Int(i64),
    Float(f64),
}

fn number(loc: &Location, op: OpKind, value: &Value) -> CellResult<Number> {
    match value {
        Value::Int(n) => Ok(Number::Int(*n)),
        Value::Bool(b) => Ok(Number::Int(*b as i64)),
        Value::Float(n) => Ok(Number::Float(*n)),
        other => Err(CellError::type_error(
            loc,
            format!(
                "`{}` cannot take {} value `{other}`",
                op.sigil(),
                other.type_name()
            ),
        )),
    }
}

fn integer(loc: &Location, op: OpKind, value: &Value) -> CellResult<i64> {
    match number(loc, op, value)? {
        Number::Int(n) => Ok(n),
        Number::Float(n) => Err(CellError::type_error(
            loc,
            format!("`{}` needs integers, got {n}", op.sigil()),
        )),
    }
}

fn overflow(loc: &Location, op: OpKind, left: &Value, right: &Value) -> CellError {
    CellError::type_error(
        loc,
        format!("integer overflow in `{}` of {left} and {right}", op.sigil()),
    )
}

fn arithmetic(loc: &Location, op: OpKind, left: Value, right: Value) -> CellResult<Value> {
    match (number(loc, op, &left)?, number(loc, op, &right)?) {
        (Number::Int(a), Number::Int(b)) => {
            let result = match op {
                OpKind::Add => a.checked_add(b),
                OpKind::Mul => a.checked_mul(b),
                _ => a.checked_sub(b),
            };
            result
                .map(Value::Int)
                .ok_or_else(|| overflow(loc, op, &left, &right))
        }
        (a, b) => {
            let a = match a {
                Number::Int(n) => n as f64,
                Number::Float(n) => n,
            };
            let b = match b {
                Number::Int(n) => n as f64,
                Number::Float(n) => n,
            };
            Ok(Value::Float(match op {
                OpKind::Add => a + b,
                OpKind::Mul => a * b,
                _ => a - b,
            }))
        }
    }
}

fn bitwise(loc: &Location, op: OpKind, left: Value, right: Value) -> CellResult<Value> {
    if op == OpKind::Not {
        return Ok(Value::Int(!integer(loc, op, &right)?));
    }
    let a = integer(loc, op, &left)?;
    let b = integer(loc, op, &right)?;
    let result = match op {
        OpKind::And => a & b,
        OpKind::Or => a | b,
        // The first operand is the shift amount.
        OpKind::ShiftLeft | OpKind::ShiftRight => {
            let amount = u32::try_from(a)
                .ok()
                .filter(|amount| *amount < i64::BITS)
                .ok_or_else(|| overflow(loc, op, &left, &right))?;
            if op == OpKind::ShiftRight {
                b >> amount
            } else {
                let shifted = b << amount;
                if shifted >> amount != b {
                    return Err(overflow(loc, op, &left, &right));
                }
                shifted
            }
        }
        _ => unreachable!("arithmetic operators are handled separately"),
    };
    Ok(Value::Int(result))
}

fn name_of(value: &Value) -> String {
    value.to_string()
}

fn expect_args<'v>(
    loc: &Location,
    kind: RefKind,
    values: &'v [Value],
) -> CellResult<(&'v [Value], &'v Value)> {
    values.split_last().map(|(last, init)| (init, last)).ok_or_else(|| {
        CellError::Arity {
            loc: loc.clone(),
            message: format!("`{}` needs at least one name", kind.sigil()),
        }
    })
}

fn evaluate_ref(
    loc: &Location,
    kind: RefKind,
    args: &[Cell],
    scope: Scope<'_>,
    arg: Option<&Value>,
    symbols: &Symbols,
) -> CellResult<Value> {
    let values = evaluate_all(args, scope, arg, symbols)?;
    match kind {
        RefKind::Module => match values.as_slice() {
            [name] => module::lookup(&name_of(name)).map(Value::Module),
            _ => Err(CellError::Arity {
                loc: loc.clone(),
                message: format!("`!` takes one module name, got {}", values.len()),
            }),
        },
        RefKind::Table => resolve_table(loc, &values, scope).map(Value::Table),
        RefKind::Row => resolve_row(loc, &values, scope).map(Value::Row),
        RefKind::Column => {
            let (init, column) = expect_args(loc, kind, &values)?;
            let row = if init.is_empty() {
                scope.current_row(loc)?.clone()
            } else {
                resolve_row(loc, init, scope)?
            };
            let column = name_of(column);
            if row.get(&column).is_none() {
                return Err(CellError::lookup(
                    "column",
                    column,
                    "not found",
                    format!("{} {} {}", row.module_name(), row.table_name(), row.line()),
                ));
            }
            Ok(Value::Cell(CellRef::new(row, column)))
        }
        RefKind::Var => match values.as_slice() {
            [name] => {
                let name = name_of(name);
                symbols.get(&name).cloned().ok_or_else(|| {
                    CellError::lookup("symbol", name, "not defined", "")
                })
            }
            _ => Err(CellError::Arity {
                loc: loc.clone(),
                message: format!("`:` takes one symbol name, got {}", values.len()),
            }),
        },
    }
}

/// `[module] table`: a table of the named module, or of the current module.
fn resolve_table(loc: &Location, names: &[Value], scope: Scope<'_>) -> CellResult<Arc<Table>> {
    let (init, table) = expect_args(loc, RefKind::Table, names)?;
    let module = match init {
        [] => scope.current_module(loc)?,
        [.., module] => module::lookup(&name_of(module))?,
    };
    let table = name_of(table);
    module
        .table(&table)
        .ok_or_else(|| CellError::lookup("table", table, "not found", module.name().to_string()))
}

/// `[[module] table] row`: a row looked up in the named or current table.
fn resolve_row(loc: &Location, names: &[Value], scope: Scope<'_>) -> CellResult<Arc<Row>> {
    let (init, rowid) = expect_args(loc, RefKind::Row, names)?;
    let table = if init.is_empty() {
        scope.current_table(loc)?
    } else {
        resolve_table(loc, init, scope)?
    };

    let rowid = match rowid {
        Value::Text(s) if s == "@" => {
            let row = scope.current_row(loc)?;
            let column = row
                .table()
                .and_then(|t| t.identity_column().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_IDENT.to_string());
            row.evaluate(&column, None, &Symbols::new())?
        }
        Value::Text(s) if s == "*" => {
            let row = scope.current_row(loc)?;
            row.key().cloned().ok_or_else(|| {
                CellError::lookup("key", row.table_name(), "table has no key column", "")
            })?
        }
        other => other.clone(),
    };

    table.get_one_row(&rowid, None, None)
}
