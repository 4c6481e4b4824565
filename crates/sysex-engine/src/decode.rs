//! Match expressions: `(= bytecount dest [op] [match...])`.
//!
//! A match reads a field window off the front of a byte cursor and either
//! binds it into the symbol table or asserts its value. The cursor is shared
//! by sibling matches while nested matches re-read a copy of their parent's
//! window; the symbol table is shared by all of them.

use crate::ast::{Cell, CellKind};
use crate::error::{CellError, CellResult};
use crate::eval::Scope;
use crate::value::{Symbols, Value};

impl Cell {
    /// Decode the front of `data` without an owning row. Returns the number
    /// of bytes consumed; `data` is advanced past them.
    pub fn decode(&self, data: &mut &[u8], symbols: &mut Symbols) -> CellResult<usize> {
        self.decode_in(Scope::default(), data, symbols)
    }

    pub fn decode_in(
        &self,
        scope: Scope<'_>,
        data: &mut &[u8],
        symbols: &mut Symbols,
    ) -> CellResult<usize> {
        let loc = self.location();
        let CellKind::Match(args) = self.kind() else {
            return Err(CellError::type_error(
                loc,
                format!("only match expressions decode bytes, not `{self}`"),
            ));
        };
        let [bytecount, dest, rest @ ..] = args.as_slice() else {
            return Err(CellError::Arity {
                loc: loc.clone(),
                message: "a match needs a byte count and a destination".to_string(),
            });
        };

        let input: &[u8] = *data;
        let buffer = Value::Bytes(input.to_vec());
        let count = match bytecount.evaluate_in(scope, Some(&buffer), symbols)? {
            Value::Absent | Value::Bool(false) => 0,
            Value::Int(n) => usize::try_from(n).map_err(|_| {
                CellError::type_error(loc, format!("negative byte count {n}"))
            })?,
            other => {
                return Err(CellError::type_error(
                    loc,
                    format!("byte count must be an integer, got {} `{other}`", other.type_name()),
                ))
            }
        };
        let count = if count == 0 { input.len() } else { count };
        if count > input.len() {
            return Err(CellError::Truncated {
                loc: loc.clone(),
                wanted: count,
                available: input.len(),
            });
        }
        let (window, remainder) = input.split_at(count);

        let mut rest = rest;
        let mut value = None;
        if let Some((op, tail)) = rest.split_first().filter(|(first, _)| first.is_op()) {
            let [byte] = window else {
                return Err(CellError::Arity {
                    loc: op.location().clone(),
                    message: format!("operators only apply to 1-byte fields, got {count} bytes"),
                });
            };
            value = Some(op.evaluate_in(scope, Some(&Value::Int(i64::from(*byte))), symbols)?);
            rest = tail;
        }
        if rest.is_empty() && value.is_none() {
            value = Some(Value::Bytes(window.to_vec()));
        }

        if let Some(value) = value {
            if dest.is_hex() {
                let expected = dest.evaluate_in(scope, Some(&buffer), symbols)?;
                let observed = comparable(value);
                if expected != observed {
                    return Err(CellError::MatchMismatch {
                        loc: loc.clone(),
                        expected: expected.to_string(),
                        observed: observed.to_string(),
                    });
                }
            } else {
                let key = dest.evaluate_in(scope, Some(&buffer), symbols)?.to_string();
                log::trace!("{loc}: {key} = {value}");
                symbols.insert(key, value);
            }
        }

        for cell in rest {
            if !cell.is_match() {
                return Err(CellError::syntax(
                    cell.location(),
                    format!("expected a nested match expression, got `{cell}`"),
                ));
            }
            let mut field = window;
            cell.decode_in(scope, &mut field, symbols)?;
        }

        *data = remainder;
        Ok(count)
    }
}

/// Raw windows compare against hex literals: one byte as a scalar, several
/// as a list.
fn comparable(value: Value) -> Value {
    match value {
        Value::Bytes(bytes) => match bytes.as_slice() {
            [byte] => Value::Int(i64::from(*byte)),
            _ => Value::List(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect()),
        },
        other => other,
    }
}
