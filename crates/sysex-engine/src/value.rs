use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeSeq, Serializer};

use crate::module::Module;
use crate::row::{CellRef, Row};
use crate::table::Table;

/// Symbol table shared by the cells of one decode.
pub type Symbols = BTreeMap<String, Value>;

/// The result of evaluating a cell.
///
/// Scalars and lists come from literals and substitutions; the handle
/// variants come from reference cells and compare by identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Absent,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    List(Vec<Value>),
    /// Half-open integer interval produced by `a..b`.
    Range(Range<i64>),
    /// Raw field bytes bound by a match expression.
    Bytes(Vec<u8>),
    Module(Arc<Module>),
    Table(Arc<Table>),
    Row(Arc<Row>),
    Cell(CellRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "none",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Text(_) => "string",
            Value::List(_) => "list",
            Value::Range(_) => "range",
            Value::Bytes(_) => "bytes",
            Value::Module(_) => "module",
            Value::Table(_) => "table",
            Value::Row(_) => "row",
            Value::Cell(_) => "cell",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Absent => false,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Module(_) | Value::Table(_) | Value::Row(_) | Value::Cell(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Items of a list, range, or byte string; `None` for scalars.
    pub fn elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.clone()),
            Value::Range(r) => Some(r.clone().map(Value::Int).collect()),
            Value::Bytes(bytes) => Some(bytes.iter().map(|b| Value::Int(*b as i64)).collect()),
            _ => None,
        }
    }

    /// True if `needle` is an element of a list value or a substring of a
    /// text value.
    pub fn contains_text(&self, needle: &str) -> bool {
        match self {
            Value::Text(s) => s.contains(needle),
            Value::List(items) => items.iter().any(|item| match item {
                Value::Text(s) => s == needle,
                other => other.to_string() == needle,
            }),
            other => other.to_string() == needle,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => write!(f, "Absent"),
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Float(n) => write!(f, "Float({n})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Text(s) => write!(f, "Text({s:?})"),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Range(r) => write!(f, "Range({}..{})", r.start, r.end),
            Value::Bytes(b) => write!(f, "Bytes({b:02X?})"),
            Value::Module(m) => write!(f, "Module({})", m.name()),
            Value::Table(t) => write!(f, "Table({})", t.name()),
            Value::Row(r) => write!(f, "Row({}:{})", r.table_name(), r.line()),
            Value::Cell(c) => write!(f, "Cell({}:{} {})", c.row().table_name(), c.row().line(), c.column()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b) == Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            (Value::Table(a), Value::Table(b)) => Arc::ptr_eq(a, b),
            (Value::Row(a), Value::Row(b)) => Arc::ptr_eq(a, b),
            (Value::Cell(a), Value::Cell(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Absent => {}
            Value::Int(n) => n.hash(state),
            Value::Float(n) => n.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Text(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Range(r) => r.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Module(m) => std::ptr::hash(Arc::as_ptr(m), state),
            Value::Table(t) => std::ptr::hash(Arc::as_ptr(t), state),
            Value::Row(r) => std::ptr::hash(Arc::as_ptr(r), state),
            Value::Cell(c) => {
                std::ptr::hash(Arc::as_ptr(c.row()), state);
                c.column().hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Absent => f.write_str("none"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{n:.1}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            Value::Range(r) => write!(f, "{}..{}", r.start, r.end),
            Value::Bytes(bytes) => {
                f.write_str("(#")?;
                for b in bytes {
                    write!(f, " {b:02X}")?;
                }
                f.write_str(")")
            }
            Value::Module(m) => write!(f, "(! {})", m.name()),
            Value::Table(t) => write!(f, "(] {} {})", t.module_name(), t.name()),
            Value::Row(r) => write!(f, "(@ {} {} {})", r.module_name(), r.table_name(), r.line()),
            Value::Cell(c) => write!(
                f,
                "($ {} {} {} {})",
                c.row().module_name(),
                c.row().table_name(),
                c.row().line(),
                c.column()
            ),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Absent => serializer.serialize_none(),
            Value::Int(n) => serializer.serialize_i64(*n),
            Value::Float(n) => serializer.serialize_f64(*n),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Range(r) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(&r.start)?;
                seq.serialize_element(&r.end)?;
                seq.end()
            }
            Value::Bytes(bytes) => {
                let mut seq = serializer.serialize_seq(Some(bytes.len()))?;
                for b in bytes {
                    seq.serialize_element(b)?;
                }
                seq.end()
            }
            handle => serializer.collect_str(handle),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_floats_keep_their_decimal_point() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(3.14).to_string(), "3.14");
    }

    #[test]
    fn display_round_trips_through_literal_keywords() {
        assert_eq!(Value::Bool(true).to_string(), "true");
        assert_eq!(Value::Absent.to_string(), "none");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::from("a")]).to_string(),
            "(1 a)"
        );
        assert_eq!(Value::Bytes(vec![0xF0, 0x41]).to_string(), "(# F0 41)");
    }

    #[test]
    fn contains_text_matches_list_members_and_substrings() {
        let engines = Value::List(vec![Value::from("XG"), Value::from("GS")]);
        assert!(engines.contains_text("GS"));
        assert!(!engines.contains_text("G"));
        assert!(Value::from("XG GS").contains_text("GS"));
    }

    #[test]
    fn range_elements_are_half_open() {
        assert_eq!(
            Value::Range(1..4).elements(),
            Some(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }
}
