use std::fmt;

use crate::error::Location;
use crate::value::Value;

/// Binary (or unary) operator substitutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    And,
    Mul,
    Not,
    Or,
    Paste,
    ShiftLeft,
    ShiftRight,
    Sub,
}

impl OpKind {
    pub fn sigil(self) -> &'static str {
        match self {
            OpKind::Add => "+",
            OpKind::And => "&",
            OpKind::Mul => "*",
            OpKind::Not => "~",
            OpKind::Or => "|",
            OpKind::Paste => "%",
            OpKind::ShiftLeft => "<<",
            OpKind::ShiftRight => ">>",
            OpKind::Sub => "-",
        }
    }
}

/// Reference substitutions, resolved against the table hierarchy or the
/// decode symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Module,
    Table,
    Row,
    Column,
    Var,
}

impl RefKind {
    pub fn sigil(self) -> &'static str {
        match self {
            RefKind::Module => "!",
            RefKind::Table => "]",
            RefKind::Row => "@",
            RefKind::Column => "$",
            RefKind::Var => ":",
        }
    }
}

/// What the character after `(` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Substitution {
    Op(OpKind),
    Hex,
    Match,
    Ref(RefKind),
}

impl Substitution {
    #[cfg(test)]
    pub(crate) const ALL: [Substitution; 16] = [
        Substitution::Op(OpKind::Add),
        Substitution::Op(OpKind::And),
        Substitution::Op(OpKind::Mul),
        Substitution::Op(OpKind::Not),
        Substitution::Op(OpKind::Or),
        Substitution::Op(OpKind::Paste),
        Substitution::Op(OpKind::ShiftLeft),
        Substitution::Op(OpKind::ShiftRight),
        Substitution::Op(OpKind::Sub),
        Substitution::Hex,
        Substitution::Match,
        Substitution::Ref(RefKind::Module),
        Substitution::Ref(RefKind::Table),
        Substitution::Ref(RefKind::Row),
        Substitution::Ref(RefKind::Column),
        Substitution::Ref(RefKind::Var),
    ];

    pub(crate) fn from_sigil(c: char) -> Option<Self> {
        Some(match c {
            '+' => Substitution::Op(OpKind::Add),
            '&' => Substitution::Op(OpKind::And),
            '*' => Substitution::Op(OpKind::Mul),
            '~' => Substitution::Op(OpKind::Not),
            '|' => Substitution::Op(OpKind::Or),
            '%' => Substitution::Op(OpKind::Paste),
            '<' => Substitution::Op(OpKind::ShiftLeft),
            '>' => Substitution::Op(OpKind::ShiftRight),
            '-' => Substitution::Op(OpKind::Sub),
            '#' => Substitution::Hex,
            '=' => Substitution::Match,
            '!' => Substitution::Ref(RefKind::Module),
            ']' => Substitution::Ref(RefKind::Table),
            '@' => Substitution::Ref(RefKind::Row),
            '$' => Substitution::Ref(RefKind::Column),
            ':' => Substitution::Ref(RefKind::Var),
            _ => return None,
        })
    }

    pub(crate) fn sigil(self) -> &'static str {
        match self {
            Substitution::Op(op) => op.sigil(),
            Substitution::Hex => "#",
            Substitution::Match => "=",
            Substitution::Ref(r) => r.sigil(),
        }
    }

    /// Operators and hex literals only accept numeric arguments.
    pub(crate) fn requires_number(self) -> bool {
        match self {
            Substitution::Op(OpKind::Paste) => false,
            Substitution::Op(_) | Substitution::Hex => true,
            Substitution::Match | Substitution::Ref(_) => false,
        }
    }

    pub(crate) fn radix(self) -> u32 {
        match self {
            Substitution::Hex => 16,
            _ => 10,
        }
    }

    pub(crate) fn build(self, args: Vec<Cell>) -> CellKind {
        match self {
            Substitution::Op(op) => CellKind::Op(op, args),
            Substitution::Hex => CellKind::Hex(args),
            Substitution::Match => CellKind::Match(args),
            Substitution::Ref(r) => CellKind::Ref(r, args),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellKind {
    Literal(Value),
    /// `a;b;c`
    CompactList(Vec<Cell>),
    /// `a..b`
    Range(Box<Cell>, Box<Cell>),
    /// `(a b c)`
    List(Vec<Cell>),
    Op(OpKind, Vec<Cell>),
    /// `(# 80 7E)`
    Hex(Vec<Cell>),
    Ref(RefKind, Vec<Cell>),
    /// `(= bytecount dest [op] [match...])`
    Match(Vec<Cell>),
}

/// A parsed, not yet evaluated, cell expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    loc: Location,
    kind: CellKind,
}

impl Cell {
    pub fn new(loc: Location, kind: CellKind) -> Self {
        Self { loc, kind }
    }

    pub fn literal(loc: Location, value: impl Into<Value>) -> Self {
        Self::new(loc, CellKind::Literal(value.into()))
    }

    pub fn location(&self) -> &Location {
        &self.loc
    }

    pub fn kind(&self) -> &CellKind {
        &self.kind
    }

    pub fn is_absent(&self) -> bool {
        matches!(self.kind, CellKind::Literal(Value::Absent))
    }

    pub fn is_hex(&self) -> bool {
        matches!(self.kind, CellKind::Hex(_))
    }

    pub fn is_op(&self) -> bool {
        matches!(self.kind, CellKind::Op(..))
    }

    pub fn is_match(&self) -> bool {
        matches!(self.kind, CellKind::Match(_))
    }
}

fn write_substitution(f: &mut fmt::Formatter<'_>, sigil: &str, args: &[Cell]) -> fmt::Result {
    f.write_str("(")?;
    f.write_str(sigil)?;
    for arg in args {
        write!(f, " {arg}")?;
    }
    f.write_str(")")
}

/// The external (source) form of a cell.
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CellKind::Literal(value) => write!(f, "{value}"),
            CellKind::CompactList(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            CellKind::Range(start, end) => write!(f, "{start}..{end}"),
            CellKind::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
            CellKind::Op(op, args) => write_substitution(f, op.sigil(), args),
            CellKind::Hex(args) => {
                f.write_str("(#")?;
                for arg in args {
                    match arg.kind() {
                        CellKind::Literal(Value::Int(n)) => write!(f, " {n:02X}")?,
                        _ => write!(f, " {arg}")?,
                    }
                }
                f.write_str(")")
            }
            CellKind::Ref(kind, args) => write_substitution(f, kind.sigil(), args),
            CellKind::Match(args) => write_substitution(f, "=", args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigil_table_is_a_bijection() {
        for sub in Substitution::ALL {
            let first = sub.sigil().chars().next().expect("sigils are non-empty");
            assert_eq!(Substitution::from_sigil(first), Some(sub), "sigil {first}");
        }
        assert_eq!(Substitution::from_sigil('f'), None);
    }

    #[test]
    fn only_operators_and_hex_require_numbers() {
        assert!(Substitution::Hex.requires_number());
        assert!(Substitution::Op(OpKind::ShiftLeft).requires_number());
        assert!(!Substitution::Op(OpKind::Paste).requires_number());
        assert!(!Substitution::Ref(RefKind::Var).requires_number());
        assert_eq!(Substitution::Hex.radix(), 16);
        assert_eq!(Substitution::Match.radix(), 10);
    }
}
