use std::fmt;

use serde::Serialize;
use sysex_codec::CodecError;
use thiserror::Error;

/// Where a cell came from: module, table, source row, column, and (for
/// sub-cells of a list or substitution) the argument index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub row: usize,
    pub column: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arg: Option<usize>,
}

impl Location {
    pub fn new(module: impl Into<String>, row: usize, column: usize) -> Self {
        Self {
            module: module.into(),
            table: None,
            row,
            column,
            arg: None,
        }
    }

    pub fn in_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub(crate) fn with_arg(&self, arg: usize) -> Self {
        let mut loc = self.clone();
        loc.arg = Some(arg);
        loc
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.module)?;
        if let Some(table) = &self.table {
            write!(f, "/{table}")?;
        }
        write!(f, ":{}:{}", self.row, self.column)?;
        if let Some(arg) = self.arg {
            write!(f, "[{arg}]")?;
        }
        Ok(())
    }
}

/// Errors raised while parsing cells, evaluating them, building tables, or
/// decoding byte streams.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    #[error("{loc}: syntax error: {message}")]
    Syntax { loc: Location, message: String },
    #[error("{loc}: `{text}` is not a base-{radix} number")]
    Encoding {
        loc: Location,
        text: String,
        radix: u32,
    },
    #[error("{}{kind} {name}: {problem}{}", loc_prefix(.loc), params_suffix(.params))]
    Lookup {
        loc: Option<Location>,
        kind: &'static str,
        name: String,
        problem: String,
        params: String,
    },
    #[error("{loc}: {message}")]
    Uniqueness { loc: Location, message: String },
    #[error("{loc}: cannot make range from [{start}, {end}]")]
    RangeType {
        loc: Location,
        start: String,
        end: String,
    },
    #[error("{loc}: byte stream mismatch: {observed} != {expected}")]
    MatchMismatch {
        loc: Location,
        expected: String,
        observed: String,
    },
    #[error("{loc}: {message}")]
    Arity { loc: Location, message: String },
    #[error("{loc}: {message}")]
    Type { loc: Location, message: String },
    #[error("{loc}: match wants {wanted} bytes but only {available} remain")]
    Truncated {
        loc: Location,
        wanted: usize,
        available: usize,
    },
    #[error("{loc}: {message}")]
    Metadata { loc: Location, message: String },
    #[error("{loc}: {source}")]
    Codec {
        loc: Location,
        #[source]
        source: CodecError,
    },
}

impl CellError {
    pub(crate) fn syntax(loc: &Location, message: impl Into<String>) -> Self {
        CellError::Syntax {
            loc: loc.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn type_error(loc: &Location, message: impl Into<String>) -> Self {
        CellError::Type {
            loc: loc.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn lookup(
        kind: &'static str,
        name: impl Into<String>,
        problem: impl Into<String>,
        params: impl Into<String>,
    ) -> Self {
        CellError::Lookup {
            loc: None,
            kind,
            name: name.into(),
            problem: problem.into(),
            params: params.into(),
        }
    }

    /// Attach the location of the cell that triggered a lookup, unless a
    /// nearer cell already did.
    pub(crate) fn at(self, at: &Location) -> Self {
        match self {
            CellError::Lookup {
                loc: None,
                kind,
                name,
                problem,
                params,
            } => CellError::Lookup {
                loc: Some(at.clone()),
                kind,
                name,
                problem,
                params,
            },
            other => other,
        }
    }

    pub(crate) fn uniqueness(loc: &Location, message: impl Into<String>) -> Self {
        CellError::Uniqueness {
            loc: loc.clone(),
            message: message.into(),
        }
    }

    pub(crate) fn metadata(loc: &Location, message: impl Into<String>) -> Self {
        CellError::Metadata {
            loc: loc.clone(),
            message: message.into(),
        }
    }
}

fn loc_prefix(loc: &Option<Location>) -> String {
    loc.as_ref().map(|loc| format!("{loc}: ")).unwrap_or_default()
}

fn params_suffix(params: &str) -> String {
    if params.is_empty() {
        String::new()
    } else {
        format!(": {params}")
    }
}

pub type CellResult<T> = Result<T, CellError>;
