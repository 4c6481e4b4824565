//! The cell factory: turns the raw text of a table cell into a [`Cell`].
//!
//! Dispatch order (first match wins):
//! 1. leading `@`: the rest of the text is kept verbatim as a string;
//! 2. empty text or leading `#`: a comment, parsed as an absent value;
//! 3. `a;b;c`: compact list, each part parsed independently;
//! 4. `a..b`: range (more than one `..` is a syntax error);
//! 5. leading `(`: substitution, selected by the character after `(`;
//! 6. anything else: a literal, see [`encast`].

use crate::ast::{Cell, CellKind, OpKind, Substitution};
use crate::error::{CellError, CellResult, Location};
use crate::lexer::{Token, Tokenizer};
use crate::value::Value;

/// Parse the text of one cell. Nothing is evaluated.
pub fn parse_cell(loc: &Location, text: &str) -> CellResult<Cell> {
    let buf = text.trim();

    if let Some(rest) = buf.strip_prefix('@') {
        return Ok(Cell::literal(loc.clone(), Value::Text(rest.to_string())));
    }

    if buf.is_empty() || buf.starts_with('#') {
        return Ok(Cell::literal(loc.clone(), Value::Absent));
    }

    let parts: Vec<&str> = buf.split(';').collect();
    if parts.len() > 1 {
        let cells = parts
            .iter()
            .enumerate()
            .map(|(nth, part)| parse_cell(&loc.with_arg(nth), part))
            .collect::<CellResult<Vec<_>>>()?;
        return Ok(Cell::new(loc.clone(), CellKind::CompactList(cells)));
    }

    let parts: Vec<&str> = buf.split("..").collect();
    match parts.as_slice() {
        [start, end] => {
            let start = parse_cell(&loc.with_arg(0), start)?;
            let end = parse_cell(&loc.with_arg(1), end)?;
            return Ok(Cell::new(
                loc.clone(),
                CellKind::Range(Box::new(start), Box::new(end)),
            ));
        }
        [_] => {}
        _ => {
            return Err(CellError::syntax(
                loc,
                format!("range cell syntax error: {buf}"),
            ))
        }
    }

    if let Some(rest) = buf.strip_prefix('(') {
        let mut tokens = Tokenizer::new(rest);
        let cell = parse_substitution(loc, &mut tokens)?;
        if tokens.next().is_some() {
            log::debug!("{loc}: ignoring text after substitution in `{buf}`");
        }
        return Ok(cell);
    }

    Ok(Cell::literal(loc.clone(), encast(buf)))
}

/// Parse a substitution whose opening `(` has already been consumed.
fn parse_substitution(loc: &Location, tokens: &mut Tokenizer<'_>) -> CellResult<Cell> {
    let sub = tokens.peek_char().and_then(Substitution::from_sigil);
    if let Some(sub) = sub {
        tokens.bump();
        if let Substitution::Op(op @ (OpKind::ShiftLeft | OpKind::ShiftRight)) = sub {
            let expected = if op == OpKind::ShiftLeft { '<' } else { '>' };
            if tokens.bump() != Some(expected) {
                return Err(CellError::syntax(
                    loc,
                    format!("expected `{}`", op.sigil()),
                ));
            }
        }
    }

    let (numeric, radix) = sub.map_or((false, 10), |s| (s.requires_number(), s.radix()));

    let mut args = Vec::new();
    loop {
        let Some(token) = tokens.next() else {
            return Err(CellError::syntax(loc, "unexpected end of input"));
        };
        let arg_loc = loc.with_arg(args.len());
        match token {
            Token::Open => args.push(parse_substitution(&arg_loc, tokens)?),
            Token::Close => break,
            other => {
                let value = encast_strict(&arg_loc, other.text(), numeric, radix)?;
                args.push(Cell::literal(arg_loc, value));
            }
        }
    }

    let kind = match sub {
        Some(sub) => sub.build(args),
        None => CellKind::List(args),
    };
    Ok(Cell::new(loc.clone(), kind))
}

/// Convert literal text to a value: base-10 integer, else float, else one of
/// the keywords `yes`/`true`, `no`/`false`, `none` (any case), else the text
/// itself.
pub fn encast(text: &str) -> Value {
    encast_radix(text, 10).unwrap_or_else(|| Value::Text(text.to_string()))
}

/// Like [`encast`] but with an explicit radix, failing with an encoding
/// error instead of falling back to text when `numeric` is set.
pub(crate) fn encast_strict(
    loc: &Location,
    text: &str,
    numeric: bool,
    radix: u32,
) -> CellResult<Value> {
    if let Some(value) = parse_int(text, radix) {
        return Ok(Value::Int(value));
    }
    if let Some(value) = parse_float(text) {
        return Ok(Value::Float(value));
    }
    if numeric {
        return Err(CellError::Encoding {
            loc: loc.clone(),
            text: text.to_string(),
            radix,
        });
    }
    Ok(keyword(text).unwrap_or_else(|| Value::Text(text.to_string())))
}

fn encast_radix(text: &str, radix: u32) -> Option<Value> {
    parse_int(text, radix)
        .map(Value::Int)
        .or_else(|| parse_float(text).map(Value::Float))
        .or_else(|| keyword(text))
}

fn keyword(text: &str) -> Option<Value> {
    match text.to_ascii_lowercase().as_str() {
        "yes" | "true" => Some(Value::Bool(true)),
        "no" | "false" => Some(Value::Bool(false)),
        "none" => Some(Value::Absent),
        _ => None,
    }
}

/// Underscores may separate digits (`1_000`), but not lead, trail, or double up.
fn strip_digit_separators(digits: &str) -> Option<String> {
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return None;
    }
    Some(digits.chars().filter(|c| *c != '_').collect())
}

fn parse_int(text: &str, radix: u32) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let digits = if radix == 16 {
        digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
            .unwrap_or(digits)
    } else {
        digits
    };
    let digits = strip_digit_separators(digits)?;
    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let magnitude = i128::from_str_radix(&digits, radix).ok()?;
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

fn parse_float(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.contains('_') {
        let (mantissa, _) = text.split_once(['e', 'E']).unwrap_or((text, ""));
        if mantissa
            .split('.')
            .any(|part| strip_digit_separators(part.trim_start_matches(['+', '-'])).is_none())
        {
            return None;
        }
        return text.replace('_', "").parse().ok();
    }
    text.parse().ok()
}
