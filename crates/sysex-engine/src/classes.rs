//! Lookups that only make sense for particular table classes.

use std::sync::Arc;

use sysex_codec::{codec, Codec};

use crate::ast::OpKind;
use crate::error::{CellError, CellResult};
use crate::eval::job;
use crate::row::Row;
use crate::table::{Table, TableClass};
use crate::value::{Symbols, Value};

/// Manufacturer ids starting with this byte are three bytes long.
const MMA_EXTENDED: u8 = 0x00;

/// Length of the manufacturer id at the front of a message body.
pub fn mma_id_len(data: &[u8]) -> usize {
    if data.first() == Some(&MMA_EXTENDED) {
        3
    } else {
        1
    }
}

type Sniffer = fn(&Table, &[u8]) -> CellResult<Arc<Row>>;

/// Vendors whose messages say which device sent them, keyed by the vendor
/// row's identity.
const SNIFFERS: &[(&str, Sniffer)] = &[("akai", model_byte), ("yamaha", model_byte)];

/// Vendors a [`Table::sniff`] can identify devices for.
pub fn sniffers() -> impl Iterator<Item = &'static str> {
    SNIFFERS.iter().map(|(vendor, _)| *vendor)
}

/// The model id sits in the second byte after the manufacturer id and is
/// matched against the `proto_id` column. Earlier rows win, so a protocol
/// family's master row goes above its members.
fn model_byte(devices: &Table, data: &[u8]) -> CellResult<Arc<Row>> {
    let Some(&model) = data.get(1) else {
        return Err(CellError::Truncated {
            loc: devices.location().clone(),
            wanted: 2,
            available: data.len(),
        });
    };
    let mut rows = devices.get_rows(&Value::Int(i64::from(model)), None, Some("proto_id"), true)?;
    rows.pop().ok_or_else(|| {
        CellError::lookup("row", devices.name(), "no values found", format!("proto_id {model:#04X}"))
    })
}

impl Table {
    fn expect_class(&self, class: TableClass, operation: &str) -> CellResult<()> {
        if self.class() == class {
            return Ok(());
        }
        Err(CellError::type_error(
            self.location(),
            format!("{operation} needs a {class}, {} is a {}", self.name(), self.class()),
        ))
    }

    /// The vendor row whose `mma_id` matches the manufacturer id at the
    /// front of `data`.
    pub fn mma_lookup(&self, data: &[u8]) -> CellResult<Arc<Row>> {
        self.expect_class(TableClass::Vendor, "mma_lookup")?;
        let idlen = mma_id_len(data);
        if data.len() < idlen {
            return Err(CellError::Truncated {
                loc: self.location().clone(),
                wanted: idlen,
                available: data.len(),
            });
        }
        let id = match &data[..idlen] {
            [byte] => Value::Int(i64::from(*byte)),
            bytes => Value::List(bytes.iter().map(|b| Value::Int(i64::from(*b))).collect()),
        };
        self.get_one_row(&id, None, Some("mma_id"))
    }

    /// The device row a message came from. `data` is the message body after
    /// the manufacturer id, and `vendor` the identity of the row
    /// [`Table::mma_lookup`] found for it.
    pub fn sniff(&self, data: &[u8], vendor: &Value) -> CellResult<Arc<Row>> {
        self.expect_class(TableClass::Device, "sniff")?;
        let sniffer = vendor
            .as_str()
            .and_then(|name| SNIFFERS.iter().find(|(known, _)| *known == name))
            .map(|(_, sniffer)| *sniffer)
            .ok_or_else(|| {
                CellError::lookup("vendor", vendor.to_string(), "no sniffer registered", "")
            })?;
        sniffer(self, data)
    }

    /// Map a MIDI data value to a device value by interpolating between the
    /// rows that bracket it on `idata`.
    pub fn value(&self, data: f64) -> CellResult<Value> {
        self.expect_class(TableClass::Value, "value")?;
        let (row, last_idata, last_fdata) = self.bracket(data, "idata", "fdata")?;
        let scale = number(&row, "scale")?;
        let prec = row.value("prec")?.as_int().unwrap_or(0);
        Ok(Value::Float(round_to(
            scale * (data - last_idata) + last_fdata,
            prec,
        )))
    }

    /// Inverse of [`Table::value`]: the MIDI data value for a device value.
    pub fn midi(&self, value: f64) -> CellResult<i64> {
        self.expect_class(TableClass::Value, "midi")?;
        let (row, last_fdata, last_idata) = self.bracket(value, "fdata", "idata")?;
        let scale = number(&row, "scale")?;
        if scale == 0.0 {
            return Ok(last_idata.round() as i64);
        }
        Ok(((value - last_fdata) / scale + last_idata).round() as i64)
    }

    /// The first row whose `column` exceeds `target`, together with the
    /// `column` and `other` values of the row before it (zero before the
    /// first row). Past the end the last row is used.
    fn bracket(&self, target: f64, column: &str, other: &str) -> CellResult<(Arc<Row>, f64, f64)> {
        let mut last = (0.0, 0.0);
        let mut found = None;
        for row in self.rows() {
            let point = number(row, column)?;
            found = Some(row.clone());
            if point > target {
                break;
            }
            last = (point, number(row, other)?);
        }
        let row = found.ok_or_else(|| {
            CellError::lookup("row", self.name(), "table is empty", target.to_string())
        })?;
        Ok((row, last.0, last.1))
    }

    /// Decode a parameter's wire bytes with the codec named by its `render`
    /// cell, then apply its `shift` and `scale` cells.
    pub fn param_value(
        &self,
        rowid: &Value,
        engine: Option<&str>,
        bytes: &[u8],
    ) -> CellResult<Value> {
        self.expect_class(TableClass::Param, "param_value")?;
        let row = self.get_one_row(rowid, engine, None)?;
        let codec = render_codec(&row)?;
        let raw = codec
            .decode(bytes)
            .map_err(|source| codec_error(&row, source))?;
        let shifted = adjust(&row, "shift", OpKind::Add, Value::Int(raw))?;
        adjust(&row, "scale", OpKind::Mul, shifted)
    }

    /// Encode a raw parameter value into the row's `bytec` wire bytes.
    pub fn param_midi(&self, rowid: &Value, engine: Option<&str>, raw: i64) -> CellResult<Vec<u8>> {
        self.expect_class(TableClass::Param, "param_midi")?;
        let row = self.get_one_row(rowid, engine, None)?;
        let codec = render_codec(&row)?;
        let bytec = match row.value("bytec")? {
            Value::Absent => 1,
            Value::Int(n) if n > 0 => n as usize,
            other => {
                return Err(CellError::type_error(
                    &cell_loc(&row, "bytec"),
                    format!("bytec must be a positive integer, got `{other}`"),
                ))
            }
        };
        codec
            .encode(raw, bytec)
            .map_err(|source| codec_error(&row, source))
    }
}

fn cell_loc(row: &Row, column: &str) -> crate::error::Location {
    row.get(column)
        .map(|cell| cell.location().clone())
        .or_else(|| row.table().map(|table| table.location().clone()))
        .unwrap_or_default()
}

fn codec_error(row: &Row, source: sysex_codec::CodecError) -> CellError {
    CellError::Codec {
        loc: cell_loc(row, "render"),
        source,
    }
}

fn render_codec(row: &Arc<Row>) -> CellResult<&'static dyn Codec> {
    match row.value("render")? {
        Value::Text(name) => codec(&name).map_err(|source| codec_error(row, source)),
        other => Err(CellError::type_error(
            &cell_loc(row, "render"),
            format!("render must name a codec, got `{other}`"),
        )),
    }
}

fn number(row: &Arc<Row>, column: &str) -> CellResult<f64> {
    let value = row.value(column)?;
    value.as_float().ok_or_else(|| {
        CellError::type_error(
            &cell_loc(row, column),
            format!("{column} must be a number, got {} `{value}`", value.type_name()),
        )
    })
}

/// Round to `prec` decimal places, halves away from zero.
fn round_to(x: f64, prec: i64) -> f64 {
    let factor = 10f64.powi(prec.clamp(-15, 15) as i32);
    (x * factor).round() / factor
}

/// Apply a `shift`/`scale` cell to `value`.
///
/// Operator cells take the value as their call argument, a table reference
/// interpolates through that table, and a plain number is combined with
/// `op`. An absent cell leaves the value alone.
fn adjust(row: &Arc<Row>, column: &str, op: OpKind, value: Value) -> CellResult<Value> {
    let Some(cell) = row.get(column) else {
        return Ok(value);
    };
    if cell.is_absent() {
        return Ok(value);
    }
    if cell.is_op() {
        return row.evaluate(column, Some(&value), &Symbols::new());
    }
    match row.value(column)? {
        Value::Table(table) => {
            let x = value.as_float().ok_or_else(|| {
                CellError::type_error(cell.location(), format!("cannot interpolate `{value}`"))
            })?;
            table.value(x)
        }
        factor @ (Value::Int(_) | Value::Float(_)) => job(cell.location(), op, value, factor),
        other => Err(CellError::type_error(
            cell.location(),
            format!("{column} must be a number, operator or table, got `{other}`"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{read_module, LoadOptions};
    use pretty_assertions::assert_eq;

    const DEVICES_SRC: &str = "\
]Devices,DeviceTable,none
*,@ident,proto_id
|,xg,(#4C)
|,mu80,(#4C)
|,s1000,(#0C)
]Other,CTRLTable,none
*,@ident,proto_id
|,xg,(#4C)
";

    #[test]
    fn sniff_matches_the_model_byte_first_row_wins() {
        let module = read_module("sniff_demo", DEVICES_SRC.as_bytes(), &LoadOptions::default())
            .unwrap();
        let devices = module.table("Devices").unwrap();
        let yamaha = Value::from("yamaha");

        let row = devices.sniff(&[0x10, 0x4C, 0x00], &yamaha).unwrap();
        assert_eq!(row.value("ident").unwrap(), Value::from("xg"));
        let row = devices.sniff(&[0x00, 0x0C], &Value::from("akai")).unwrap();
        assert_eq!(row.value("ident").unwrap(), Value::from("s1000"));

        let err = devices.sniff(&[0x10, 0x7F], &yamaha).unwrap_err();
        assert!(matches!(err, CellError::Lookup { kind: "row", .. }), "{err:?}");
        let err = devices.sniff(&[0x10], &yamaha).unwrap_err();
        assert!(matches!(err, CellError::Truncated { wanted: 2, available: 1, .. }), "{err:?}");
        let err = devices.sniff(&[0x10, 0x4C], &Value::from("roland")).unwrap_err();
        assert_eq!(err.to_string(), "vendor roland: no sniffer registered");

        let err = module.table("Other").unwrap().sniff(&[0x10, 0x4C], &yamaha).unwrap_err();
        assert!(matches!(err, CellError::Type { .. }), "{err:?}");
    }

    #[test]
    fn manufacturer_ids_are_one_or_three_bytes() {
        assert_eq!(mma_id_len(&[0x43, 0x10]), 1);
        assert_eq!(mma_id_len(&[0x00, 0x20, 0x29]), 3);
        assert_eq!(mma_id_len(&[]), 1);
        assert_eq!(sniffers().collect::<Vec<_>>(), vec!["akai", "yamaha"]);
    }

    #[test]
    fn round_to_keeps_requested_digits() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(2.5, 0), 3.0);
    }
}
