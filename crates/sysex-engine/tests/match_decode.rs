use pretty_assertions::assert_eq;
use sysex_engine::{parse_cell, Cell, CellError, Location, Symbols, Value};

fn pattern(text: &str) -> Cell {
    parse_cell(&Location::new("decode_tests", 1, 1), text)
        .unwrap_or_else(|err| panic!("`{text}` should parse: {err}"))
}

#[test]
fn status_byte_splits_into_kind_and_channel() {
    let mut data: &[u8] = &[0x91];
    let mut symbols = Symbols::new();
    let used = pattern("(= 1 status (= 1 (#9) (>> 4 (& (#F0)))) (= 1 chan (& (#0F))))")
        .decode(&mut data, &mut symbols)
        .unwrap();

    assert_eq!(used, 1);
    assert!(data.is_empty());
    assert_eq!(symbols.get("chan"), Some(&Value::Int(1)));
    assert_eq!(symbols.get("status"), None);
}

#[test]
fn wrong_status_nibble_is_a_mismatch() {
    let mut data: &[u8] = &[0x81];
    let err = pattern("(= 1 x (= 1 (#9) (>> 4 (& (#F0)))))")
        .decode(&mut data, &mut Symbols::new())
        .unwrap_err();
    assert!(
        matches!(&err, CellError::MatchMismatch { expected, observed, .. } if expected == "9" && observed == "8"),
        "{err:?}"
    );
}

#[test]
fn sibling_matches_walk_the_buffer() {
    // Roland DT1 header: maker, device, model, command.
    let mut data: &[u8] = &[0x41, 0x10, 0x6A, 0x12, 0x01, 0x00];
    let mut symbols = Symbols::new();
    for text in ["(= 1 (#41))", "(= 1 device)", "(= 1 model)", "(= 1 (#12))"] {
        assert_eq!(pattern(text).decode(&mut data, &mut symbols).unwrap(), 1);
    }
    assert_eq!(data, &[0x01, 0x00]);
    assert_eq!(symbols["device"], Value::Bytes(vec![0x10]));
    assert_eq!(symbols["model"], Value::Bytes(vec![0x6A]));

    assert_eq!(pattern("(= 0 body)").decode(&mut data, &mut symbols).unwrap(), 2);
    assert_eq!(symbols["body"], Value::Bytes(vec![0x01, 0x00]));
}

#[test]
fn multi_byte_hex_assertion() {
    let mut data: &[u8] = &[0x7E, 0x7F, 0x06];
    let used = pattern("(= 2 (#7E 7F))")
        .decode(&mut data, &mut Symbols::new())
        .unwrap();
    assert_eq!(used, 2);
    assert_eq!(data, &[0x06]);
}

#[test]
fn byte_count_can_depend_on_earlier_bindings() {
    let mut data: &[u8] = &[0x03, 0xAA, 0xBB, 0xCC, 0xDD];
    let mut symbols = Symbols::new();
    pattern("(= 1 len (+ 0))")
        .decode(&mut data, &mut symbols)
        .unwrap();
    assert_eq!(symbols["len"], Value::Int(3));
    let used = pattern("(= (: len) payload)")
        .decode(&mut data, &mut symbols)
        .unwrap();
    assert_eq!(used, 3);
    assert_eq!(symbols["payload"], Value::Bytes(vec![0xAA, 0xBB, 0xCC]));
    assert_eq!(data, &[0xDD]);
}

#[test]
fn nested_patterns_must_be_matches() {
    let mut data: &[u8] = &[0x01];
    let err = pattern("(= 1 x 5)")
        .decode(&mut data, &mut Symbols::new())
        .unwrap_err();
    assert!(matches!(err, CellError::Syntax { .. }), "{err:?}");
}

#[test]
fn only_matches_decode() {
    let mut data: &[u8] = &[0x01];
    let err = pattern("(+ 1 2)")
        .decode(&mut data, &mut Symbols::new())
        .unwrap_err();
    assert!(matches!(err, CellError::Type { .. }), "{err:?}");
    assert_eq!(data, &[0x01]);
}
