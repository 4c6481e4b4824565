use std::sync::Arc;

use pretty_assertions::assert_eq;
use sysex_engine::{
    read_module, CellError, LoadError, LoadOptions, Location, Module, Scope, Symbols,
    TableBuilder, TableClass, TableSchema, Value,
};

fn module(name: &str, src: &str) -> Arc<Module> {
    read_module(name, src.as_bytes(), &LoadOptions::default())
        .unwrap_or_else(|err| panic!("module {name} should load: {err}"))
}

fn text(s: &str) -> Value {
    Value::from(s)
}

const OVERLAY_SRC: &str = "\
]A,CTRLTable,none
*,@ident,value
|,X,1
|,Y,2
]B,CTRLTable,(] A)
*,@ident,value
|,Y,20
]C,CTRLTable,none
*,@ident,value
|,Y,30
";

#[test]
fn overlay_supplies_rows_missing_locally() {
    let module = module("overlay_demo", OVERLAY_SRC);
    let b = module.table("B").expect("table B");

    let row = b.get_one_row(&text("X"), None, None).unwrap();
    assert_eq!(row.table_name(), "A");
    assert_eq!(row.value("value").unwrap(), Value::Int(1));

    let row = b.get_one_row(&text("Y"), None, None).unwrap();
    assert_eq!(row.table_name(), "B");
    assert_eq!(row.value("value").unwrap(), Value::Int(20));
}

#[test]
fn missing_row_without_overlay_is_a_lookup_error() {
    let module = module("no_overlay_demo", OVERLAY_SRC);
    let c = module.table("C").expect("table C");
    let err = c.get_one_row(&text("X"), None, None).unwrap_err();
    assert!(
        matches!(&err, CellError::Lookup { kind: "row", name, .. } if name == "C"),
        "{err:?}"
    );
    assert!(err.to_string().contains("(X, none, ident)"), "{err}");
}

#[test]
fn self_referential_overlay_stops() {
    let src = "\
]Loop,CTRLTable,(] Loop)
*,@ident,value
|,a,1
";
    let module = module("overlay_loop_demo", src);
    let table = module.table("Loop").unwrap();
    let row = table.get_one_row(&text("a"), None, None).unwrap();
    assert_eq!(row.value("value").unwrap(), Value::Int(1));
    let err = table.get_one_row(&text("b"), None, None).unwrap_err();
    assert!(
        matches!(&err, CellError::Lookup { kind: "table", problem, .. } if problem == "overlay chain too deep"),
        "{err:?}"
    );
}

#[test]
fn duplicate_keys_are_rejected() {
    let loc = Location::new("dup_keys", 1, 0);
    let schema = TableSchema::bind(&loc, &["*id", "name"]).unwrap();
    let mut table = TableBuilder::new(&loc, "Ids", TableClass::Key, schema);
    table.push_row(2, &["1", "one"]).unwrap();
    let err = table.push_row(3, &["1", "uno"]).unwrap_err();
    assert!(matches!(err, CellError::Uniqueness { .. }), "{err:?}");
}

#[test]
fn duplicate_column_ids_are_rejected_at_load() {
    let src = "\
]Twice,CTRLTable,none
*,@ident,value,value
";
    let err = read_module("dup_columns", src.as_bytes(), &LoadOptions::default()).unwrap_err();
    assert!(
        matches!(err, LoadError::Cell(CellError::Uniqueness { .. })),
        "{err:?}"
    );
}

#[test]
fn key_index_wins_without_an_explicit_column() {
    let src = "\
]Voices,ParamTable,none
*,*num,@ident,name
|,1,piano,Piano
|,2,organ,Organ
";
    let module = module("key_demo", src);
    let voices = module.table("Voices").unwrap();
    let row = voices.get_one_row(&Value::Int(2), None, None).unwrap();
    assert_eq!(row.value("name").unwrap(), text("Organ"));
    assert_eq!(row.key(), Some(&Value::Int(2)));

    let row = voices.get_one_row(&text("piano"), None, None).unwrap();
    assert_eq!(row.value("num").unwrap(), Value::Int(1));

    let row = voices
        .get_one_row(&text("Organ"), None, Some("name"))
        .unwrap();
    assert_eq!(row.line(), 4);
}

#[test]
fn engine_filters_rows() {
    let src = "\
]Patch,ParamTable,none
*,@ident,engine,addr
|,level,jv,(#10)
|,level,xp,(#20)
|,pan,,(#30)
";
    let module = module("engine_demo", src);
    let patch = module.table("Patch").unwrap();

    let row = patch.get_one_row(&text("level"), Some("jv.1080"), None).unwrap();
    assert_eq!(row.value("addr").unwrap(), Value::Int(0x10));

    let err = patch.get_one_row(&text("level"), None, None).unwrap_err();
    assert!(matches!(err, CellError::Uniqueness { .. }), "{err:?}");

    let rows = patch.get_rows(&text("level"), None, None, true).unwrap();
    assert_eq!(rows.len(), 1);

    // Rows without an engine value accept any engine.
    let row = patch.get_one_row(&text("pan"), Some("xp"), None).unwrap();
    assert_eq!(row.value("addr").unwrap(), Value::Int(0x30));
}

#[test]
fn row_and_column_references_resolve_within_the_module() {
    let src = "\
]Addr,MemoryMap,none
*,*id,@ident,base,offset,total,self,again
|,1,common,(#10 00),4,($ offset),(@ @),(@ *)
|,2,tone,(#20 00),(+ 1 ($ Addr common offset)),,,
";
    let module = module("reference_demo", src);
    let addr = module.table("Addr").unwrap();
    let common = addr.get_one_row(&text("common"), None, None).unwrap();
    let tone = addr.get_one_row(&text("tone"), None, None).unwrap();

    // `$` yields the column itself, not its value.
    let Value::Cell(cell) = common.value("total").unwrap() else {
        panic!("expected a cell reference");
    };
    assert_eq!(cell.column(), "offset");
    assert_eq!(cell.evaluate(None, &Symbols::new()).unwrap(), Value::Int(4));

    let Value::Row(same) = common.value("self").unwrap() else {
        panic!("expected a row");
    };
    assert!(Arc::ptr_eq(&same, &common));
    let Value::Row(same) = common.value("again").unwrap() else {
        panic!("expected a row");
    };
    assert!(Arc::ptr_eq(&same, &common));

    let err = tone.value("offset").unwrap_err();
    assert!(matches!(err, CellError::Type { .. }), "{err:?}");
}

#[test]
fn tables_resolve_by_name_in_scope() {
    let module = module("scope_demo", OVERLAY_SRC);
    let b = module.table("B").unwrap();
    let overlay = b.overlay().expect("B has an overlay");
    let Value::Table(parent) = overlay
        .evaluate_in(Scope::table(&b), None, &Symbols::new())
        .unwrap()
    else {
        panic!("overlay should evaluate to a table");
    };
    assert_eq!(parent.name(), "A");
}
