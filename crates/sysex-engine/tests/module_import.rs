use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use sysex_engine::{
    load_module, lookup, module::registered, read_module, CellError, LoadError, LoadOptions,
    Module, TableClass, Value,
};

fn read(name: &str, src: &str) -> Result<Arc<Module>, LoadError> {
    read_module(name, src.as_bytes(), &LoadOptions::default())
}

fn write_module(root: &Path, relative: &str, src: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("module path has a parent")).expect("create dirs");
    fs::write(path, src).expect("write module source");
}

fn metadata_message(err: LoadError) -> String {
    match err {
        LoadError::Cell(CellError::Metadata { message, .. }) => message,
        other => panic!("expected a metadata error, got {other:?}"),
    }
}

const SYNTH_SRC: &str = "\
# Example synth,,
]]Manufacturer ids,,
]Vendors,VendorTable,none
*,@ident,*mma_id,name
|,roland,(#41),Roland
|,yamaha,(#43),Yamaha
]Contents,TOC,none
*,@ident,#,ignored
|,vendors,,
!END,,
]Never,CTRLTable,none
";

#[test]
fn tables_carry_class_description_and_rows() {
    let module = read("synth_demo", SYNTH_SRC).unwrap();
    let names: Vec<&str> = module.tables().iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["Vendors", "TOC"]);

    let vendors = module.table("Vendors").unwrap();
    assert_eq!(vendors.class(), TableClass::Vendor);
    assert_eq!(vendors.description(), Some("Manufacturer ids"));
    assert_eq!(vendors.key_column(), Some("mma_id"));
    assert_eq!(vendors.len(), 2);

    let toc = module.table("TOC").unwrap();
    assert_eq!(toc.class(), TableClass::Toc);
    assert_eq!(toc.description(), None);
    assert_eq!(toc.schema().data_columns().collect::<Vec<_>>(), vec!["ident"]);
}

#[test]
fn record_after_rows_starts_the_next_table() {
    let src = "\
]First,CTRLTable,none
*,@ident,value
|,a,1
]Second,CTRLTable,none
*,@ident,value
# comment between rows,,
|,b,2
|,c,3
";
    let module = read("adjacent_tables", src).unwrap();
    assert_eq!(module.table("First").unwrap().len(), 1);
    let second = module.table("Second").unwrap();
    assert_eq!(second.len(), 2);
    let row = second.get_one_row(&Value::from("c"), None, None).unwrap();
    assert_eq!(row.line(), 8);
}

#[test]
fn malformed_headers_are_metadata_errors() {
    assert_eq!(
        metadata_message(read("short_row", "]T,CTRLTable\n").unwrap_err()),
        "row has fewer than 3 columns"
    );
    assert_eq!(
        metadata_message(read("no_name", "],CTRLTable,none\n").unwrap_err()),
        "missing table name"
    );
    assert_eq!(
        metadata_message(read("no_overlay", "]T,CTRLTable,\n").unwrap_err()),
        "missing table overlay"
    );
    assert_eq!(
        metadata_message(read("bad_class", "]T,SpreadsheetTable,none\n").unwrap_err()),
        "unknown table class `SpreadsheetTable`"
    );
    assert_eq!(
        metadata_message(read("no_header", "*,@ident,value\n").unwrap_err()),
        "\"*\" but no table header"
    );
    assert_eq!(
        metadata_message(read("orphan_row", "|,a,1\n").unwrap_err()),
        "missing table header"
    );
}

#[test]
fn duplicate_table_names_are_rejected() {
    let src = "\
]T,CTRLTable,none
*,@ident,x
]T,CTRLTable,none
*,@ident,x
";
    let err = read("duplicate_tables", src).unwrap_err();
    assert!(
        matches!(err, LoadError::Cell(CellError::Uniqueness { .. })),
        "{err:?}"
    );
}

#[test]
fn cell_errors_report_their_location() {
    let src = "\
]Bad,CTRLTable,none
*,@ident,value
|,a,(+ 1 two)
";
    let err = read("bad_cell", src).unwrap_err();
    let (loc, text) = match err {
        LoadError::Cell(CellError::Encoding { loc, text, .. }) => (loc, text),
        other => panic!("expected an encoding error, got {other:?}"),
    };
    assert_eq!(text, "two");
    assert_eq!(loc.to_string(), "bad_cell/Bad:3:2[1]");
}

#[test]
fn failed_lookups_name_the_cell_that_asked() {
    let src = "\
]Refs,CTRLTable,none
*,@ident,target
|,lost,(! lookup_loc_nowhere)
|,stray,(@ Refs missing)
";
    let module = read("lookup_loc", src).unwrap();
    let refs = module.table("Refs").unwrap();

    let lost = refs.get_one_row(&Value::from("lost"), None, None).unwrap();
    let err = lost.value("target").unwrap_err();
    assert_eq!(
        err.to_string(),
        "lookup_loc/Refs:3:2: module lookup_loc_nowhere: not registered"
    );

    let stray = refs.get_one_row(&Value::from("stray"), None, None).unwrap();
    let err = stray.value("target").unwrap_err();
    assert!(matches!(&err, CellError::Lookup { loc: Some(_), kind: "row", .. }), "{err:?}");
    assert!(
        err.to_string().starts_with("lookup_loc/Refs:4:2: row Refs: no values found"),
        "{err}"
    );
}

#[test]
fn load_module_resolves_dotted_names_and_registers() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_module(dir.path(), "acme/base.csv", SYNTH_SRC);
    write_module(
        dir.path(),
        "acme/model.csv",
        "\
]Vendors,VendorTable,(] acme.base Vendors)
*,@ident,*mma_id,name
|,korg,(#42),Korg
",
    );
    let options = LoadOptions {
        search_path: dir.path().to_path_buf(),
        ..LoadOptions::default()
    };

    let base = load_module("acme.base", &options).unwrap();
    assert!(Arc::ptr_eq(&base, &lookup("acme.base").unwrap()));
    assert!(registered().contains(&"acme.base".to_string()));

    // A second load hands back the registered module.
    let again = load_module("acme.base", &options).unwrap();
    assert!(Arc::ptr_eq(&base, &again));

    let model = load_module("acme/model.csv", &options).unwrap();
    assert_eq!(model.name(), "acme.model");
    let vendors = model.table("Vendors").unwrap();
    let roland = vendors.get_one_row(&Value::from("roland"), None, None).unwrap();
    assert_eq!(roland.module_name(), "acme.base");
    let korg = vendors.get_one_row(&Value::from("korg"), None, None).unwrap();
    assert_eq!(korg.value("name").unwrap(), Value::from("Korg"));
}

#[test]
fn missing_source_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let options = LoadOptions {
        search_path: dir.path().to_path_buf(),
        ..LoadOptions::default()
    };
    let err = load_module("nowhere.to.be.found", &options).unwrap_err();
    let (module, path) = match err {
        LoadError::Io { module, path, .. } => (module, path),
        other => panic!("expected an io error, got {other:?}"),
    };
    assert_eq!(module, "nowhere.to.be.found");
    assert!(path.ends_with("nowhere/to/be/found.csv"), "{}", path.display());
    assert!(lookup("nowhere.to.be.found").is_err());
}

#[test]
fn modules_reference_each_other_through_the_registry() {
    let src = "\
]Links,CTRLTable,none
*,@ident,target
|,other,(! linked_demo)
";
    let module = read("linked_demo", src).unwrap();
    let links = module.table("Links").unwrap();
    let row = links.get_one_row(&Value::from("other"), None, None).unwrap();
    let err = row.value("target").unwrap_err();
    assert!(matches!(err, CellError::Lookup { kind: "module", .. }), "{err:?}");

    sysex_engine::register(module.clone()).unwrap();
    let Value::Module(found) = row.value("target").unwrap() else {
        panic!("expected a module");
    };
    assert!(Arc::ptr_eq(&found, &module));

    let err = sysex_engine::register(module).unwrap_err();
    assert!(matches!(err, CellError::Uniqueness { .. }), "{err:?}");
}
