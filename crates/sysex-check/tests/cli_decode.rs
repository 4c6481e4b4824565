use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use pretty_assertions::assert_eq;

const MODULE_SRC: &str = "\
]]Manufacturers seen in the test dump,,
]Vendors,VendorTable,none
*,@ident,mma_id
|,roland,(#41)
|,yamaha,(#43)
]Devices,DeviceTable,none
*,@ident,proto_id
|,tg,(#6A)
";

fn setup(dir: &Path) {
    fs::create_dir_all(dir.join("test")).expect("create module dir");
    fs::write(dir.join("test/synth.csv"), MODULE_SRC).expect("write module");
    fs::write(
        dir.join("dump.syx"),
        [
            0xF0, 0x41, 0x10, 0x6A, 0x12, 0xF7, 0xFE, 0xF0, 0x43, 0x10, 0x6A, 0x12, 0xF7,
        ],
    )
    .expect("write dump");
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sysex-check"))
        .arg("--mods")
        .arg(dir)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run sysex-check")
}

#[test]
fn module_command_prints_tables() {
    let dir = tempfile::tempdir().expect("temp dir");
    setup(dir.path());
    let output = run(dir.path(), &["module", "test.synth"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Module test.synth\n"), "{stdout}");
    assert!(stdout.contains("Table Vendors (VendorTable)"), "{stdout}");
    assert!(stdout.contains("Manufacturers seen in the test dump"), "{stdout}");
}

#[test]
fn decode_command_emits_json_per_message() {
    let dir = tempfile::tempdir().expect("temp dir");
    setup(dir.path());
    let dump = dir.path().join("dump.syx");
    let output = run(
        dir.path(),
        &[
            "decode",
            "--module",
            "test.synth",
            "--pattern",
            "(= 0 msg (= 1 maker) (= 1 device (& (#0F))))",
            "--vendors",
            "Vendors",
            "--format",
            "json",
            dump.to_str().expect("utf-8 path"),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let decoded: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is JSON");
    let messages = decoded.as_array().expect("array of messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["vendor"], "roland");
    assert_eq!(messages[0]["consumed"], 4);
    assert_eq!(messages[0]["symbols"]["maker"], serde_json::json!([0x41]));
    // Nested matches each re-read the whole window.
    assert_eq!(messages[0]["symbols"]["device"], 1);
    // Only vendors with a sniffer name a device.
    assert_eq!(messages[0].get("device"), None);
    assert_eq!(messages[1]["vendor"], "yamaha");
    assert_eq!(messages[1]["device"], "tg");
    assert_eq!(messages[1]["symbols"]["device"], 3);
}

#[test]
fn decode_failures_set_the_exit_code() {
    let dir = tempfile::tempdir().expect("temp dir");
    setup(dir.path());
    let dump = dir.path().join("dump.syx");
    let output = run(
        dir.path(),
        &[
            "decode",
            "--module",
            "test.synth",
            "--pattern",
            "(= 1 (#41))",
            dump.to_str().expect("utf-8 path"),
        ],
    );
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("message 0 (4 bytes, 1 decoded)"), "{stdout}");
    assert!(stdout.contains("byte stream mismatch"), "{stdout}");
}

#[test]
fn unknown_module_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let output = run(dir.path(), &["module", "missing.module"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("load module missing.module"), "{stderr}");
}
