use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sysex_codec::packets;
use sysex_engine::{
    load_module, mma_id_len, parse_cell, Cell, LoadOptions, Location, Module, Symbols, Table,
    TableClass,
};

#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(about = "Inspect SysEx protocol modules and decode MIDI dumps against them.")]
struct Args {
    /// Module search path (defaults to `$PSYSEX_MODS`, then the current directory).
    #[arg(long, value_name = "DIR", global = true)]
    mods: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a module and print its tables.
    Module {
        /// Dotted module name (`roland.jv1080`) or path to a `.csv` source.
        name: String,
    },
    /// Split a dump into messages and decode each one with a match pattern.
    Decode {
        /// Module the pattern's references resolve in.
        #[arg(long)]
        module: String,

        /// Match expression, e.g. `(= 1 (#41))`.
        #[arg(long)]
        pattern: String,

        /// VendorTable used to name each message's manufacturer.
        #[arg(long, value_name = "TABLE")]
        vendors: Option<String>,

        /// DeviceTable used to name each message's device (defaults to the
        /// module's only DeviceTable). Needs `--vendors`.
        #[arg(long, value_name = "TABLE", requires = "vendors")]
        devices: Option<String>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Raw dump (`.syx`).
        dump: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct DecodedMessage {
    index: usize,
    length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    consumed: Option<usize>,
    symbols: Symbols,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut options = LoadOptions::from_env();
    if let Some(mods) = args.mods {
        options.search_path = mods;
    }

    match args.command {
        Command::Module { name } => {
            let module = load(&name, &options)?;
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            write!(handle, "{module}")?;
            Ok(())
        }
        Command::Decode {
            module,
            pattern,
            vendors,
            devices,
            format,
            dump,
        } => {
            let module = load(&module, &options)?;
            let pattern = parse_cell(&Location::new(module.name(), 0, 0), &pattern)
                .with_context(|| format!("parse pattern `{pattern}`"))?;
            if !pattern.is_match() {
                bail!("pattern `{pattern}` is not a match expression");
            }
            let vendors = vendors.map(|name| table(&module, &name)).transpose()?;
            let devices = match devices {
                Some(name) => Some(table(&module, &name)?),
                None if vendors.is_some() => only_device_table(&module),
                None => None,
            };
            let tables = Tables {
                vendors: vendors.as_deref(),
                devices: devices.as_deref(),
            };

            let bytes = fs::read(&dump).with_context(|| format!("read dump {}", dump.display()))?;
            let decoded: Vec<DecodedMessage> = packets(&bytes)
                .enumerate()
                .map(|(index, message)| decode_message(index, &message, &pattern, &tables))
                .collect();
            let failures = decoded.iter().filter(|m| m.error.is_some()).count();

            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            match format {
                OutputFormat::Text => {
                    for message in &decoded {
                        write_text(&mut handle, message)?;
                    }
                }
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut handle, &decoded)?;
                    handle.write_all(b"\n")?;
                }
            }
            handle.flush()?;

            if failures > 0 {
                log::warn!("{failures} of {} messages failed to decode", decoded.len());
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

fn load(name: &str, options: &LoadOptions) -> Result<std::sync::Arc<Module>> {
    load_module(name, options).with_context(|| {
        format!(
            "load module {name} (search path {})",
            options.search_path.display()
        )
    })
}

fn table(module: &Module, name: &str) -> Result<std::sync::Arc<Table>> {
    module
        .table(name)
        .with_context(|| format!("module {} has no table {name}", module.name()))
}

fn only_device_table(module: &Module) -> Option<std::sync::Arc<Table>> {
    let mut devices = module
        .tables()
        .iter()
        .filter(|table| table.class() == TableClass::Device);
    match (devices.next(), devices.next()) {
        (Some(table), None) => Some(table.clone()),
        (Some(_), Some(_)) => {
            log::info!("module {} has several DeviceTables; name one with --devices", module.name());
            None
        }
        _ => None,
    }
}

/// Tables that name where each message came from.
struct Tables<'a> {
    vendors: Option<&'a Table>,
    devices: Option<&'a Table>,
}

fn decode_message(
    index: usize,
    message: &[u8],
    pattern: &Cell,
    tables: &Tables<'_>,
) -> DecodedMessage {
    let mut decoded = DecodedMessage {
        index,
        length: message.len(),
        vendor: None,
        device: None,
        consumed: None,
        symbols: Symbols::new(),
        error: None,
    };

    if let Some(vendors) = tables.vendors {
        match vendors.mma_lookup(message) {
            Ok(row) => match row.value("ident") {
                Ok(vendor) => {
                    decoded.vendor = Some(vendor.to_string());
                    if let Some(devices) = tables.devices {
                        let body = &message[mma_id_len(message)..];
                        match devices.sniff(body, &vendor) {
                            Ok(device) => {
                                decoded.device = device.value("ident").ok().map(|v| v.to_string())
                            }
                            Err(err) => log::debug!("message {index}: no device: {err}"),
                        }
                    }
                }
                Err(err) => log::debug!("message {index}: vendor row has no ident: {err}"),
            },
            Err(err) => log::debug!("message {index}: no vendor: {err}"),
        }
    }

    let mut cursor = message;
    match pattern.decode(&mut cursor, &mut decoded.symbols) {
        Ok(consumed) => decoded.consumed = Some(consumed),
        Err(err) => decoded.error = Some(err.to_string()),
    }
    decoded
}

fn write_text(out: &mut impl Write, message: &DecodedMessage) -> Result<()> {
    write!(out, "message {} ({} bytes", message.index, message.length)?;
    if let Some(consumed) = message.consumed {
        write!(out, ", {consumed} decoded")?;
    }
    write!(out, ")")?;
    if let Some(vendor) = &message.vendor {
        write!(out, " from {vendor}")?;
    }
    if let Some(device) = &message.device {
        write!(out, " {device}")?;
    }
    writeln!(out)?;
    for (name, value) in &message.symbols {
        writeln!(out, "  {name} = {value}")?;
    }
    if let Some(error) = &message.error {
        writeln!(out, "  error: {error}")?;
    }
    Ok(())
}
