//! Modules and the process-wide module registry.
//!
//! `(! name)` references resolve through the registry, so a module has to be
//! [`register`]ed before cells of other modules can reach it. Registration
//! is append-only.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::error::{CellError, CellResult, Location};
use crate::table::{Table, TableBuilder};

/// A named, immutable collection of tables.
pub struct Module {
    name: String,
    tables: Vec<Arc<Table>>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables.iter().find(|table| table.name() == name).cloned()
    }

    pub fn tables(&self) -> &[Arc<Table>] {
        &self.tables
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field(
                "tables",
                &self.tables.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Module {}", self.name)?;
        for table in &self.tables {
            write!(f, "{table}")?;
        }
        Ok(())
    }
}

/// Collects tables until the module is frozen.
pub struct ModuleBuilder {
    name: String,
    tables: Vec<TableBuilder>,
}

impl ModuleBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a table; table names are unique within a module.
    pub fn add_table(&mut self, table: TableBuilder) -> CellResult<()> {
        if self.tables.iter().any(|t| t.name() == table.name()) {
            return Err(CellError::uniqueness(
                &Location::new(self.name.clone(), 0, 0),
                format!("duplicate table name `{}`", table.name()),
            ));
        }
        self.tables.push(table);
        Ok(())
    }

    /// Freeze the module. Its tables keep a weak back reference to it, so
    /// single-name table references resolve within the module even before
    /// it is registered.
    pub fn build(self) -> Arc<Module> {
        let name = self.name;
        let builders = self.tables;
        Arc::new_cyclic(|this| Module {
            name,
            tables: builders
                .into_iter()
                .map(|builder| builder.build_in(this.clone()))
                .collect(),
        })
    }
}

type Registry = RwLock<HashMap<String, Arc<Module>>>;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Default::default)
}

/// Make `module` reachable by name. A name can only be registered once.
pub fn register(module: Arc<Module>) -> CellResult<Arc<Module>> {
    let mut modules = registry().write().unwrap_or_else(PoisonError::into_inner);
    if modules.contains_key(module.name()) {
        return Err(CellError::uniqueness(
            &Location::new(module.name(), 0, 0),
            format!("module {} is already registered", module.name()),
        ));
    }
    log::debug!(
        "registered module {} ({} tables)",
        module.name(),
        module.tables().len()
    );
    modules.insert(module.name().to_string(), module.clone());
    Ok(module)
}

pub fn lookup(name: &str) -> CellResult<Arc<Module>> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
        .ok_or_else(|| CellError::lookup("module", name, "not registered", ""))
}

/// Names of all registered modules, sorted.
pub fn registered() -> Vec<String> {
    let mut names: Vec<String> = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}
