use std::{collections::BTreeMap, path::Path};

use tracing::debug;

use crate::{
    errors::AppError,
    module::{Deps, Instance},
};

pub(crate) type ModuleFactory = Box<dyn Fn(Deps) -> Result<Instance, AppError> + Send + Sync>;

pub(crate) struct ModuleDescriptor {
    pub(crate) tokens: Vec<String>,
    pub(crate) factory: ModuleFactory,
}

/// Registered module descriptors, keyed by canonical name.
#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: BTreeMap<String, ModuleDescriptor>,
}

impl ModuleRegistry {
    /// Registers a factory under the name derived from `path`.
    ///
    /// # Errors
    /// - [`AppError::IllegalValue`] when no name can be derived from `path`.
    /// - [`AppError::DuplicateEntry`] when the derived name is taken.
    pub(crate) fn register(&mut self, path: &str, tokens: Vec<String>, factory: ModuleFactory) -> Result<String, AppError> {
        let name = derive_name(path)?;
        if self.modules.contains_key(&name) {
            return Err(AppError::DuplicateEntry(format!("module `{name}` is already registered")));
        }
        debug!(module = %name, tokens = tokens.len(), "Module registered");
        self.modules.insert(name.clone(), ModuleDescriptor { tokens, factory });
        Ok(name)
    }

    #[must_use]
    pub(crate) fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.modules.get(name)
    }

    #[must_use]
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &String> {
        self.modules.keys()
    }

    #[must_use]
    pub(crate) fn len(&self) -> usize {
        self.modules.len()
    }
}

/// Derives a canonical module name from a registration path: directories and
/// a trailing extension are stripped, and hyphen-case converts to camelCase
/// (`./modules/my-test-module.js` becomes `myTestModule`).
pub(crate) fn derive_name(path: &str) -> Result<String, AppError> {
    let stem = Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    if stem.is_empty() {
        return Err(AppError::IllegalValue(format!("cannot derive a module name from `{path}`")));
    }

    let mut name = String::with_capacity(stem.len());
    for (index, segment) in stem.split('-').filter(|segment| !segment.is_empty()).enumerate() {
        if index == 0 {
            name.push_str(segment);
        } else {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                name.extend(first.to_uppercase());
                name.push_str(chars.as_str());
            }
        }
    }
    if name.is_empty() {
        return Err(AppError::IllegalValue(format!("cannot derive a module name from `{path}`")));
    }
    Ok(name)
}
