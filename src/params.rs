use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use crate::errors::AppError;

/// Registered parameter definitions and their values.
///
/// Reads are gated: until initialization finalizes the table, `get` refuses
/// to answer, so no code observes a value that a configuration file could
/// still change.
#[derive(Default)]
pub(crate) struct ParamStore {
    known: BTreeMap<String, bool>,
    values: BTreeMap<String, Value>,
    loaded: bool,
}

impl ParamStore {
    pub(crate) fn register(&mut self, name: &str, required: bool) -> Result<(), AppError> {
        if self.known.contains_key(name) {
            return Err(AppError::DuplicateEntry(format!("parameter `{name}` is already registered")));
        }
        self.known.insert(name.to_owned(), required);
        debug!(name, required, "Parameter registered");
        Ok(())
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) -> Result<(), AppError> {
        if !self.known.contains_key(name) {
            return Err(AppError::IllegalValue(format!("`{name}` is not a registered parameter")));
        }
        self.values.insert(name.to_owned(), value);
        Ok(())
    }

    pub(crate) fn get(&self, name: &str) -> Result<Option<Value>, AppError> {
        if !self.loaded {
            return Err(AppError::General(String::from(
                "parameters cannot be read until initialization has finalized them",
            )));
        }
        let Some(&required) = self.known.get(name) else {
            return Err(AppError::NotFound(format!("parameter `{name}` was never registered")));
        };
        match self.values.get(name) {
            Some(value) => Ok(Some(value.clone())),
            None if required => Err(AppError::NotFound(format!("required parameter `{name}` has no value"))),
            None => Ok(None),
        }
    }

    /// Checks that every required parameter has a value, naming all the ones
    /// that do not. Errors other than a missing value re-raise unchanged.
    pub(crate) fn validate(&self) -> Result<(), AppError> {
        let mut missing = Vec::new();
        for (name, &required) in &self.known {
            if !required {
                continue;
            }
            match self.get(name) {
                Ok(_) => {}
                Err(AppError::NotFound(_)) => missing.push(name.as_str()),
                Err(err) => return Err(err),
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "required parameters have no value: {}",
                missing.join(", ")
            )))
        }
    }

    /// Merges values parsed from a configuration file. Programmatic values
    /// win: a file entry only lands when no value exists yet.
    pub(crate) fn apply_document(&mut self, document: BTreeMap<String, Value>) -> Result<(), AppError> {
        if let Some(unknown) = document.keys().find(|key| !self.known.contains_key(*key)) {
            return Err(AppError::IllegalValue(format!(
                "configuration file sets `{unknown}`, which is not a registered parameter"
            )));
        }
        for (name, value) in document {
            if !self.values.contains_key(&name) {
                debug!(name = %name, "Parameter loaded from configuration file");
                self.values.insert(name, value);
            }
        }
        Ok(())
    }

    pub(crate) fn close_gate(&mut self) {
        self.loaded = true;
    }

    pub(crate) fn config(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }
}

pub(crate) type SharedParams = Arc<RwLock<ParamStore>>;

/// Parameter-access facade handed to modules under the `$Params` token.
///
/// Unlike the registration-phase surface, `set` through the facade remains
/// legal after initialization; modules use it for values they own.
#[derive(Clone)]
pub struct ParamsFacade {
    store: SharedParams,
}

impl ParamsFacade {
    pub(crate) fn new(store: SharedParams) -> Self {
        Self { store }
    }

    /// # Errors
    /// See [`crate::App::get`].
    pub fn get(&self, name: &str) -> Result<Option<Value>, AppError> {
        self.store.read().get(name)
    }

    /// # Errors
    /// Returns [`AppError::IllegalValue`] for a name that was never
    /// registered.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), AppError> {
        self.store.write().set(name, value.into())
    }

    /// # Errors
    /// Returns [`AppError::DuplicateEntry`] if `name` is already registered.
    pub fn register_simple_parameter(&self, name: &str, required: bool) -> Result<(), AppError> {
        self.store.write().register(name, required)
    }

    #[must_use]
    pub fn config(&self) -> BTreeMap<String, Value> {
        self.store.read().config()
    }
}
