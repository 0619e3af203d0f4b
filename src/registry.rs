//! Name to factory tables for collectors and backends.
//!
//! Entries are registered once at startup through explicit calls and are
//! read-only afterwards, so lookups need no locking.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConfigurationError, RegistryError};

type Factory<A, T, E> = Box<dyn Fn(&A) -> Result<T, E> + Send + Sync>;

/// A name-unique table of factories producing `T` from arguments `A`.
pub struct Registry<A, T, E> {
    label: &'static str,
    factories: BTreeMap<String, Factory<A, T, E>>,
}

impl<A, T, E> Registry<A, T, E>
where
    E: std::error::Error + 'static,
{
    /// Create an empty registry. `label` names the registry in error messages.
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            factories: BTreeMap::new(),
        }
    }

    /// Add a factory under `name`.
    ///
    /// Registering a name twice is a configuration error; the first entry is kept.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<(), ConfigurationError>
    where
        F: Fn(&A) -> Result<T, E> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(ConfigurationError::DuplicateName {
                registry: self.label,
                name,
            });
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Look up the factory registered under `name`.
    pub fn resolve(
        &self,
        name: &str,
    ) -> Result<&(dyn Fn(&A) -> Result<T, E> + Send + Sync), ConfigurationError> {
        self.factories
            .get(name)
            .map(|f| f.as_ref())
            .ok_or_else(|| ConfigurationError::UnknownName {
                registry: self.label,
                name: name.to_string(),
                available: self.available(),
            })
    }

    /// Resolve `name` and invoke its factory, keeping the factory's error as the cause.
    pub fn create(&self, name: &str, args: &A) -> Result<T, RegistryError<E>> {
        let factory = self.resolve(name)?;
        factory(args).map_err(|source| RegistryError::Instantiation {
            registry: self.label,
            name: name.to_string(),
            source,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn list_names(&self) -> BTreeSet<String> {
        self.factories.keys().cloned().collect()
    }

    fn available(&self) -> String {
        if self.factories.is_empty() {
            return "none".to_string();
        }
        self.factories.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}
