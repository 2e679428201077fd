//! Named, parameterized validators.
//!
//! A [`Registry`] maps validator names to factories. Resolving a
//! `(name, spec)` pair parses the spec into [`SpecArgs`], invokes the factory
//! and caches the resulting [`Validator`] for the literal pair.

mod builtin;
mod path;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::spec_args::{SpecArgs, SpecError};
use crate::value::AnswerValue;

/// Failure kinds reported by a validator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The input has the wrong shape for this validator.
    Type,
    /// The input has the right shape but fails a constraint.
    Value,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Type => f.write_str("type error"),
            ErrorKind::Value => f.write_str("value error"),
        }
    }
}

/// Rejection returned by a validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ValidationError {
    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Type,
            message: message.into(),
        }
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Value,
            message: message.into(),
        }
    }
}

/// A resolved validator: coerces the raw value or rejects it.
pub type Validator =
    Arc<dyn Fn(&AnswerValue) -> Result<AnswerValue, ValidationError> + Send + Sync>;

/// Builds a validator from parsed parameters.
pub type ValidatorFactory = Arc<dyn Fn(&SpecArgs) -> Result<Validator, SpecError> + Send + Sync>;

/// Wraps a closure as a [`Validator`].
pub fn validator<F>(func: F) -> Validator
where
    F: Fn(&AnswerValue) -> Result<AnswerValue, ValidationError> + Send + Sync + 'static,
{
    Arc::new(func)
}

/// Resolves `module:function` validator references supplied by plugins.
pub trait PluginLoader: Send + Sync {
    fn load(&self, reference: &str) -> Option<ValidatorFactory>;
}

impl<F> PluginLoader for F
where
    F: Fn(&str) -> Option<ValidatorFactory> + Send + Sync,
{
    fn load(&self, reference: &str) -> Option<ValidatorFactory> {
        self(reference)
    }
}

/// RFC-grade address checker consulted by the `email` validator.
pub trait EmailChecker: Send + Sync {
    fn is_email(&self, address: &str) -> bool;
}

/// Errors raised while resolving a validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown validator '{0}'")]
    UnknownValidator(String),
    #[error("invalid spec '{spec}' for validator '{name}': {source}")]
    InvalidSpec {
        name: String,
        spec: String,
        #[source]
        source: SpecError,
    },
}

static PLUGIN_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+(\.\w+)*:\w+(\.\w+)*$").expect("plugin reference regex"));

/// Returns true for `module:function` shaped names.
pub fn is_plugin_reference(name: &str) -> bool {
    PLUGIN_REFERENCE.is_match(name)
}

/// Validator registry owned by the host application.
#[derive(Default)]
pub struct Registry {
    factories: HashMap<String, ValidatorFactory>,
    cache: DashMap<(String, String), Validator>,
    plugins: Option<Arc<dyn PluginLoader>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.factories.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("Registry")
            .field("validators", &names)
            .field("cached", &self.cache.len())
            .field("plugins", &self.plugins.is_some())
            .finish()
    }
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in validator.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    /// Adds or replaces a named factory. Cached instances of `name` are dropped.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&SpecArgs) -> Result<Validator, SpecError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.cache.retain(|(cached, _), _| *cached != name);
        self.factories.insert(name, Arc::new(factory));
    }

    /// Installs the collaborator used for `module:function` names.
    pub fn set_plugin_loader(&mut self, loader: impl PluginLoader + 'static) {
        self.plugins = Some(Arc::new(loader));
    }

    /// Routes `email` through `checker` unless the spec asks for the regex.
    pub fn set_email_checker(&mut self, checker: impl EmailChecker + 'static) {
        let checker: Arc<dyn EmailChecker> = Arc::new(checker);
        self.register("email", move |args: &SpecArgs| {
            builtin::email(args, Some(checker.clone()))
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Resolves `(name, spec)` to a validator, caching the result.
    pub fn resolve(&self, name: &str, spec: Option<&str>) -> Result<Validator, RegistryError> {
        let key = (name.to_string(), spec.unwrap_or_default().to_string());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.value().clone());
        }

        let factory = self.factory(name)?;
        let invalid = |source: SpecError| RegistryError::InvalidSpec {
            name: name.to_string(),
            spec: key.1.clone(),
            source,
        };
        let args = SpecArgs::parse(spec).map_err(invalid)?;
        let resolved = factory(&args).map_err(invalid)?;
        debug!(validator = name, spec = %key.1, "resolved validator");
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }

    fn factory(&self, name: &str) -> Result<ValidatorFactory, RegistryError> {
        if let Some(factory) = self.factories.get(name) {
            return Ok(factory.clone());
        }
        if is_plugin_reference(name)
            && let Some(loader) = &self.plugins
            && let Some(factory) = loader.load(name)
        {
            debug!(reference = name, "loaded plugin validator");
            return Ok(factory);
        }
        Err(RegistryError::UnknownValidator(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_reference_shape() {
        assert!(is_plugin_reference("mypkg.checks:postcode"));
        assert!(is_plugin_reference("checks:postcode"));
        assert!(!is_plugin_reference("postcode"));
        assert!(!is_plugin_reference("checks:"));
    }

    #[test]
    fn register_evicts_cached_instances() {
        let mut registry = Registry::with_builtins();
        let before = registry.resolve("str", None).expect("builtin");
        assert_eq!(
            before(&AnswerValue::from("x")).expect("valid"),
            AnswerValue::from("x")
        );

        registry.register("str", |_: &SpecArgs| {
            Ok(validator(|_| Ok(AnswerValue::from("overridden"))))
        });
        let after = registry.resolve("str", None).expect("override");
        assert_eq!(
            after(&AnswerValue::from("x")).expect("valid"),
            AnswerValue::from("overridden")
        );
    }
}
