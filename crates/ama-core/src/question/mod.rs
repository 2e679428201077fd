mod graph;

use std::collections::HashMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::template::{Template, TemplateError};
use crate::validator::{Registry, RegistryError, Validator};

pub use graph::DependencyGraph;

/// Definition of a single question, as supplied by the question source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct QuestionSpec {
    pub key: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, rename = "help", skip_serializing_if = "String::is_empty")]
    pub help_text: String,
    #[serde(default = "default_validator", rename = "validator")]
    pub validator_name: String,
    #[serde(default, rename = "spec", skip_serializing_if = "Option::is_none")]
    pub validator_spec: Option<String>,
    #[serde(default, rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_template: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

fn default_validator() -> String {
    "str".into()
}

impl QuestionSpec {
    /// Minimal question with a validator and no default.
    pub fn new(key: impl Into<String>, validator_name: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            label: key.clone(),
            key,
            help_text: String::new(),
            validator_name: validator_name.into(),
            validator_spec: None,
            default_template: None,
            required: true,
        }
    }

    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.validator_spec = Some(spec.into());
        self
    }

    pub fn with_default(mut self, template: impl Into<String>) -> Self {
        self.default_template = Some(template.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help_text = help.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

/// Definition-time errors; the set is refused as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("duplicate question key '{0}'")]
    DuplicateKey(String),
    #[error("question '{key}' has an invalid default template: {source}")]
    InvalidTemplate {
        key: String,
        #[source]
        source: TemplateError,
    },
    #[error("question '{key}' references unknown question '{dependency}'")]
    UnknownDependency { key: String, dependency: String },
    #[error("question '{key}': {source}")]
    Validator {
        key: String,
        #[source]
        source: RegistryError,
    },
}

pub(crate) struct Entry {
    pub(crate) spec: QuestionSpec,
    pub(crate) template: Template,
    pub(crate) validator: Validator,
}

/// Ordered, immutable question definitions plus their dependency graph.
pub struct QuestionSet {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    graph: DependencyGraph,
}

impl fmt::Debug for QuestionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionSet")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .field("graph", &self.graph)
            .finish()
    }
}

impl QuestionSet {
    /// Parses every default template, resolves every validator and builds the
    /// dependency graph. Cycles are accepted here.
    pub fn build(questions: Vec<QuestionSpec>, registry: &Registry) -> Result<Self, BuildError> {
        let mut index = HashMap::with_capacity(questions.len());
        for (position, question) in questions.iter().enumerate() {
            if index.insert(question.key.clone(), position).is_some() {
                return Err(BuildError::DuplicateKey(question.key.clone()));
            }
        }

        let mut entries = Vec::with_capacity(questions.len());
        let mut edges = Vec::with_capacity(questions.len());
        for spec in questions {
            let template = match &spec.default_template {
                Some(source) => {
                    Template::parse(source).map_err(|source| BuildError::InvalidTemplate {
                        key: spec.key.clone(),
                        source,
                    })?
                }
                None => Template::default(),
            };

            let mut dependencies = Vec::new();
            for dependency in template.fields() {
                let Some(&target) = index.get(dependency) else {
                    return Err(BuildError::UnknownDependency {
                        key: spec.key.clone(),
                        dependency: dependency.to_string(),
                    });
                };
                dependencies.push(target);
            }
            edges.push(dependencies);

            let validator = registry
                .resolve(&spec.validator_name, spec.validator_spec.as_deref())
                .map_err(|source| BuildError::Validator {
                    key: spec.key.clone(),
                    source,
                })?;
            entries.push(Entry {
                spec,
                template,
                validator,
            });
        }

        let graph = DependencyGraph::from_edges(edges);
        debug!(
            questions = entries.len(),
            edges = graph.edge_count(),
            "built question set"
        );
        Ok(Self {
            entries,
            index,
            graph,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&QuestionSpec> {
        self.position(key).map(|idx| &self.entries[idx].spec)
    }

    /// Definition index of `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Questions in definition order.
    pub fn iter(&self) -> impl Iterator<Item = &QuestionSpec> {
        self.entries.iter().map(|entry| &entry.spec)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.spec.key.as_str())
    }

    pub fn validator(&self, key: &str) -> Option<&Validator> {
        self.position(key).map(|idx| &self.entries[idx].validator)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Keys referenced by `key`'s default, in definition order.
    pub fn depends_on(&self, key: &str) -> Vec<&str> {
        self.neighbours(key, DependencyGraph::depends_on)
    }

    /// Keys whose defaults reference `key`, in definition order.
    pub fn depended_on_by(&self, key: &str) -> Vec<&str> {
        self.neighbours(key, DependencyGraph::depended_on_by)
    }

    fn neighbours<'a>(
        &'a self,
        key: &str,
        edges: fn(&DependencyGraph, usize) -> &[usize],
    ) -> Vec<&'a str> {
        self.position(key)
            .map(|idx| {
                edges(&self.graph, idx)
                    .iter()
                    .map(|&other| self.entries[other].spec.key.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn entry(&self, idx: usize) -> &Entry {
        &self.entries[idx]
    }
}

/// JSON schema describing a list of question records.
pub fn question_schema() -> schemars::Schema {
    schemars::schema_for!(Vec<QuestionSpec>)
}
