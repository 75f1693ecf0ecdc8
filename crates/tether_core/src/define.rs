//! Module definitions: the metadata a resource registers about itself.

use serde_json::Value;

use crate::loader::Scope;

pub type FactoryFn = Box<dyn FnOnce(&mut Scope<'_>) -> anyhow::Result<Option<Value>> + Send>;

/// What a module evaluates to.
pub enum Factory {
    /// The exports are this value; nothing runs.
    Value(Value),
    /// Run once with a lookup scope. `Ok(None)` means "use whatever was put in
    /// `scope.exports()`".
    Function(FactoryFn),
}

impl Factory {
    pub fn function<F>(f: F) -> Self
    where
        F: FnOnce(&mut Scope<'_>) -> anyhow::Result<Option<Value>> + Send + 'static,
    {
        Self::Function(Box::new(f))
    }
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

/// A `define(id?, dependencies?, factory)` call.
///
/// Without an id the definition is anonymous and belongs to whichever fetch
/// completes next. Without a dependency list, dependencies are extracted from
/// `source` when it is present.
#[derive(Debug)]
pub struct Definition {
    pub id: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub factory: Factory,
    pub source: Option<String>,
}

impl Definition {
    pub fn new(factory: Factory) -> Self {
        Self {
            id: None,
            dependencies: None,
            factory,
            source: None,
        }
    }

    pub fn value(value: Value) -> Self {
        Self::new(Factory::Value(value))
    }

    pub fn function<F>(f: F) -> Self
    where
        F: FnOnce(&mut Scope<'_>) -> anyhow::Result<Option<Value>> + Send + 'static,
    {
        Self::new(Factory::function(f))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = Some(dependencies.into_iter().map(Into::into).collect());
        self
    }

    /// Source text to extract dependencies from when none are declared.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// A definition after its dependencies were settled, waiting to be saved.
#[derive(Debug)]
pub(crate) struct Meta {
    pub name: Option<String>,
    pub dependencies: Vec<String>,
    pub factory: Factory,
}
