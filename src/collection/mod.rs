//! Collections.
//!
//! A [`Collection`] binds a name, a compiled rule table, a capability set,
//! and named method/static handlers. Collections are created once at
//! startup and live for the process lifetime; they are the unit exposed to
//! the RPC surface.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::config::CollectionConfig;
use crate::mask::DocumentMasker;
use crate::rules::{Declaration, RuleError, RuleTable};

/// Handler for a document-scoped method: `(document, args) -> result`.
pub type MethodHandler =
    Arc<dyn Fn(Value, Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Handler for a collection-level static operation: `(args) -> result`.
pub type StaticHandler =
    Arc<dyn Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Which data operations a collection supports.
///
/// The dispatcher checks these flags directly instead of probing for
/// handler existence at runtime.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub document: bool,
    pub save: bool,
    pub validate: bool,
    pub query: bool,
    pub create: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

impl Capabilities {
    /// Every data operation enabled.
    pub fn all() -> Self {
        Self {
            document: true,
            save: true,
            validate: true,
            query: true,
            create: true,
        }
    }

    /// Reads only: `document` and `query`.
    pub fn read_only() -> Self {
        Self {
            document: true,
            save: false,
            validate: false,
            query: true,
            create: false,
        }
    }
}

/// A named set of rule-gated documents plus its operations.
pub struct Collection {
    name: String,
    masker: DocumentMasker,
    capabilities: Capabilities,
    methods: HashMap<String, MethodHandler>,
    statics: HashMap<String, StaticHandler>,
}

impl Collection {
    pub fn builder(name: impl Into<String>) -> CollectionBuilder {
        CollectionBuilder {
            name: name.into(),
            declaration: Declaration::new(),
            capabilities: Capabilities::default(),
            methods: HashMap::new(),
            statics: HashMap::new(),
        }
    }

    /// Build a collection from its config declaration. Method and static
    /// handlers cannot come from config; register them through
    /// [`CollectionBuilder`] instead.
    pub fn from_config(config: &CollectionConfig) -> Result<Self, RuleError> {
        let declaration = config.rules.compile()?;
        Ok(Collection::builder(&config.name)
            .rules(declaration)
            .capabilities(config.capabilities.into())
            .build())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &Arc<RuleTable> {
        self.masker.table()
    }

    pub fn masker(&self) -> &DocumentMasker {
        &self.masker
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn method(&self, name: &str) -> Option<&MethodHandler> {
        self.methods.get(name)
    }

    pub fn static_handler(&self, name: &str) -> Option<&StaticHandler> {
        self.statics.get(name)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("rules", &self.table().len())
            .field("methods", &self.methods.len())
            .field("statics", &self.statics.len())
            .finish()
    }
}

/// Builder for code-registered collections.
pub struct CollectionBuilder {
    name: String,
    declaration: Declaration,
    capabilities: Capabilities,
    methods: HashMap<String, MethodHandler>,
    statics: HashMap<String, StaticHandler>,
}

impl CollectionBuilder {
    /// Set the rule declaration (compiled on `build`).
    pub fn rules(mut self, declaration: Declaration) -> Self {
        self.declaration = declaration;
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Register a method handler. Its rule lives in the declaration under
    /// the same name.
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>>
            + Send
            + Sync
            + 'static,
    {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register a static operation handler.
    pub fn static_op<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Vec<Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync + 'static,
    {
        self.statics.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn build(self) -> Collection {
        let table = Arc::new(RuleTable::compile(&self.declaration));
        Collection {
            name: self.name,
            masker: DocumentMasker::new(table),
            capabilities: self.capabilities,
            methods: self.methods,
            statics: self.statics,
        }
    }
}
