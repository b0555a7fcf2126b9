//! Function registry keyed by exact request path.
//!
//! Function names are stored as the full path including one leading slash:
//! registering `"hello"` or `"/hello"` binds `POST /hello`, and `""` binds
//! `POST /`. Lookups are exact; `/hello/` does not match `/hello`.
//!
//! Registering a name twice replaces the earlier function (last registration
//! wins) and logs a warning. The registry is filled before the server starts
//! listening and is read-only afterwards.

use crate::function::handler::FunctionHandler;
use crate::schema::{CompiledSerializer, FunctionSchema, SchemaError, SerializerRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Normalise a function name to the path it is served on.
pub fn route_key(name: &str) -> String {
    format!("/{}", name.trim_start_matches('/'))
}

/// Result of a successful lookup.
#[derive(Clone)]
pub struct Route {
    pub handler: Arc<dyn FunctionHandler>,
    pub serializer: Option<Arc<CompiledSerializer>>,
}

/// Registry of functions and their compiled serializers.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn FunctionHandler>>,
    serializers: SerializerRegistry,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `name`; success responses use generic JSON encoding.
    ///
    /// Returns the path the function is served on.
    pub fn register(&mut self, name: &str, handler: impl FunctionHandler) -> String {
        let key = route_key(name);
        self.serializers.remove(&key);
        self.insert(key.clone(), Arc::new(handler));
        key
    }

    /// Bind `handler` to `name` and compile `schema.response` for its success responses.
    ///
    /// Nothing is registered if the schema does not compile.
    pub fn register_with_schema(
        &mut self,
        name: &str,
        schema: &FunctionSchema,
        handler: impl FunctionHandler,
    ) -> Result<String, SchemaError> {
        let key = route_key(name);
        self.serializers.compile_and_insert(key.clone(), schema)?;
        self.insert(key.clone(), Arc::new(handler));
        Ok(key)
    }

    fn insert(&mut self, key: String, handler: Arc<dyn FunctionHandler>) {
        if self.functions.insert(key.clone(), handler).is_some() {
            warn!(function = %key, "replacing previously registered function");
        } else {
            info!(function = %key, "registered function");
        }
    }

    /// Look up the function served on `path`.
    pub fn resolve(&self, path: &str) -> Option<Route> {
        let handler = self.functions.get(path)?;
        Some(Route {
            handler: Arc::clone(handler),
            serializer: self.serializers.get(path).cloned(),
        })
    }

    pub fn contains(&self, path: &str) -> bool {
        self.functions.contains_key(path)
    }

    pub fn has_serializer(&self, path: &str) -> bool {
        self.serializers.get(path).is_some()
    }

    /// Registered paths, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{success, Envelope};
    use crate::function::handler::{HandlerError, RequestContext};
    use crate::http::RawRequest;
    use serde_json::json;

    async fn hello(_req: RawRequest, _ctx: RequestContext) -> Result<Envelope, HandlerError> {
        Ok(success(json!({"message": "hello world"})))
    }

    #[test]
    fn test_route_key() {
        assert_eq!(route_key("hello"), "/hello");
        assert_eq!(route_key("/hello"), "/hello");
        assert_eq!(route_key(""), "/");
        assert_eq!(route_key("/"), "/");
        assert_eq!(route_key("a/b"), "/a/b");
    }

    #[test]
    fn test_exact_lookup() {
        let mut registry = FunctionRegistry::new();
        assert_eq!(registry.register("hello", hello), "/hello");

        assert!(registry.resolve("/hello").is_some());
        assert!(registry.resolve("/hello/").is_none());
        assert!(registry.resolve("hello").is_none());
        assert!(registry.resolve("/HELLO").is_none());
    }

    #[test]
    fn test_root_function() {
        let mut registry = FunctionRegistry::new();
        registry.register("", hello);
        assert!(registry.contains("/"));
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = FunctionRegistry::new();
        let schema = FunctionSchema::new(json!({"type": "object"}));
        registry.register_with_schema("two", &schema, hello).unwrap();
        assert!(registry.has_serializer("/two"));

        registry.register("two", hello);
        assert_eq!(registry.len(), 1);
        assert!(!registry.has_serializer("/two"));
        assert!(registry.resolve("/two").unwrap().serializer.is_none());
    }

    #[test]
    fn test_bad_schema_registers_nothing() {
        let mut registry = FunctionRegistry::new();
        let schema = FunctionSchema::new(json!({"type": "object", "properties": 3}));
        assert!(registry.register_with_schema("broken", &schema, hello).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = FunctionRegistry::new();
        registry.register("zeta", hello);
        registry.register("alpha", hello);
        assert_eq!(registry.names(), vec!["/alpha", "/zeta"]);
    }
}
