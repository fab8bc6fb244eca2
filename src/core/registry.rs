//! Typed handler registry resolved once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::RuntimeError;

/// Maps a handler name, as written in configuration or on a job record, to
/// its implementation.
pub struct HandlerRegistry<H: ?Sized> {
    handlers: HashMap<String, Arc<H>>,
}

impl<H: ?Sized> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<H: ?Sized> Clone for HandlerRegistry<H> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<H: ?Sized> HandlerRegistry<H> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, handler: Arc<H>) -> Self {
        self.register(name, handler);
        self
    }

    /// Register a handler under `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<H>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(handler = %name, "handler replaced");
        }
    }

    /// Look a handler up by name.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when nothing is registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<H>, RuntimeError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::InvalidConfig(format!("no handler registered as `{name}`")))
    }

    /// Whether a handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct Hello;

    impl Greeter for Hello {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_resolve_registered_handler() {
        let registry = HandlerRegistry::<dyn Greeter>::new().with("hello", Arc::new(Hello));
        assert_eq!(registry.resolve("hello").unwrap().greet(), "hello");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_handler_fails() {
        let registry = HandlerRegistry::<dyn Greeter>::new();
        let err = registry.resolve("missing").err().unwrap();
        assert!(matches!(err, RuntimeError::InvalidConfig(_)));
    }
}
