/// Request-scoped context values.
///
/// A [`Context`] is an immutable chain of key/value entries. Deriving a child
/// never touches the parent, so independent call chains can share a common
/// ancestor without seeing each other's values.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Identifies one slot in a [`Context`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextKey(&'static str);

impl ContextKey {
    pub const fn new(name: &'static str) -> Self {
        ContextKey(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

type Value = Arc<dyn Any + Send + Sync>;

struct Entry {
    key: ContextKey,
    value: Value,
    parent: Option<Arc<Entry>>,
}

/// An immutable, cheaply cloneable bag of request-scoped values.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

impl Context {
    /// The empty root context.
    pub fn background() -> Self {
        Context::default()
    }

    /// Returns a child context holding `value` under `key`.
    pub fn with_value<V>(&self, key: ContextKey, value: V) -> Context
    where
        V: Any + Send + Sync,
    {
        self.with_shared(key, Arc::new(value))
    }

    /// Returns a child context holding an already shared value under `key`.
    pub fn with_shared(&self, key: ContextKey, value: Arc<dyn Any + Send + Sync>) -> Context {
        Context {
            head: Some(Arc::new(Entry {
                key,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    /// Looks up the nearest value stored under `key`.
    pub fn value(&self, key: ContextKey) -> Option<Arc<dyn Any + Send + Sync>> {
        let mut entry = self.head.as_ref();
        while let Some(e) = entry {
            if e.key == key {
                return Some(e.value.clone());
            }
            entry = e.parent.as_ref();
        }
        None
    }

    /// Looks up the nearest value under `key` and downcasts it.
    ///
    /// A value of another type yields `None`.
    pub fn get<T>(&self, key: ContextKey) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.value(key)?.downcast::<T>().ok()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut entry = self.head.as_ref();
        while let Some(e) = entry {
            keys.push(e.key.name());
            entry = e.parent.as_ref();
        }
        f.debug_struct("Context").field("keys", &keys).finish()
    }
}
