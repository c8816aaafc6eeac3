//! Module Registry.
//!
//! Named modules (database clients, stores, external API wrappers) are
//! registered once at startup as async factories and resolved lazily the
//! first time a handler asks for them. The resolved instance is cached for the
//! lifetime of the registry and shared by every request.
//!
//! # Example
//!
//! ```rust
//! use sluice_core::ModuleRegistry;
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = Arc::new(
//!     ModuleRegistry::builder()
//!         .module("db", || async {
//!             Ok(Database { url: "postgres://localhost/app".to_string() })
//!         })
//!         .build(),
//! );
//!
//! let db = registry.resolve::<Database>("db").await.unwrap();
//! assert_eq!(db.url, "postgres://localhost/app");
//! # }
//! ```

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::error::RegistryError;

type Instance = Arc<dyn Any + Send + Sync>;
type FactoryFuture = Pin<Box<dyn Future<Output = anyhow::Result<Instance>> + Send>>;
type Factory = Arc<dyn Fn() -> FactoryFuture + Send + Sync>;

struct Entry {
    factory: Option<Factory>,
    cell: OnceCell<Instance>,
    type_name: &'static str,
}

/// Builder for the static name → factory table.
#[derive(Default)]
pub struct ModuleRegistryBuilder {
    entries: HashMap<String, Entry>,
}

impl ModuleRegistryBuilder {
    /// Registers a lazily-resolved module.
    ///
    /// The factory runs at most once successfully. If it fails, the entry stays
    /// unresolved and the next `resolve` call runs it again.
    pub fn module<T, F, Fut>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let factory: Factory = Arc::new(move || {
            let fut = factory();
            Box::pin(async move { fut.await.map(|module| Arc::new(module) as Instance) })
        });
        self.insert(
            name.into(),
            Entry {
                factory: Some(factory),
                cell: OnceCell::new(),
                type_name: type_name::<T>(),
            },
        );
        self
    }

    /// Registers an already-constructed module.
    pub fn instance<T: Send + Sync + 'static>(mut self, name: impl Into<String>, module: T) -> Self {
        self.insert(
            name.into(),
            Entry {
                factory: None,
                cell: OnceCell::new_with(Some(Arc::new(module) as Instance)),
                type_name: type_name::<T>(),
            },
        );
        self
    }

    fn insert(&mut self, name: String, entry: Entry) {
        if self.entries.insert(name.clone(), entry).is_some() {
            tracing::warn!(module = %name, "module registered twice, keeping the last registration");
        }
    }

    /// Finishes the table.
    #[must_use]
    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            entries: self.entries,
        }
    }
}

/// Process-wide table of named, lazily-resolved modules.
///
/// Shared behind an `Arc`. Concurrent first access to the same name runs the
/// factory once and every caller receives the same instance.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: HashMap<String, Entry>,
}

impl ModuleRegistry {
    /// Starts a new registry table.
    #[must_use]
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::default()
    }

    /// Creates a registry with no modules.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolves `name` and downcasts it to `T`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::NotRegistered`] for an unknown name
    /// - [`RegistryError::Resolution`] if the factory fails
    /// - [`RegistryError::TypeMismatch`] if the module is not a `T`
    pub async fn resolve<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.resolve_any(name)
            .await?
            .downcast::<T>()
            .map_err(|_| RegistryError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Resolves `name` without downcasting.
    pub async fn resolve_any(&self, name: &str) -> Result<Instance, RegistryError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NotRegistered {
                name: name.to_string(),
            })?;

        let instance = entry
            .cell
            .get_or_try_init(|| async {
                let Some(factory) = entry.factory.as_ref() else {
                    // Instances are pre-filled; an empty cell without a factory cannot occur.
                    return Err(anyhow::anyhow!("module has no factory"));
                };
                tracing::debug!(module = %name, type_name = entry.type_name, "resolving module");
                factory().await
            })
            .await
            .map_err(|source| {
                tracing::warn!(module = %name, error = %source, "module resolution failed");
                RegistryError::Resolution {
                    name: name.to_string(),
                    source,
                }
            })?;

        Ok(Arc::clone(instance))
    }

    /// Resolves every registered module, failing on the first error.
    ///
    /// Useful at startup to surface factory errors before serving traffic.
    pub async fn resolve_all(&self) -> Result<(), RegistryError> {
        for name in self.names() {
            self.resolve_any(name).await?;
        }
        Ok(())
    }

    /// Returns `true` if `name` has been resolved.
    #[must_use]
    pub fn is_resolved(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.cell.initialized())
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no modules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names())
            .finish()
    }
}

/// The handler-facing view onto a shared [`ModuleRegistry`].
///
/// Cloning is cheap. Resolution goes through the shared registry, so every
/// view observes the same cached instances.
#[derive(Clone, Debug)]
pub struct Modules {
    registry: Arc<ModuleRegistry>,
}

impl Modules {
    /// Wraps a shared registry.
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    /// A view with no modules.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Arc::new(ModuleRegistry::empty()))
    }

    /// Resolves a module by name. See [`ModuleRegistry::resolve`].
    pub async fn resolve<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, RegistryError> {
        self.registry.resolve(name).await
    }

    /// Returns the underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }
}

impl From<Arc<ModuleRegistry>> for Modules {
    fn from(registry: Arc<ModuleRegistry>) -> Self {
        Self::new(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Counter {
        id: usize,
    }

    #[tokio::test]
    async fn test_resolve_instance() {
        let registry = ModuleRegistry::builder()
            .instance("greeting", String::from("hello"))
            .build();

        assert!(registry.is_resolved("greeting"));
        let greeting = registry.resolve::<String>("greeting").await.unwrap();
        assert_eq!(greeting.as_str(), "hello");
    }

    #[tokio::test]
    async fn test_resolve_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let registry = ModuleRegistry::builder()
            .module("counter", move || {
                let counted = Arc::clone(&counted);
                async move {
                    let id = counted.fetch_add(1, Ordering::SeqCst);
                    Ok(Counter { id })
                }
            })
            .build();

        assert!(!registry.is_resolved("counter"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let first = registry.resolve::<Counter>("counter").await.unwrap();
        let second = registry.resolve::<Counter>("counter").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.id, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(registry.is_resolved("counter"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_runs_factory_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let registry = Arc::new(
            ModuleRegistry::builder()
                .module("slow", move || {
                    let counted = Arc::clone(&counted);
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let id = counted.fetch_add(1, Ordering::SeqCst);
                        Ok(Counter { id })
                    }
                })
                .build(),
        );

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                registry.resolve::<Counter>("slow").await.unwrap()
            }));
        }

        let mut resolved = Vec::new();
        for task in tasks {
            resolved.push(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resolved.iter().all(|m| Arc::ptr_eq(m, &resolved[0])));
    }

    #[tokio::test]
    async fn test_failed_factory_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let registry = ModuleRegistry::builder()
            .module("flaky", move || {
                let counted = Arc::clone(&counted);
                async move {
                    if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                        anyhow::bail!("connection refused");
                    }
                    Ok(Counter { id: 1 })
                }
            })
            .build();

        let err = registry.resolve::<Counter>("flaky").await.unwrap_err();
        assert!(matches!(err, RegistryError::Resolution { ref name, .. } if name == "flaky"));
        assert!(err.to_string().contains("connection refused"));
        assert!(!registry.is_resolved("flaky"));

        let module = registry.resolve::<Counter>("flaky").await.unwrap();
        assert_eq!(module.id, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_not_registered() {
        let registry = ModuleRegistry::empty();
        let err = registry.resolve::<Counter>("missing").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotRegistered { ref name } if name == "missing"));
    }

    #[tokio::test]
    async fn test_type_mismatch() {
        let registry = ModuleRegistry::builder().instance("n", 42_u32).build();
        let err = registry.resolve::<String>("n").await.unwrap_err();
        assert!(matches!(err, RegistryError::TypeMismatch { .. }));
    }

    #[tokio::test]
    async fn test_resolve_all_and_names() {
        let registry = ModuleRegistry::builder()
            .module("b", || async { Ok(2_u8) })
            .module("a", || async { Ok(1_u8) })
            .build();

        assert_eq!(registry.names(), vec!["a", "b"]);
        registry.resolve_all().await.unwrap();
        assert!(registry.is_resolved("a") && registry.is_resolved("b"));
    }

    #[tokio::test]
    async fn test_modules_view_shares_cache() {
        let registry = Arc::new(
            ModuleRegistry::builder()
                .module("counter", || async { Ok(Counter { id: 7 }) })
                .build(),
        );
        let view_a = Modules::new(Arc::clone(&registry));
        let view_b = Modules::from(Arc::clone(&registry));

        let a = view_a.resolve::<Counter>("counter").await.unwrap();
        let b = view_b.resolve::<Counter>("counter").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
