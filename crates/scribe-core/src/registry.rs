//! Service registry with lazy, memoized construction
//!
//! Services are registered by name together with the names of the services
//! they depend on. The declared graph is checked for cycles and dangling
//! dependencies by depth-first traversal before anything is constructed.
//! Factories that resolve services they never declared are caught at
//! construction time by a per-thread resolution stack.

use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::{Result, ScribeError};

type Instance = Arc<dyn Any + Send + Sync>;
type Factory = Box<dyn Fn(&ServiceRegistry) -> Result<Instance> + Send + Sync>;

struct Registration {
    deps: Vec<String>,
    factory: Factory,
}

thread_local! {
    /// Services under construction on this thread, keyed by registry address
    static RESOLVING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Entry on the resolution stack, popped on drop
struct Resolving {
    registry: usize,
}

impl Resolving {
    fn enter(registry: &ServiceRegistry, name: &str) -> Result<Self> {
        let key = registry as *const ServiceRegistry as usize;
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            let chain: Vec<&str> = stack
                .iter()
                .filter(|(owner, _)| *owner == key)
                .map(|(_, n)| n.as_str())
                .collect();
            if let Some(start) = chain.iter().position(|n| *n == name) {
                let mut cycle = chain[start..].to_vec();
                cycle.push(name);
                return Err(ScribeError::DependencyCycle(cycle.join(" -> ")));
            }
            stack.push((key, name.to_string()));
            Ok(Self { registry: key })
        })
    }
}

impl Drop for Resolving {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(pos) = stack.iter().rposition(|(owner, _)| *owner == self.registry) {
                stack.remove(pos);
            }
        });
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Name-keyed registry of lazily constructed singletons
#[derive(Default)]
pub struct ServiceRegistry {
    registrations: BTreeMap<String, Registration>,
    instances: Mutex<HashMap<String, Instance>>,
    validated: Mutex<bool>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`
    ///
    /// The factory receives the registry and should resolve the declared
    /// dependencies through [`ServiceRegistry::get`]. Re-registering a name
    /// replaces the previous factory and drops any memoized instance.
    pub fn register<T, F>(&mut self, name: &str, deps: &[&str], factory: F)
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceRegistry) -> Result<T> + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move |registry| {
            let value = factory(registry)?;
            Ok(Arc::new(value) as Instance)
        });
        self.registrations.insert(
            name.to_string(),
            Registration {
                deps: deps.iter().map(|d| d.to_string()).collect(),
                factory,
            },
        );
        if let Ok(mut instances) = self.instances.lock() {
            instances.remove(name);
        }
        if let Ok(mut validated) = self.validated.lock() {
            *validated = false;
        }
    }

    /// Whether a service with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.registrations.contains_key(name)
    }

    /// Check the declared graph for unknown dependencies and cycles
    pub fn validate(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for name in self.registrations.keys() {
            let mut path = Vec::new();
            self.visit(name, &mut marks, &mut path)?;
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(name);
                return Err(ScribeError::DependencyCycle(cycle.join(" -> ")));
            }
            None => {}
        }

        let registration = self
            .registrations
            .get(name)
            .ok_or_else(|| match path.last() {
                Some(parent) => ScribeError::UnknownService(format!(
                    "{} (required by {})",
                    name, parent
                )),
                None => ScribeError::UnknownService(name.to_string()),
            })?;

        marks.insert(name, Mark::Visiting);
        path.push(name);
        for dep in &registration.deps {
            self.visit(dep, marks, path)?;
        }
        path.pop();
        marks.insert(name, Mark::Done);
        Ok(())
    }

    fn ensure_validated(&self) -> Result<()> {
        let mut validated = self
            .validated
            .lock()
            .map_err(|_| ScribeError::Other("registry lock poisoned".into()))?;
        if !*validated {
            self.validate()?;
            *validated = true;
        }
        Ok(())
    }

    /// Resolve a service, constructing it (and its dependencies) on first use
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        self.ensure_validated()?;

        let existing = self
            .instances
            .lock()
            .map_err(|_| ScribeError::Other("registry lock poisoned".into()))?
            .get(name)
            .cloned();

        let instance = match existing {
            Some(instance) => instance,
            None => {
                let registration = self
                    .registrations
                    .get(name)
                    .ok_or_else(|| ScribeError::UnknownService(name.to_string()))?;
                let _resolving = Resolving::enter(self, name)?;
                debug!(service = name, "Constructing service");
                // The lock is released while the factory runs so it can
                // resolve its own dependencies.
                let built = (registration.factory)(self)?;
                let mut instances = self
                    .instances
                    .lock()
                    .map_err(|_| ScribeError::Other("registry lock poisoned".into()))?;
                instances.entry(name.to_string()).or_insert(built).clone()
            }
        };

        instance
            .downcast::<T>()
            .map_err(|_| ScribeError::ServiceType(name.to_string()))
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.registrations.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Settings {
        value: usize,
    }

    #[derive(Debug)]
    struct Consumer {
        settings: Arc<Settings>,
    }

    #[test]
    fn test_lazy_and_memoized() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();

        let mut registry = ServiceRegistry::new();
        registry.register("settings", &[], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Settings { value: 7 })
        });
        registry.register("consumer", &["settings"], |r| {
            Ok(Consumer {
                settings: r.get::<Settings>("settings")?,
            })
        });

        assert_eq!(built.load(Ordering::SeqCst), 0);
        let consumer = registry.get::<Consumer>("consumer").unwrap();
        assert_eq!(consumer.settings.value, 7);

        let settings = registry.get::<Settings>("settings").unwrap();
        assert!(Arc::ptr_eq(&settings, &consumer.settings));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cycle_detected_before_construction() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();

        let mut registry = ServiceRegistry::new();
        registry.register("a", &["b"], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1usize)
        });
        registry.register("b", &["c"], |_| Ok(2usize));
        registry.register("c", &["a"], |_| Ok(3usize));

        let err = registry.get::<usize>("a").unwrap_err();
        match err {
            ScribeError::DependencyCycle(cycle) => {
                assert!(cycle.contains("a -> b -> c -> a"), "cycle was {}", cycle)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_undeclared_self_resolution_is_a_cycle() {
        let mut registry = ServiceRegistry::new();
        registry.register("a", &[], |r| Ok(*r.get::<u32>("a")? + 1));

        registry.validate().unwrap();
        assert!(matches!(
            registry.get::<u32>("a"),
            Err(ScribeError::DependencyCycle(cycle)) if cycle == "a -> a"
        ));
    }

    #[test]
    fn test_undeclared_cycle_is_caught_and_recoverable() {
        let mut registry = ServiceRegistry::new();
        registry.register("a", &[], |r| Ok(*r.get::<u32>("b")?));
        registry.register("b", &[], |r| Ok(*r.get::<u32>("a")?));
        registry.register("c", &[], |_| Ok(3u32));

        match registry.get::<u32>("a") {
            Err(ScribeError::DependencyCycle(cycle)) => assert_eq!(cycle, "a -> b -> a"),
            other => panic!("expected a cycle, got {:?}", other.map(|v| *v)),
        }
        // The stack unwinds, so unrelated services still resolve
        assert_eq!(*registry.get::<u32>("c").unwrap(), 3);
    }

    #[test]
    fn test_unknown_dependency() {
        let mut registry = ServiceRegistry::new();
        registry.register("a", &["missing"], |_| Ok(1usize));
        assert!(matches!(
            registry.validate(),
            Err(ScribeError::UnknownService(msg)) if msg.contains("missing")
        ));
    }

    #[test]
    fn test_wrong_type() {
        let mut registry = ServiceRegistry::new();
        registry.register("a", &[], |_| Ok(1usize));
        assert!(matches!(
            registry.get::<String>("a"),
            Err(ScribeError::ServiceType(_))
        ));
        assert!(matches!(
            registry.get::<usize>("b"),
            Err(ScribeError::UnknownService(_))
        ));
    }
}
