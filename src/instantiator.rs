use std::{collections::BTreeMap, sync::Arc};

use tracing::{debug, error, info_span};

use crate::{
    errors::{AppError, SharedErrors},
    kvstore::KvStore,
    log::Logger,
    module::{Deps, Instance},
    params::ParamsFacade,
    registry::ModuleRegistry,
};

/// The framework services every module can name without registering them.
/// These resolve immediately and never participate in cycle detection.
pub(crate) struct BuiltinServices {
    pub(crate) errors: SharedErrors,
    pub(crate) logger: Logger,
    pub(crate) kvstore: Arc<KvStore>,
    pub(crate) params: Arc<ParamsFacade>,
}

impl BuiltinServices {
    fn resolve(&self, token: &str, owner: &str) -> Option<Instance> {
        match token {
            "$E" => Some(Arc::clone(&self.errors) as Instance),
            "$L" => Some(Arc::new(self.logger.child(owner)) as Instance),
            "$KV" => Some(Arc::clone(&self.kvstore) as Instance),
            "$Params" => Some(Arc::clone(&self.params) as Instance),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleState {
    Resolving,
    Instantiated,
}

/// Resolves injection tokens and drives the one-shot instantiation pass.
///
/// Construction is a memoized depth-first walk: each module moves through
/// `Resolving` into `Instantiated`, and meeting a module that is still
/// `Resolving` means the dependency chain closed on itself. Instances enter
/// the cache the moment they construct, before any dependent constructs.
pub(crate) struct Resolver<'r> {
    registry: &'r ModuleRegistry,
    externals: &'r BTreeMap<String, Instance>,
    builtins: BuiltinServices,
    cache: BTreeMap<String, Instance>,
    states: BTreeMap<String, ModuleState>,
    stack: Vec<String>,
}

impl<'r> Resolver<'r> {
    pub(crate) fn new(registry: &'r ModuleRegistry, externals: &'r BTreeMap<String, Instance>, builtins: BuiltinServices) -> Self {
        Self {
            registry,
            externals,
            builtins,
            cache: BTreeMap::new(),
            states: BTreeMap::new(),
            stack: Vec::new(),
        }
    }

    /// Instantiates every registered module in dependency order.
    ///
    /// # Errors
    /// Any failure aborts the pass; nothing constructed is handed out.
    pub(crate) fn instantiate_all(&mut self) -> Result<(), AppError> {
        let names: Vec<String> = self.registry.names().cloned().collect();
        for name in names {
            self.instantiate(&name)?;
        }
        Ok(())
    }

    pub(crate) fn into_cache(self) -> BTreeMap<String, Instance> {
        self.cache
    }

    /// Resolves one token for `owner`: framework built-ins, then registered
    /// modules, then values provided up front.
    ///
    /// # Errors
    /// [`AppError::NotFound`] when no namespace knows the token.
    pub(crate) fn resolve(&mut self, token: &str, owner: &str) -> Result<Instance, AppError> {
        if let Some(instance) = self.builtins.resolve(token, owner) {
            return Ok(instance);
        }
        if self.registry.contains(token) {
            return self.instantiate(token);
        }
        if let Some(instance) = self.externals.get(token) {
            return Ok(Arc::clone(instance));
        }

        let err = AppError::NotFound(format!("unresolvable injection token `{token}` required by `{owner}`"));
        error!("{err}");
        Err(err)
    }

    fn instantiate(&mut self, name: &str) -> Result<Instance, AppError> {
        let span = info_span!("instantiate", module = name);
        let _guard = span.enter();

        match self.states.get(name) {
            Some(ModuleState::Instantiated) => {
                debug!("Found in cache");
                let instance = self.cache.get(name).map(Arc::clone);
                return instance.ok_or_else(|| AppError::General(format!("module `{name}` marked instantiated but not cached")));
            }
            Some(ModuleState::Resolving) => {
                let err = AppError::General(format!("cyclic module dependency: {}", self.cycle_path(name)));
                error!("{err}");
                return Err(err);
            }
            None => {}
        }

        let registry = self.registry;
        let Some(descriptor) = registry.get(name) else {
            let err = AppError::NotFound(format!("module `{name}` is not registered"));
            error!("{err}");
            return Err(err);
        };
        let tokens = descriptor.tokens.clone();

        self.states.insert(name.to_owned(), ModuleState::Resolving);
        self.stack.push(name.to_owned());

        let mut values = Vec::with_capacity(tokens.len());
        for token in &tokens {
            values.push(self.resolve(token, name)?);
        }

        let instance = (descriptor.factory)(Deps::new(tokens, values))?;
        debug!("Instantiated");

        self.cache.insert(name.to_owned(), Arc::clone(&instance));
        self.states.insert(name.to_owned(), ModuleState::Instantiated);
        self.stack.pop();

        Ok(instance)
    }

    fn cycle_path(&self, name: &str) -> String {
        let start = self.stack.iter().position(|module| module == name).unwrap_or(0);
        let mut path: Vec<&str> = self.stack[start..].iter().map(String::as_str).collect();
        path.push(name);
        path.join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::{BuiltinServices, Resolver};
    use crate::{
        errors::{AppError, Errors},
        kvstore::KvStore,
        log::Logger,
        module::{Deps, Instance},
        params::{ParamStore, ParamsFacade},
        registry::{ModuleFactory, ModuleRegistry},
    };

    use std::{
        collections::BTreeMap,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use parking_lot::{Mutex, RwLock};
    use tracing_test::traced_test;

    fn builtins() -> BuiltinServices {
        BuiltinServices {
            errors: Arc::new(Errors),
            logger: Logger::new(),
            kvstore: Arc::new(KvStore::new()),
            params: Arc::new(ParamsFacade::new(Arc::new(RwLock::new(ParamStore::default())))),
        }
    }

    fn unit_factory() -> ModuleFactory {
        Box::new(|_: Deps| Ok(Arc::new(()) as Instance))
    }

    fn recording_factory(order: &Arc<Mutex<Vec<String>>>, name: &str) -> ModuleFactory {
        let order = Arc::clone(order);
        let name = name.to_owned();
        Box::new(move |mut deps: Deps| {
            while deps.take_raw().is_some() {}
            order.lock().push(name.clone());
            Ok(Arc::new(()) as Instance)
        })
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    #[traced_test]
    fn test_independent_modules_instantiate_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::default();
        registry.register("./modules/test", Vec::new(), recording_factory(&order, "test")).unwrap();
        registry
            .register("./modules/test2", Vec::new(), recording_factory(&order, "test2"))
            .unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, builtins());
        resolver.instantiate_all().unwrap();
        // A second sweep must hit the cache only.
        resolver.instantiate_all().unwrap();

        let mut constructed = order.lock().clone();
        constructed.sort();
        assert_eq!(constructed, vec!["test".to_owned(), "test2".to_owned()]);
    }

    #[test]
    #[traced_test]
    fn test_dependency_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::default();
        registry.register("./modules/test", Vec::new(), recording_factory(&order, "test")).unwrap();
        registry
            .register("./modules/test2", tokens(&["test", "test4"]), recording_factory(&order, "test2"))
            .unwrap();
        registry
            .register("./modules/test3", tokens(&["test2"]), recording_factory(&order, "test3"))
            .unwrap();
        registry
            .register("./modules/test4", tokens(&["test"]), recording_factory(&order, "test4"))
            .unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, builtins());
        resolver.instantiate_all().unwrap();

        let constructed = order.lock().clone();
        assert_eq!(constructed.len(), 4);
        let position = |name: &str| constructed.iter().position(|m| m == name).unwrap();
        assert!(position("test") < position("test2"));
        assert!(position("test") < position("test4"));
        assert!(position("test4") < position("test2"));
        assert!(position("test2") < position("test3"));
    }

    #[test]
    #[traced_test]
    fn test_direct_cycle() {
        let mut registry = ModuleRegistry::default();
        registry.register("./modules/test", tokens(&["test2"]), unit_factory()).unwrap();
        registry.register("./modules/test2", tokens(&["test"]), unit_factory()).unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, builtins());

        let err = resolver.instantiate_all().unwrap_err();
        assert!(matches!(err, AppError::General(_)));
        assert!(err.to_string().contains("->"));
    }

    #[test]
    #[traced_test]
    fn test_transitive_cycle() {
        let mut registry = ModuleRegistry::default();
        registry.register("./modules/test", Vec::new(), unit_factory()).unwrap();
        registry
            .register("./modules/test2", tokens(&["test", "test4"]), unit_factory())
            .unwrap();
        registry.register("./modules/test3", tokens(&["test2"]), unit_factory()).unwrap();
        registry.register("./modules/test4", tokens(&["test3"]), unit_factory()).unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, builtins());

        assert!(matches!(resolver.instantiate_all(), Err(AppError::General(_))));
    }

    #[test]
    #[traced_test]
    fn test_self_dependency() {
        let constructed = Arc::new(AtomicBool::new(false));
        let mut registry = ModuleRegistry::default();
        registry
            .register("./modules/test", tokens(&["test"]), {
                let constructed = Arc::clone(&constructed);
                Box::new(move |_: Deps| {
                    constructed.store(true, Ordering::SeqCst);
                    Ok(Arc::new(()) as Instance)
                })
            })
            .unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, builtins());

        let err = resolver.instantiate_all().unwrap_err();
        assert!(matches!(err, AppError::General(_)));
        assert!(err.to_string().contains("test -> test"));
        // The failure happens during resolution, before the constructor runs.
        assert!(!constructed.load(Ordering::SeqCst));
    }

    #[test]
    #[traced_test]
    fn test_shared_dependency_is_reference_identical() {
        let seen: Arc<Mutex<Vec<Instance>>> = Arc::new(Mutex::new(Vec::new()));
        let capture = |seen: &Arc<Mutex<Vec<Instance>>>| -> ModuleFactory {
            let seen = Arc::clone(seen);
            Box::new(move |mut deps: Deps| {
                seen.lock().push(deps.take_raw().expect("declared dependency missing"));
                Ok(Arc::new(()) as Instance)
            })
        };

        let mut registry = ModuleRegistry::default();
        registry.register("./modules/test", Vec::new(), unit_factory()).unwrap();
        registry.register("./modules/test2", tokens(&["test"]), capture(&seen)).unwrap();
        registry.register("./modules/test3", tokens(&["test"]), capture(&seen)).unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, builtins());
        resolver.instantiate_all().unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(Arc::ptr_eq(&seen[0], &seen[1]));
    }

    #[test]
    #[traced_test]
    fn test_builtin_tokens() {
        let kvstore = Arc::new(KvStore::new());
        let mut services = builtins();
        services.kvstore = Arc::clone(&kvstore);

        let mut registry = ModuleRegistry::default();
        registry
            .register(
                "./modules/test",
                tokens(&["$E", "$L", "$KV", "$Params"]),
                Box::new(|mut deps: Deps| {
                    let errors = deps.take::<Errors>()?;
                    let log = deps.take::<Logger>()?;
                    let kv = deps.take::<KvStore>()?;
                    let params = deps.take::<ParamsFacade>()?;

                    assert_eq!(errors.not_found("x").status(), 404);
                    log.debug("constructed");
                    kv.set("constructed", "yes");
                    assert!(matches!(params.get("anything"), Err(AppError::General(_))));

                    Ok(Arc::new(()) as Instance)
                }),
            )
            .unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, services);
        resolver.instantiate_all().unwrap();

        assert_eq!(kvstore.get("constructed").as_deref(), Some("yes"));
    }

    #[test]
    #[traced_test]
    fn test_external_tokens() {
        struct Clock;

        let mut externals = BTreeMap::new();
        externals.insert(String::from("moment"), Arc::new(Clock) as Instance);
        // Tokens are plain strings, so names that are not valid identifiers
        // resolve like any other.
        externals.insert(String::from("bad.name"), Arc::new(7_i32) as Instance);

        let mut registry = ModuleRegistry::default();
        registry
            .register(
                "./modules/test",
                tokens(&["moment", "bad.name"]),
                Box::new(|mut deps: Deps| {
                    deps.take::<Clock>()?;
                    assert_eq!(*deps.take::<i32>()?, 7);
                    Ok(Arc::new(()) as Instance)
                }),
            )
            .unwrap();

        let mut resolver = Resolver::new(&registry, &externals, builtins());
        resolver.instantiate_all().unwrap();
    }

    #[test]
    #[traced_test]
    fn test_unknown_token() {
        let mut registry = ModuleRegistry::default();
        registry.register("./modules/test", tokens(&["unknownModule"]), unit_factory()).unwrap();

        let externals = BTreeMap::new();
        let mut resolver = Resolver::new(&registry, &externals, builtins());

        let err = resolver.instantiate_all().unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(err.to_string().contains("unknownModule"));
    }

    #[test]
    #[traced_test]
    fn test_token_order_independence() {
        struct Marker;

        let mut externals = BTreeMap::new();
        externals.insert(String::from("moment"), Arc::new(Marker) as Instance);

        let mut registry = ModuleRegistry::default();
        registry
            .register(
                "./modules/test1",
                tokens(&["$E", "moment"]),
                Box::new(|mut deps: Deps| {
                    deps.take::<Errors>()?;
                    deps.take::<Marker>()?;
                    Ok(Arc::new(()) as Instance)
                }),
            )
            .unwrap();
        registry
            .register(
                "./modules/test2",
                tokens(&["moment", "$E"]),
                Box::new(|mut deps: Deps| {
                    deps.take::<Marker>()?;
                    deps.take::<Errors>()?;
                    Ok(Arc::new(()) as Instance)
                }),
            )
            .unwrap();

        let mut resolver = Resolver::new(&registry, &externals, builtins());
        resolver.instantiate_all().unwrap();
    }
}
