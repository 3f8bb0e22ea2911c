use std::{
    collections::{BTreeMap, BTreeSet},
    env,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info_span};

use crate::{
    errors::{AppError, Errors, SharedErrors},
    instantiator::{BuiltinServices, Resolver},
    kvstore::KvStore,
    log::Logger,
    module::{Deps, Instance, Module},
    params::{ParamStore, ParamsFacade, SharedParams},
    rcfile,
    registry::ModuleRegistry,
    resource::{bind_route_set, Resource, RouteSet, Router},
};

enum Phase {
    Registering,
    Running,
    Stopped,
}

struct ResourceRegistration {
    key: String,
    tokens: Vec<String>,
    factory: Box<dyn Fn(Deps) -> Result<RouteSet, AppError> + Send + Sync>,
}

/// The process-wide framework instance.
///
/// Life cycle: create, register parameters/modules/resources/provided
/// values, then one explicit [`App::init`] which finalizes parameters and
/// constructs every module in dependency order. After that the instance is
/// running and read-only until [`App::shutdown`].
pub struct App {
    cwd: PathBuf,
    params: SharedParams,
    registry: ModuleRegistry,
    externals: BTreeMap<String, Instance>,
    resources: Vec<ResourceRegistration>,
    modules: BTreeMap<String, Instance>,
    router: Router,
    logger: Logger,
    kvstore: Arc<KvStore>,
    errors: SharedErrors,
    phase: Phase,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// An instance anchored at the current working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cwd(env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// An instance anchored at `cwd`, which is where the configuration-file
    /// search starts.
    #[must_use]
    pub fn with_cwd(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            params: Arc::new(RwLock::new(ParamStore::default())),
            registry: ModuleRegistry::default(),
            externals: BTreeMap::new(),
            resources: Vec::new(),
            modules: BTreeMap::new(),
            router: Router::default(),
            logger: Logger::new(),
            kvstore: Arc::new(KvStore::new()),
            errors: Arc::new(Errors),
            phase: Phase::Registering,
        }
    }

    /// Registers a parameter. Required parameters must hold a value by the
    /// time [`App::init`] runs.
    ///
    /// # Errors
    /// [`AppError::DuplicateEntry`] if `name` is already registered.
    pub fn register_parameter(&mut self, name: &str, required: bool) -> Result<(), AppError> {
        self.params.write().register(name, required)
    }

    /// Sets a parameter value programmatically. Programmatic values win over
    /// configuration-file values.
    ///
    /// # Errors
    /// [`AppError::IllegalValue`] for a name that was never registered.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), AppError> {
        self.params.write().set(name, value.into())
    }

    /// Reads a parameter value.
    ///
    /// # Errors
    /// - [`AppError::General`] before [`App::init`] has finalized parameters.
    /// - [`AppError::NotFound`] for a name never registered, or a required
    ///   parameter with no value.
    pub fn get(&self, name: &str) -> Result<Option<Value>, AppError> {
        self.params.read().get(name)
    }

    /// A snapshot of every parameter value.
    #[must_use]
    pub fn config(&self) -> BTreeMap<String, Value> {
        self.params.read().config()
    }

    /// Registers a module class for instantiation during [`App::init`]. The
    /// module name derives from `path`: directories and extension stripped,
    /// hyphen-case converted to camelCase.
    ///
    /// # Errors
    /// - [`AppError::IllegalValue`] when no name can be derived from `path`.
    /// - [`AppError::DuplicateEntry`] when the derived name is taken.
    pub fn module<M: Module>(&mut self, path: &str) -> Result<(), AppError> {
        let tokens = M::INJECT.iter().map(ToString::to_string).collect();
        self.registry
            .register(path, tokens, Box::new(|deps| M::construct(deps).map(|module| Arc::new(module) as Instance)))?;
        Ok(())
    }

    /// Registers a module from an explicit token list and factory closure,
    /// for modules built at runtime rather than declared as types.
    ///
    /// # Errors
    /// As [`App::module`].
    pub fn module_factory(
        &mut self,
        path: &str,
        tokens: &[&str],
        factory: impl Fn(Deps) -> Result<Instance, AppError> + Send + Sync + 'static,
    ) -> Result<(), AppError> {
        let tokens = tokens.iter().map(ToString::to_string).collect();
        self.registry.register(path, tokens, Box::new(factory))?;
        Ok(())
    }

    /// Makes `value` resolvable under `token`, the namespace consulted after
    /// built-ins and modules. Tokens need not be valid identifiers.
    pub fn provide<T: Send + Sync + 'static>(&mut self, token: &str, value: T) {
        self.externals.insert(token.to_owned(), Arc::new(value) as Instance);
    }

    /// Registers a resource for construction and route binding during
    /// [`App::init`]. Resources are keyed by the registration path as given.
    ///
    /// # Errors
    /// [`AppError::DuplicateEntry`] if `path` is already registered.
    pub fn resource<R: Resource>(&mut self, path: &str) -> Result<(), AppError> {
        if self.resources.iter().any(|registration| registration.key == path) {
            return Err(AppError::DuplicateEntry(format!("resource `{path}` is already registered")));
        }
        self.resources.push(ResourceRegistration {
            key: path.to_owned(),
            tokens: R::INJECT.iter().map(ToString::to_string).collect(),
            factory: Box::new(|deps| {
                let resource = Arc::new(R::construct(deps)?);
                Ok(resource.routes())
            }),
        });
        debug!(resource = path, "Resource registered");
        Ok(())
    }

    /// Initializes the instance: loads the nearest configuration file,
    /// validates and freezes parameters, instantiates every module in
    /// dependency order, then constructs and binds resources.
    ///
    /// Any failure aborts the whole pass synchronously and leaves the
    /// instance non-running.
    ///
    /// # Errors
    /// Everything raised by the steps above, unchanged; see `AppError`.
    pub fn init(&mut self) -> Result<(), AppError> {
        let span = info_span!("init");
        let _guard = span.enter();

        if matches!(self.phase, Phase::Running) {
            return Err(AppError::General(String::from("instance is already initialized")));
        }

        let document = rcfile::load(&self.cwd)?;
        {
            let mut params = self.params.write();
            if let Some(document) = document {
                params.apply_document(document)?;
            }
            params.close_gate();
            params.validate()?;
        }

        let builtins = BuiltinServices {
            errors: Arc::clone(&self.errors),
            logger: self.logger.clone(),
            kvstore: Arc::clone(&self.kvstore),
            params: Arc::new(ParamsFacade::new(Arc::clone(&self.params))),
        };
        let mut resolver = Resolver::new(&self.registry, &self.externals, builtins);
        resolver.instantiate_all()?;

        let mut router = Router::default();
        let mut base_paths: BTreeSet<String> = BTreeSet::new();
        for registration in &self.resources {
            let mut values = Vec::with_capacity(registration.tokens.len());
            for token in &registration.tokens {
                values.push(resolver.resolve(token, &registration.key)?);
            }
            let route_set = (registration.factory)(Deps::new(registration.tokens.clone(), values))?;

            let base_path = route_set.base_path().to_owned();
            if !base_path.is_empty() && !base_paths.insert(base_path.clone()) {
                return Err(AppError::DuplicateEntry(format!("multiple resources bound at `{base_path}`")));
            }
            bind_route_set(route_set, &mut router)?;
        }

        self.modules = resolver.into_cache();
        self.router = router;
        self.phase = Phase::Running;
        debug!(modules = self.registry.len(), resources = self.resources.len(), "Initialized");
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running)
    }

    /// The cached singleton registered under `name`, if initialization
    /// constructed one.
    #[must_use]
    pub fn instance(&self, name: &str) -> Option<Instance> {
        self.modules.get(name).map(Arc::clone)
    }

    /// [`App::instance`], downcast to its concrete type.
    #[must_use]
    pub fn instance_of<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.instance(name).and_then(|instance| instance.downcast::<T>().ok())
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn kvstore(&self) -> Arc<KvStore> {
        Arc::clone(&self.kvstore)
    }

    #[must_use]
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    #[must_use]
    pub fn errors(&self) -> Errors {
        *self.errors
    }

    /// Leaves the running state and drops every cached module instance.
    pub fn shutdown(&mut self) {
        self.modules.clear();
        self.router = Router::default();
        self.phase = Phase::Stopped;
        debug!("Shut down");
    }
}
