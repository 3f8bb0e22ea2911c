use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde_json::Value;
use tracing::debug;

use crate::{
    errors::AppError,
    module::Deps,
};

/// Route kinds a resource can implement. Collection verbs bind the base
/// path; member verbs bind the base path plus an `:id` segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verb {
    GetAll,
    Get,
    Post,
    PutAll,
    Put,
    DeleteAll,
    Delete,
}

impl Verb {
    pub(crate) const ALL: [Verb; 7] = [
        Verb::GetAll,
        Verb::Get,
        Verb::Post,
        Verb::PutAll,
        Verb::Put,
        Verb::DeleteAll,
        Verb::Delete,
    ];

    #[must_use]
    fn is_member(self) -> bool {
        matches!(self, Verb::Get | Verb::Put | Verb::Delete)
    }

    fn path_under(self, base_path: &str) -> String {
        if self.is_member() {
            format!("{base_path}/:id")
        } else {
            base_path.to_owned()
        }
    }
}

/// One in-flight request as the routing layer sees it. The real transport
/// lives outside the framework; hosts translate to and from this shape.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub params: BTreeMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    #[must_use]
    pub fn created(body: Value) -> Self {
        Self::new(201, body)
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::new(204, Value::Null)
    }
}

pub type Handler = Arc<dyn Fn(&mut Request) -> Result<Response, AppError> + Send + Sync>;
pub type Middleware = Arc<dyn Fn(&mut Request) -> Result<(), AppError> + Send + Sync>;

struct RouteEntry {
    verb: Verb,
    middleware: Vec<Middleware>,
    handler: Handler,
}

/// Ordered route definitions for one resource: a base path plus handlers and
/// their middleware chains per verb. Built explicitly; consumed by the
/// binder during initialization.
pub struct RouteSet {
    base_path: String,
    entries: Vec<RouteEntry>,
}

impl RouteSet {
    #[must_use]
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn handle(self, verb: Verb, handler: impl Fn(&mut Request) -> Result<Response, AppError> + Send + Sync + 'static) -> Self {
        self.handle_before(verb, Vec::new(), handler)
    }

    /// Like [`RouteSet::handle`], with middleware run in the given order
    /// before the handler.
    #[must_use]
    pub fn handle_before(
        mut self,
        verb: Verb,
        middleware: Vec<Middleware>,
        handler: impl Fn(&mut Request) -> Result<Response, AppError> + Send + Sync + 'static,
    ) -> Self {
        self.entries.push(RouteEntry {
            verb,
            middleware,
            handler: Arc::new(handler),
        });
        self
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

/// A unit of request-handling logic constructed through the injection
/// resolver, exactly like a module, but addressed by routes instead of by
/// token. Resources are not injectable and never join the dependency graph.
pub trait Resource: Send + Sync + 'static {
    const INJECT: &'static [&'static str] = &[];

    /// Builds the resource from its resolved dependencies.
    ///
    /// # Errors
    /// Implementations may fail with any [`AppError`]; a failure aborts the
    /// entire initialization pass.
    fn construct(deps: Deps) -> Result<Self, AppError>
    where
        Self: Sized;

    /// The route definitions to bind. Handlers that need the resource's
    /// state capture a clone of `self`.
    fn routes(self: Arc<Self>) -> RouteSet;
}

/// A middleware chain and handler ready to serve one route.
#[derive(Clone)]
pub struct BoundRoute {
    middleware: Vec<Middleware>,
    handler: Handler,
}

impl BoundRoute {
    /// Runs the middleware in order, then the handler.
    ///
    /// # Errors
    /// The first failing middleware short-circuits the chain.
    pub fn call(&self, request: &mut Request) -> Result<Response, AppError> {
        for middleware in &self.middleware {
            middleware(request)?;
        }
        (self.handler)(request)
    }
}

/// Anything bound routes can be pushed into: the in-crate [`Router`], or an
/// adapter over a host web server.
pub trait Bindable {
    fn bind(&mut self, verb: Verb, path: &str, route: BoundRoute);
}

/// Plain dispatch table satisfying [`Bindable`]. Enough to serve tests and
/// embedded hosts; production traffic belongs behind a real server adapted
/// through the same trait.
#[derive(Default)]
pub struct Router {
    routes: BTreeMap<(Verb, String), BoundRoute>,
}

impl Bindable for Router {
    fn bind(&mut self, verb: Verb, path: &str, route: BoundRoute) {
        self.routes.insert((verb, path.to_owned()), route);
    }
}

impl Router {
    /// Routes `path` to the matching handler.
    ///
    /// # Errors
    /// [`AppError::NotFound`] when no route matches; otherwise whatever the
    /// chain returns.
    pub fn dispatch(&self, verb: Verb, path: &str) -> Result<Response, AppError> {
        self.dispatch_with_body(verb, path, Value::Null)
    }

    /// # Errors
    /// See [`Router::dispatch`].
    pub fn dispatch_with_body(&self, verb: Verb, path: &str, body: Value) -> Result<Response, AppError> {
        for ((route_verb, template), route) in &self.routes {
            if *route_verb != verb {
                continue;
            }
            if let Some(params) = match_template(template, path) {
                let mut request = Request {
                    path: path.to_owned(),
                    params,
                    body,
                };
                return route.call(&mut request);
            }
        }
        Err(AppError::NotFound(format!("no route for {verb:?} {path}")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn match_template(template: &str, path: &str) -> Option<BTreeMap<String, String>> {
    let template_segments: Vec<&str> = template.split('/').filter(|segment| !segment.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|segment| !segment.is_empty()).collect();
    if template_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (expected, actual) in template_segments.iter().zip(&path_segments) {
        if let Some(name) = expected.strip_prefix(':') {
            params.insert(name.to_owned(), (*actual).to_owned());
        } else if expected != actual {
            return None;
        }
    }
    Some(params)
}

/// Binds one resource's routes into `target`. Verbs the resource left
/// undefined respond `NotImplemented`.
///
/// # Errors
/// - [`AppError::IllegalValue`] when the base path is empty.
/// - [`AppError::DuplicateEntry`] when two entries define the same verb.
pub(crate) fn bind_route_set(route_set: RouteSet, target: &mut dyn Bindable) -> Result<String, AppError> {
    let RouteSet { base_path, entries } = route_set;
    if base_path.is_empty() {
        return Err(AppError::IllegalValue(String::from("resource defines no base path")));
    }

    let mut defined: BTreeSet<Verb> = BTreeSet::new();
    for entry in &entries {
        if !defined.insert(entry.verb) {
            return Err(AppError::DuplicateEntry(format!(
                "resource at `{base_path}` defines {:?} twice",
                entry.verb
            )));
        }
    }

    for entry in entries {
        let path = entry.verb.path_under(&base_path);
        debug!(verb = ?entry.verb, path = %path, "Route bound");
        target.bind(
            entry.verb,
            &path,
            BoundRoute {
                middleware: entry.middleware,
                handler: entry.handler,
            },
        );
    }
    for verb in Verb::ALL {
        if defined.contains(&verb) {
            continue;
        }
        let base_path = base_path.clone();
        target.bind(
            verb,
            &verb.path_under(&base_path),
            BoundRoute {
                middleware: Vec::new(),
                handler: Arc::new(move |request: &mut Request| {
                    Err(AppError::NotImplemented(format!(
                        "{base_path} does not implement {verb:?} (requested {})",
                        request.path
                    )))
                }),
            },
        );
    }

    Ok(base_path)
}
