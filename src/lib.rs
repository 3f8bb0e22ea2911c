//! A dependency-injection and module-lifecycle framework.
//!
//! Applications register [`Module`]s (singletons constructed with their
//! dependencies supplied by string token), parameters (required or optional,
//! overridable from a discovered `.weftrc` file), and [`Resource`]s
//! (route-serving units bound during initialization). A single [`App::init`]
//! call finalizes parameters, instantiates every module in dependency order
//! with cycle detection, and binds resource routes.
//!
//! ```
//! use weft::{App, AppError, Deps, Module};
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! impl Module for Greeter {
//!     const INJECT: &'static [&'static str] = &["$Params"];
//!
//!     fn construct(mut deps: Deps) -> Result<Self, AppError> {
//!         let params = deps.take::<weft::ParamsFacade>()?;
//!         let greeting = params
//!             .get("greeting")?
//!             .and_then(|value| value.as_str().map(ToOwned::to_owned))
//!             .unwrap_or_else(|| String::from("hello"));
//!         Ok(Self { greeting })
//!     }
//! }
//!
//! # fn main() -> Result<(), AppError> {
//! let mut app = App::new();
//! app.register_parameter("greeting", false)?;
//! app.set("greeting", "hi")?;
//! app.module::<Greeter>("./modules/greeter")?;
//! app.init()?;
//!
//! let greeter = app.instance_of::<Greeter>("greeter").unwrap();
//! assert_eq!(greeter.greeting, "hi");
//! # Ok(())
//! # }
//! ```

pub(crate) mod app;
pub(crate) mod errors;
pub(crate) mod instantiator;
pub(crate) mod kvstore;
pub(crate) mod log;
pub(crate) mod module;
pub(crate) mod params;
pub(crate) mod rcfile;
pub(crate) mod registry;
pub(crate) mod resource;

pub use app::App;
pub use errors::{AppError, Errors};
pub use kvstore::KvStore;
pub use log::{LogLevel, Logger};
pub use module::{Deps, Instance, Module};
pub use params::ParamsFacade;
pub use resource::{Bindable, BoundRoute, Handler, Middleware, Request, Resource, Response, RouteSet, Router, Verb};
