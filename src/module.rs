use std::{
    any::{type_name, Any},
    collections::VecDeque,
    sync::Arc,
};

use crate::errors::AppError;

/// A constructed singleton, shared between every dependent that names it.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// The resolved dependencies for one constructor call, in declared token
/// order.
///
/// [`Deps::take`] yields the next positional value, downcast to the type the
/// constructor expects. The cursor only moves forward; a constructor that
/// consumes its values in declaration order gets exactly what its token list
/// asked for.
pub struct Deps {
    tokens: Vec<String>,
    values: VecDeque<Instance>,
    cursor: usize,
}

impl Deps {
    pub(crate) fn new(tokens: Vec<String>, values: Vec<Instance>) -> Self {
        Self {
            tokens,
            values: values.into(),
            cursor: 0,
        }
    }

    /// Takes the next positional dependency as a `T`.
    ///
    /// # Errors
    /// Returns [`AppError::IllegalValue`] if every declared dependency has
    /// already been taken, or if the value under the cursor is not a `T`.
    pub fn take<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>, AppError> {
        let Some(value) = self.values.pop_front() else {
            return Err(AppError::IllegalValue(format!(
                "constructor requested more dependencies than the {} declared",
                self.tokens.len()
            )));
        };
        let token = self.tokens.get(self.cursor).cloned().unwrap_or_default();
        self.cursor += 1;

        value
            .downcast::<T>()
            .map_err(|_| AppError::IllegalValue(format!("dependency `{token}` is not a {}", type_name::<T>())))
    }

    /// Takes the next positional dependency without downcasting.
    pub fn take_raw(&mut self) -> Option<Instance> {
        let value = self.values.pop_front();
        if value.is_some() {
            self.cursor += 1;
        }
        value
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A singleton unit of application logic, instantiated once during
/// initialization with its dependencies supplied positionally.
///
/// `INJECT` declares the dependency tokens; leaving it at the default means
/// the module constructs with no arguments. Each token names a framework
/// built-in (`$E`, `$L`, `$KV`, `$Params`), another registered module, or a
/// value provided to the application up front.
pub trait Module: Send + Sync + 'static {
    const INJECT: &'static [&'static str] = &[];

    /// Builds the module from its resolved dependencies.
    ///
    /// # Errors
    /// Implementations may fail with any [`AppError`]; a failure aborts the
    /// entire initialization pass.
    fn construct(deps: Deps) -> Result<Self, AppError>
    where
        Self: Sized;
}
