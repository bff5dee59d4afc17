// Author: Lukas Bower
// Purpose: Represent values that are either known up front or produced on demand.

use std::fmt;
use std::sync::Arc;

type Producer<T> = Arc<dyn Fn() -> anyhow::Result<T> + Send + Sync>;

/// A literal value or a producer evaluated each time the value is needed.
///
/// Triggers use it to embed settings at table-build time; handler arguments
/// use it to ask the manager (or a menu) for the value when the event fires.
pub enum Lazy<T> {
    /// Known value.
    Value(T),
    /// Value produced on each [`Lazy::resolve`].
    Deferred(Producer<T>),
}

impl<T: Clone> Lazy<T> {
    /// Wrap a producer.
    pub fn deferred<F>(producer: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        Self::Deferred(Arc::new(producer))
    }

    /// Obtain the value, running the producer if there is one.
    pub fn resolve(&self) -> anyhow::Result<T> {
        match self {
            Self::Value(value) => Ok(value.clone()),
            Self::Deferred(producer) => producer(),
        }
    }

    /// Whether the value is only known once resolved.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl<T: Clone + 'static> Lazy<T> {
    /// Apply `f` to the value, lazily when the value is deferred.
    pub fn map<U, F>(self, f: F) -> Lazy<U>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
        U: 'static,
    {
        match self {
            Self::Value(value) => Lazy::Value(f(value)),
            Self::Deferred(producer) => Lazy::Deferred(Arc::new(move || producer().map(&f))),
        }
    }
}

impl<T: Clone> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(value) => Self::Value(value.clone()),
            Self::Deferred(producer) => Self::Deferred(Arc::clone(producer)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl<T> From<T> for Lazy<T> {
    fn from(value: T) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Lazy<String> {
    fn from(value: &str) -> Self {
        Self::Value(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn deferred_values_run_on_every_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = Lazy::deferred(move || Ok(counter.fetch_add(1, Ordering::SeqCst)));
        assert_eq!(lazy.resolve().unwrap(), 0);
        assert_eq!(lazy.resolve().unwrap(), 1);
        assert!(lazy.is_deferred());
    }

    #[test]
    fn map_stays_lazy() {
        let lazy: Lazy<String> = Lazy::deferred(|| Ok("01_mail".to_owned()));
        let mapped = lazy.map(|tag| tag.trim_start_matches("01_").to_owned());
        assert!(mapped.is_deferred());
        assert_eq!(mapped.resolve().unwrap(), "mail");
        assert_eq!(Lazy::<String>::from("x").map(|s| s.len()).resolve().unwrap(), 1);
    }

    #[test]
    fn producer_errors_surface() {
        let lazy: Lazy<String> = Lazy::deferred(|| anyhow::bail!("menu cancelled"));
        assert_eq!(lazy.resolve().unwrap_err().to_string(), "menu cancelled");
    }
}
