//! Plugin chain
//!
//! An [`Interceptor`] wraps a boundary object in a decorator implementing the
//! same trait. The chain applies every registered interceptor in order, so
//! the last one registered ends up outermost.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Wraps targets of type `T` (usually a trait object).
pub trait Interceptor<T: ?Sized>: Send + Sync {
    /// Returns the wrapped target, or the target itself when not interested.
    fn plugin(&self, target: Arc<T>) -> Arc<T>;

    /// Receives configuration before registration.
    fn set_properties(&mut self, _properties: &HashMap<String, String>) {}
}

pub struct InterceptorChain<T: ?Sized> {
    interceptors: Vec<Arc<dyn Interceptor<T>>>,
}

impl<T: ?Sized> Default for InterceptorChain<T> {
    fn default() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }
}

impl<T: ?Sized> Clone for InterceptorChain<T> {
    fn clone(&self) -> Self {
        Self {
            interceptors: self.interceptors.clone(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for InterceptorChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl<T: ?Sized> InterceptorChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor<T>>) {
        self.interceptors.push(interceptor);
    }

    pub fn plugin_all(&self, target: Arc<T>) -> Arc<T> {
        self.interceptors
            .iter()
            .fold(target, |target, interceptor| interceptor.plugin(target))
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor<T>>] {
        &self.interceptors
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}
