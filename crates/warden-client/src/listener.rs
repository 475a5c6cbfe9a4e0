//! Change listener trait and notification types

use serde_json::Value;

/// Information about one observed value transition at a watched path.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub path: String,
    pub old: Value,
    pub new: Value,
}

/// Trait for receiving change notifications from a [`CachedReader`].
///
/// Implement this trait to be called whenever the watched node's value is
/// re-read after a change notification. Rapid successive remote writes
/// coalesce: only the value present when the watch fires is delivered.
///
/// [`CachedReader`]: crate::CachedReader
pub trait ChangeListener: Send + Sync + 'static {
    /// Called with the transition the reader just applied.
    fn on_change(&self, event: &ChangeEvent);
}

/// A simple listener that invokes a closure.
pub struct FnChangeListener<F>
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    f: F,
}

impl<F> FnChangeListener<F>
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> ChangeListener for FnChangeListener<F>
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    fn on_change(&self, event: &ChangeEvent) {
        (self.f)(event);
    }
}
