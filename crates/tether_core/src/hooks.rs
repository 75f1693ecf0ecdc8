//! Lifecycle hooks for plugins that observe or steer the engine.
//!
//! Every method has a no-op default. Hooks run in registration order; for the
//! methods that can override a value, the first hook that returns `Some` wins.

use serde_json::Value;

pub trait Hook {
    /// Replace the resolved location of `id` as seen from `referrer`.
    fn resolve(&self, _id: &str, _referrer: Option<&str>) -> Option<String> {
        None
    }

    /// Fetch `location` from somewhere else, e.g. a combo service.
    fn fetch(&self, _location: &str) -> Option<String> {
        None
    }

    /// A node resolved its dependencies to these locations and starts loading.
    fn load(&self, _locations: &[String]) {}

    /// A definition is about to be saved at `location`, which may be rewritten.
    /// An empty location means the definition is anonymous.
    fn define(&self, _location: &mut String) {}

    /// Metadata was saved for `location`.
    fn save(&self, _location: &str) {}

    /// `location` finished executing.
    fn exec(&self, _location: &str, _exports: Option<&Value>) {}
}
