//! Identifier to canonical location resolution.
//!
//! The pipeline is alias, paths, vars, extension, base join, canonical form,
//! map rules. Aliases are looked up again after every rewriting stage so that
//! the output of `paths` or `vars` can itself be an alias key.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::config::{ConfigUpdate, LoaderConfig};
use crate::path;

// `<key>/<rest>` where the key has no slash or colon.
static PATHS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^/:]+)(/.+)$").expect("PATHS_RE is a valid regex"));
static VARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{]+)\}").expect("VARS_RE is a valid regex"));

#[derive(Debug, Clone)]
pub struct Resolver {
    config: LoaderConfig,
}

impl Resolver {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn configure(&mut self, update: ConfigUpdate) {
        self.config.merge(update);
    }

    /// Resolve `id` as seen from `referrer` (the location of the requiring
    /// module). An empty identifier resolves to an empty location.
    pub fn resolve(&self, id: &str, referrer: Option<&str>) -> String {
        if id.is_empty() {
            return String::new();
        }

        let id = self.alias(id);
        let id = self.alias(&self.paths(&id));
        let id = self.alias(&self.vars(&id));
        let id = self.alias(&path::normalize(&id));

        let location = join_base(&self.config, &id, referrer);
        let location = self.alias(&location);
        self.map(&location)
    }

    fn alias(&self, id: &str) -> String {
        match self.config.alias.get(id) {
            Some(target) => target.clone(),
            None => id.to_string(),
        }
    }

    fn paths(&self, id: &str) -> String {
        if let Some(caps) = PATHS_RE.captures(id) {
            if let Some(prefix) = self.config.paths.get(&caps[1]) {
                return format!("{prefix}{}", &caps[2]);
            }
        }
        id.to_string()
    }

    // Unknown variables are left as written.
    fn vars(&self, id: &str) -> String {
        if !id.contains('{') {
            return id.to_string();
        }
        VARS_RE
            .replace_all(id, |caps: &Captures<'_>| match self.config.vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    // Only the first rule that changes the location applies.
    fn map(&self, location: &str) -> String {
        for rule in &self.config.map {
            let mapped = rule.apply(location);
            if mapped != location {
                return mapped;
            }
        }
        location.to_string()
    }
}

/// Anchor `id` according to its shape and canonicalize the result.
///
/// Absolute ids are kept, `./` and `../` ids join the referrer's directory (or
/// `cwd`), `/` ids join the `scheme://host/` of `cwd`, and anything else joins
/// `base`. A protocol-relative result gets the page protocol.
pub fn join_base(config: &LoaderConfig, id: &str, referrer: Option<&str>) -> String {
    let joined = if path::is_absolute(id) {
        id.to_string()
    } else if id.starts_with('.') {
        let dir = match referrer {
            Some(referrer) => path::dirname(referrer),
            None => config.cwd.as_str(),
        };
        format!("{dir}{id}")
    } else if let Some(rest) = id.strip_prefix('/') {
        match path::root_dir(&config.cwd) {
            Some(root) => format!("{root}{rest}"),
            None => id.to_string(),
        }
    } else {
        format!("{}{id}", config.base)
    };

    let joined = if joined.starts_with("//") {
        format!("{}{joined}", config.protocol())
    } else {
        joined
    };

    path::realpath(&joined)
}
