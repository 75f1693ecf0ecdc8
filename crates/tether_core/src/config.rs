//! Configuration snapshot consumed by the resolver, and the partial updates
//! merged into it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use crate::error::{LoaderError, Result};
use crate::path;

/// How cross-origin requests are made by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorsMode {
    Anonymous,
    UseCredentials,
}

/// A final rewrite applied to resolved locations.
#[derive(Clone)]
pub enum MapRule {
    /// Replace the first literal occurrence of `from` with `to`.
    Replace { from: String, to: String },
    /// Replace the first regex match; `$n` groups are expanded.
    Pattern { regex: Regex, replacement: String },
    /// Host-supplied rewrite. `None` leaves the location unchanged.
    Func(Arc<dyn Fn(&str) -> Option<String> + Send + Sync>),
}

impl MapRule {
    pub fn replace(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Replace {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn pattern(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| LoaderError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self::Pattern {
            regex,
            replacement: replacement.into(),
        })
    }

    pub fn func(f: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self::Func(Arc::new(f))
    }

    pub fn apply(&self, location: &str) -> String {
        match self {
            Self::Replace { from, to } => location.replacen(from.as_str(), to, 1),
            Self::Pattern { regex, replacement } => {
                regex.replace(location, replacement.as_str()).into_owned()
            }
            Self::Func(f) => f(location).unwrap_or_else(|| location.to_string()),
        }
    }
}

impl fmt::Debug for MapRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace { from, to } => f.debug_tuple("Replace").field(from).field(to).finish(),
            Self::Pattern { regex, replacement } => f
                .debug_tuple("Pattern")
                .field(&regex.as_str())
                .field(replacement)
                .finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

// Wire form of a map rule: `["from", "to"]` or `{"pattern": "...", "replacement": "..."}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum MapRuleRepr {
    Pair(String, String),
    Pattern { pattern: String, replacement: String },
}

impl TryFrom<MapRuleRepr> for MapRule {
    type Error = LoaderError;

    fn try_from(raw: MapRuleRepr) -> Result<Self> {
        match raw {
            MapRuleRepr::Pair(from, to) => Ok(MapRule::replace(from, to)),
            MapRuleRepr::Pattern {
                pattern,
                replacement,
            } => MapRule::pattern(&pattern, replacement),
        }
    }
}

/// The resolved configuration snapshot.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Absolute base for top-level identifiers. Always ends in `/`.
    pub base: String,
    /// Directory of the hosting page; anchors relative and root-relative ids.
    pub cwd: String,
    pub alias: HashMap<String, String>,
    pub paths: HashMap<String, String>,
    pub vars: HashMap<String, String>,
    pub map: Vec<MapRule>,
    pub charset: Option<String>,
    pub cors: Option<CorsMode>,
}

impl LoaderConfig {
    /// A snapshot whose base is the working directory itself.
    pub fn new(cwd: impl Into<String>) -> Self {
        let cwd = cwd.into();
        Self {
            base: cwd.clone(),
            cwd,
            alias: HashMap::new(),
            paths: HashMap::new(),
            vars: HashMap::new(),
            map: Vec::new(),
            charset: Some("utf-8".to_string()),
            cors: None,
        }
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.set_base(base);
        self
    }

    pub fn with_alias(mut self, id: impl Into<String>, target: impl Into<String>) -> Self {
        self.alias.insert(id.into(), target.into());
        self
    }

    pub fn with_path(mut self, key: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.paths.insert(key.into(), prefix.into());
        self
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with_map_rule(mut self, rule: MapRule) -> Self {
        self.map.push(rule);
        self
    }

    /// Protocol prepended to `//host/...` locations, taken from `cwd`.
    pub fn protocol(&self) -> &str {
        path::scheme(&self.cwd).unwrap_or("http:")
    }

    /// Merge a partial update: tables merge key by key, map rules append,
    /// scalars replace, and `base` is made absolute.
    pub fn merge(&mut self, update: ConfigUpdate) {
        if let Some(cwd) = update.cwd {
            self.cwd = cwd;
        }
        if let Some(base) = update.base {
            self.set_base(&base);
        }
        self.alias.extend(update.alias);
        self.paths.extend(update.paths);
        self.vars.extend(update.vars);
        self.map.extend(update.map);
        if update.charset.is_some() {
            self.charset = update.charset;
        }
        if update.cors.is_some() {
            self.cors = update.cors;
        }
    }

    fn set_base(&mut self, base: &str) {
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        self.base = crate::resolver::join_base(self, &base, None);
    }
}

/// A partial configuration, as supplied by the host page.
#[derive(Debug, Default, Deserialize)]
#[serde(try_from = "ConfigUpdateRepr")]
pub struct ConfigUpdate {
    pub base: Option<String>,
    pub cwd: Option<String>,
    pub alias: HashMap<String, String>,
    pub paths: HashMap<String, String>,
    pub vars: HashMap<String, String>,
    pub map: Vec<MapRule>,
    pub charset: Option<String>,
    pub cors: Option<CorsMode>,
}

impl ConfigUpdate {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct ConfigUpdateRepr {
    base: Option<String>,
    cwd: Option<String>,
    alias: HashMap<String, String>,
    paths: HashMap<String, String>,
    vars: HashMap<String, String>,
    map: Vec<MapRuleRepr>,
    charset: Option<String>,
    #[serde(rename = "cors-mode", alias = "crossorigin")]
    cors: Option<CorsMode>,
}

impl TryFrom<ConfigUpdateRepr> for ConfigUpdate {
    type Error = LoaderError;

    fn try_from(raw: ConfigUpdateRepr) -> Result<Self> {
        let map = raw
            .map
            .into_iter()
            .map(MapRule::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            base: raw.base,
            cwd: raw.cwd,
            alias: raw.alias,
            paths: raw.paths,
            vars: raw.vars,
            map,
            charset: raw.charset,
            cors: raw.cors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_tables_and_rules() {
        let mut config = LoaderConfig::new("http://h/app/")
            .with_alias("jquery", "lib/jquery")
            .with_map_rule(MapRule::replace(".js", "-debug.js"));

        let update = ConfigUpdate::from_json(
            r#"{
                "alias": { "react": "lib/react" },
                "vars": { "locale": "zh-cn" },
                "map": [["-debug", ""], { "pattern": "v(\\d+)", "replacement": "version$1" }],
                "cors-mode": "anonymous"
            }"#,
        )
        .unwrap();
        config.merge(update);

        assert_eq!(config.alias.get("jquery").map(String::as_str), Some("lib/jquery"));
        assert_eq!(config.alias.get("react").map(String::as_str), Some("lib/react"));
        assert_eq!(config.vars.get("locale").map(String::as_str), Some("zh-cn"));
        assert_eq!(config.map.len(), 3);
        assert_eq!(config.cors, Some(CorsMode::Anonymous));
        assert_eq!(config.charset.as_deref(), Some("utf-8"));
    }

    #[test]
    fn test_base_is_absolute_with_trailing_slash() {
        let mut config = LoaderConfig::new("http://h/app/page/");
        config.merge(ConfigUpdate {
            base: Some("../lib".to_string()),
            ..ConfigUpdate::default()
        });
        assert_eq!(config.base, "http://h/app/lib/");

        let config = LoaderConfig::new("http://h/app/").with_base("/static");
        assert_eq!(config.base, "http://h/static/");
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = ConfigUpdate::from_json(r#"{ "map": [{ "pattern": "(", "replacement": "" }] }"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_map_rule_apply() {
        let rule = MapRule::replace(".js", "-debug.js");
        assert_eq!(rule.apply("http://h/a.js"), "http://h/a-debug.js");

        let rule = MapRule::pattern(r"^http://h/", "https://cdn/").unwrap();
        assert_eq!(rule.apply("http://h/a.js"), "https://cdn/a.js");

        let rule = MapRule::func(|loc| loc.strip_suffix(".js").map(|s| format!("{s}.mjs")));
        assert_eq!(rule.apply("http://h/a.js"), "http://h/a.mjs");
        assert_eq!(rule.apply("http://h/a.css"), "http://h/a.css");
    }

    #[test]
    fn test_protocol_from_cwd() {
        assert_eq!(LoaderConfig::new("https://h/").protocol(), "https:");
        assert_eq!(LoaderConfig::new("").protocol(), "http:");
    }
}
