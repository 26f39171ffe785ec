//! Target resolution
//!
//! A task's target map associates target names with a config object, the
//! name of another target (alias) or an array of either (a target set).

use crate::config::merge::merge;
use crate::error::{ConfigError, ConfigResult};
use serde_json::{Map, Value};

/// A resolved target
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTarget {
    /// A single config value, not yet merged with task defaults
    Single(Value),

    /// An ordered list of configs, each to be merged with task defaults
    Set(Vec<Value>),
}

impl ResolvedTarget {
    /// Merge `defaults` under every config, returning fresh copies
    pub fn with_defaults(&self, defaults: Option<&Value>) -> ResolvedTarget {
        let apply = |config: &Value| match defaults {
            Some(defaults) => merge([defaults, config]),
            None => merge([config]),
        };
        match self {
            ResolvedTarget::Single(config) => ResolvedTarget::Single(apply(config)),
            ResolvedTarget::Set(configs) => ResolvedTarget::Set(configs.iter().map(apply).collect()),
        }
    }

    /// Apply `f` to every config
    pub fn try_map<E>(self, mut f: impl FnMut(Value) -> Result<Value, E>) -> Result<ResolvedTarget, E> {
        Ok(match self {
            ResolvedTarget::Single(config) => ResolvedTarget::Single(f(config)?),
            ResolvedTarget::Set(configs) => {
                ResolvedTarget::Set(configs.into_iter().map(f).collect::<Result<_, E>>()?)
            }
        })
    }

    /// Whether this is a target set
    pub fn is_set(&self) -> bool {
        matches!(self, ResolvedTarget::Set(_))
    }

    /// Plain JSON rendition: an object or an array of objects
    pub fn into_value(self) -> Value {
        match self {
            ResolvedTarget::Single(config) => config,
            ResolvedTarget::Set(configs) => Value::Array(configs),
        }
    }
}

/// Resolve `name` within `targets`.
///
/// Missing names resolve to an empty object. Alias strings are followed
/// within the same map; arrays resolve element by element into a target
/// set (nested sets are flattened in order). An alias that leads back to
/// a name already on the current resolution path fails with
/// [`ConfigError::AliasCycle`].
pub fn resolve_target(name: &str, targets: &Map<String, Value>) -> ConfigResult<ResolvedTarget> {
    let mut path = Vec::new();
    resolve_named(name, targets, &mut path)
}

fn resolve_named(
    name: &str,
    targets: &Map<String, Value>,
    path: &mut Vec<String>,
) -> ConfigResult<ResolvedTarget> {
    if path.iter().any(|seen| seen == name) {
        path.push(name.to_string());
        return Err(ConfigError::AliasCycle(format!("targets: {}", path.join(" -> "))));
    }

    let Some(value) = targets.get(name) else {
        return Ok(ResolvedTarget::Single(Value::Object(Map::new())));
    };

    path.push(name.to_string());
    let resolved = resolve_value(value, targets, path);
    path.pop();
    resolved
}

fn resolve_value(
    value: &Value,
    targets: &Map<String, Value>,
    path: &mut Vec<String>,
) -> ConfigResult<ResolvedTarget> {
    match value {
        Value::String(alias) => resolve_named(alias, targets, path),
        Value::Array(items) => {
            let mut configs = Vec::with_capacity(items.len());
            for item in items {
                match resolve_value(item, targets, path)? {
                    ResolvedTarget::Single(config) => configs.push(config),
                    ResolvedTarget::Set(nested) => configs.extend(nested),
                }
            }
            Ok(ResolvedTarget::Set(configs))
        }
        other => Ok(ResolvedTarget::Single(other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn targets(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("targets must be an object"),
        }
    }

    #[test]
    fn test_missing_target_is_empty_object() {
        let map = targets(json!({}));
        assert_eq!(
            resolve_target("default", &map).unwrap(),
            ResolvedTarget::Single(json!({}))
        );
    }

    #[test]
    fn test_plain_object() {
        let map = targets(json!({"default": {"a": 1}}));
        assert_eq!(
            resolve_target("default", &map).unwrap(),
            ResolvedTarget::Single(json!({"a": 1}))
        );
    }

    #[test]
    fn test_alias_chain() {
        let map = targets(json!({
            "default": "ci",
            "ci": "production",
            "production": {"minify": true}
        }));
        assert_eq!(
            resolve_target("default", &map).unwrap(),
            ResolvedTarget::Single(json!({"minify": true}))
        );
    }

    #[test]
    fn test_target_set_with_aliases_and_literals() {
        let map = targets(json!({
            "default": ["s1", {"inline": true}, "s2"],
            "s1": {"i": 0},
            "s2": {"i": 1}
        }));
        assert_eq!(
            resolve_target("default", &map).unwrap(),
            ResolvedTarget::Set(vec![json!({"i": 0}), json!({"inline": true}), json!({"i": 1})])
        );
    }

    #[test]
    fn test_nested_sets_are_flattened() {
        let map = targets(json!({
            "all": ["pair", {"i": 2}],
            "pair": [{"i": 0}, {"i": 1}]
        }));
        assert_eq!(
            resolve_target("all", &map).unwrap(),
            ResolvedTarget::Set(vec![json!({"i": 0}), json!({"i": 1}), json!({"i": 2})])
        );
    }

    #[test]
    fn test_same_alias_twice_in_a_set_is_not_a_cycle() {
        let map = targets(json!({"default": ["a", "a"], "a": {"x": 1}}));
        assert_eq!(
            resolve_target("default", &map).unwrap(),
            ResolvedTarget::Set(vec![json!({"x": 1}), json!({"x": 1})])
        );
    }

    #[test]
    fn test_alias_cycle_is_detected() {
        let map = targets(json!({"a": "b", "b": "c", "c": "a"}));
        let err = resolve_target("a", &map).unwrap_err();
        match err {
            ConfigError::AliasCycle(chain) => assert!(chain.contains("a -> b -> c -> a")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_cycle_through_a_set_is_detected() {
        let map = targets(json!({"default": ["default"]}));
        assert!(matches!(
            resolve_target("default", &map),
            Err(ConfigError::AliasCycle(_))
        ));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let map = targets(json!({"default": ["s1", "s2"], "s1": {"i": 0}, "s2": {"i": 1}}));
        let defaults = json!({"shared": true});
        let first = resolve_target("default", &map).unwrap().with_defaults(Some(&defaults));
        let second = resolve_target("default", &map).unwrap().with_defaults(Some(&defaults));
        assert_eq!(first, second);
        assert_eq!(
            first.into_value(),
            json!([{"i": 0, "shared": true}, {"i": 1, "shared": true}])
        );
    }

    #[test]
    fn test_custom_values_win_over_defaults() {
        let resolved = ResolvedTarget::Single(json!({"mode": "custom"}))
            .with_defaults(Some(&json!({"mode": "default", "keep": 1})));
        assert_eq!(resolved.into_value(), json!({"mode": "custom", "keep": 1}));
    }
}
