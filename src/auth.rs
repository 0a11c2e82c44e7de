//! Hierarchical authorization paths and the policy tables gating them.
//!
//! An [`AuthPath`] is a `::`-separated path such as `chan::op`. Policy is
//! resolved from the most specific path prefix to the least specific; at each
//! level actor-class rules win over location rules, which win over module
//! defaults. The first rule found decides, so an explicit deny on a deep
//! path overrides an inherited allow.

use std::collections::HashMap;
use std::fmt;

use crate::message::{Actor, Location};

/// Hierarchical permission key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthPath {
    segments: Vec<String>,
}

impl AuthPath {
    /// Parses a `::`-separated path, ignoring empty segments.
    #[must_use]
    pub fn parse(path: &str) -> AuthPath {
        AuthPath {
            segments: path
                .split("::")
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
        }
    }

    /// Builds a path from pre-split segments.
    #[must_use]
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> AuthPath {
        AuthPath {
            segments: segments.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    /// Iterates the canonical forms of this path from the full path down to
    /// its first segment, longest first.
    pub fn prefixes(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.segments.len())
            .rev()
            .map(move |len| self.segments[..len].join("::"))
    }

    /// True when the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for AuthPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("::"))
    }
}

/// Allow/deny tables consulted by the router before invoking a handler.
///
/// Mutated only at module load/rescan time; reads during dispatch see an
/// immutable snapshot.
#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    /// Baseline per-path defaults declared by modules.
    defaults: HashMap<String, bool>,
    /// Per-(class, path) operator rules.
    class_rules: HashMap<(String, String), bool>,
    /// Per-(location key, path) rules.
    location_rules: HashMap<(String, String), bool>,
}

impl AuthPolicy {
    /// Creates an empty policy.
    #[must_use]
    pub fn new() -> AuthPolicy {
        AuthPolicy::default()
    }

    /// Declares a module baseline for `path`. A later declaration for the
    /// same exact path overwrites the earlier one, which is what lets a
    /// rescan re-register its policy.
    pub fn register_default(&mut self, path: &str, allow: bool) {
        let path = AuthPath::parse(path).to_string();
        self.defaults.insert(path, allow);
    }

    /// Sets an allow/deny rule for an actor class on `path`.
    pub fn set_class_rule(&mut self, class: &str, path: &str, allow: bool) {
        let path = AuthPath::parse(path).to_string();
        self.class_rules.insert((class.to_string(), path), allow);
    }

    /// Sets an allow/deny rule scoped to one location on `path`.
    pub fn set_location_rule(&mut self, location: &Location, path: &str, allow: bool) {
        let path = AuthPath::parse(path).to_string();
        self.location_rules
            .insert((location.key().to_string(), path), allow);
    }

    /// Decides whether `actor` may invoke something gated by `path` at
    /// `location`.
    ///
    /// Walks path prefixes longest-first. At each level the actor's classes
    /// are consulted in order (ending with the implicit `everyone` class),
    /// then location rules, then module defaults. When no rule matches at
    /// any level, `fallback` applies. Pure function of the table state.
    #[must_use]
    pub fn permitted(
        &self,
        actor: &Actor,
        location: &Location,
        path: &AuthPath,
        fallback: bool,
    ) -> bool {
        for prefix in path.prefixes() {
            for class in actor.classes() {
                if let Some(&allow) = self
                    .class_rules
                    .get(&(class.to_string(), prefix.clone()))
                {
                    return allow;
                }
            }

            if let Some(&allow) = self
                .location_rules
                .get(&(location.key().to_string(), prefix.clone()))
            {
                return allow;
            }

            if let Some(&allow) = self.defaults.get(&prefix) {
                return allow;
            }
        }

        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chan() -> Location {
        Location::Channel("#test".to_string())
    }

    #[test]
    fn parse_splits_on_double_colon() {
        let path = AuthPath::parse("edit::onjoin");
        let prefixes: Vec<_> = path.prefixes().collect();

        assert_eq!(prefixes, vec!["edit::onjoin", "edit"]);
    }

    #[test]
    fn undeclared_path_uses_the_fallback() {
        let policy = AuthPolicy::new();
        let actor = Actor::new("alice");

        assert!(policy.permitted(&actor, &chan(), &AuthPath::parse("echo"), true));
        assert!(!policy.permitted(&actor, &chan(), &AuthPath::parse("edit"), false));
    }

    #[test]
    fn module_default_decides_when_declared() {
        let mut policy = AuthPolicy::new();
        policy.register_default("edit", false);

        let actor = Actor::new("alice");
        assert!(!policy.permitted(&actor, &chan(), &AuthPath::parse("edit::onjoin"), true));
    }

    #[test]
    fn redeclaring_a_default_overwrites_it() {
        let mut policy = AuthPolicy::new();
        policy.register_default("edit", false);
        policy.register_default("edit", true);

        let actor = Actor::new("alice");
        assert!(policy.permitted(&actor, &chan(), &AuthPath::parse("edit"), false));
    }

    #[test]
    fn class_rule_wins_over_module_default() {
        let mut policy = AuthPolicy::new();
        policy.register_default("chan", false);
        policy.set_class_rule("operator", "chan", true);

        let operator = Actor::with_classes("mk", &["operator"]);
        let stranger = Actor::new("alice");
        let path = AuthPath::parse("chan::op");

        assert!(policy.permitted(&operator, &chan(), &path, false));
        assert!(!policy.permitted(&stranger, &chan(), &path, false));
    }

    #[test]
    fn specific_deny_overrides_inherited_allow() {
        let mut policy = AuthPolicy::new();
        policy.register_default("chan", true);
        policy.register_default("chan::kick", false);

        let actor = Actor::new("alice");
        assert!(policy.permitted(&actor, &chan(), &AuthPath::parse("chan::op"), false));
        assert!(!policy.permitted(&actor, &chan(), &AuthPath::parse("chan::kick"), true));
    }

    #[test]
    fn location_rule_applies_between_class_and_default() {
        let mut policy = AuthPolicy::new();
        policy.register_default("games", true);
        policy.set_location_rule(&Location::Channel("#serious".to_string()), "games", false);

        let actor = Actor::new("alice");
        let path = AuthPath::parse("games::trivia");

        assert!(policy.permitted(&actor, &chan(), &path, false));
        assert!(!policy.permitted(
            &actor,
            &Location::Channel("#serious".to_string()),
            &path,
            false
        ));
    }

    #[test]
    fn everyone_class_rule_applies_to_all_actors() {
        let mut policy = AuthPolicy::new();
        policy.set_class_rule(crate::message::EVERYONE, "quotes", true);

        let actor = Actor::new("alice");
        assert!(policy.permitted(&actor, &chan(), &AuthPath::parse("quotes::add"), false));
    }

    #[test]
    fn resolution_is_deterministic() {
        let mut policy = AuthPolicy::new();
        policy.register_default("edit", false);
        policy.set_class_rule("operator", "edit::onjoin", true);

        let actor = Actor::with_classes("mk", &["operator"]);
        let path = AuthPath::parse("edit::onjoin");

        let first = policy.permitted(&actor, &chan(), &path, false);
        let second = policy.permitted(&actor, &chan(), &path, false);
        assert_eq!(first, second);
        assert!(first);
    }
}
