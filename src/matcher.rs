//! Resolution of a tokenized line against the registered templates.

use crate::router::Registration;
use crate::template::Bindings;

/// Why a candidate template was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchFailure {
    /// The token sequence does not align with the template structure
    /// (wrong literals or arity).
    Structure,
    /// The structure aligned but a bound value failed its requirement
    /// regex. A soft failure; later templates are still tried.
    Requirement {
        /// The parameter whose value was rejected.
        param: String,
    },
}

/// A winning match.
#[derive(Debug)]
pub struct Match<'a> {
    /// The registration that won.
    pub registration: &'a Registration,
    /// The extracted parameter bindings.
    pub bindings: Bindings,
}

/// The outcome of resolving one input line.
///
/// A resolution without a winner is the normal "no command recognized"
/// case, not an error; the failure list explains why each candidate was
/// rejected.
#[derive(Debug)]
pub struct Resolution<'a> {
    /// The first registration that matched and met its requirements.
    pub winner: Option<Match<'a>>,
    /// Rejected candidates in registration order, with reasons.
    pub failures: Vec<(&'a Registration, MatchFailure)>,
}

impl Resolution<'_> {
    /// True when some template won.
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.winner.is_some()
    }
}

/// Resolves `tokens` against `registrations` in registration order.
///
/// Earlier registration means higher priority; the first template that both
/// aligns structurally and satisfies all of its requirement regexes wins.
#[must_use]
pub fn resolve<'a>(tokens: &[&str], registrations: &'a [Registration]) -> Resolution<'a> {
    let mut failures = Vec::new();

    if tokens.is_empty() {
        return Resolution {
            winner: None,
            failures,
        };
    }

    for registration in registrations {
        let Some(bindings) = registration.template.try_match(tokens) else {
            failures.push((registration, MatchFailure::Structure));
            continue;
        };

        if let Some(param) = registration.template.unmet_requirement(&bindings) {
            failures.push((
                registration,
                MatchFailure::Requirement {
                    param: param.to_string(),
                },
            ));
            continue;
        }

        return Resolution {
            winner: Some(Match {
                registration,
                bindings,
            }),
            failures,
        };
    }

    Resolution {
        winner: None,
        failures,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::auth::AuthPath;
    use crate::invoke::CancelToken;
    use crate::message::Message;
    use crate::router::{Handler, Registration, RegistrationId};
    use crate::template::Template;
    use crate::Error;

    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn call(
            &self,
            _message: &Message,
            _args: &Bindings,
            _cancel: &CancelToken,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    fn registration(id: u64, template: Template) -> Registration {
        let auth = AuthPath::parse("test");

        Registration::new(
            RegistrationId(id),
            "test",
            template,
            auth,
            false,
            false,
            Arc::new(NoopHandler),
        )
    }

    fn tokens(line: &str) -> Vec<&str> {
        line.split_whitespace().collect()
    }

    #[test]
    fn empty_input_has_no_winner() {
        let regs = vec![registration(1, Template::compile("ping").unwrap())];
        let resolution = resolve(&[], &regs);

        assert!(!resolution.is_match());
        assert!(resolution.failures.is_empty());
    }

    #[test]
    fn unknown_command_collects_structure_failures() {
        let regs = vec![
            registration(1, Template::compile("ping").unwrap()),
            registration(2, Template::compile("echo *text").unwrap()),
        ];

        let resolution = resolve(&tokens("quux"), &regs);
        assert!(!resolution.is_match());
        assert_eq!(resolution.failures.len(), 2);
        assert!(resolution
            .failures
            .iter()
            .all(|(_, failure)| *failure == MatchFailure::Structure));
    }

    #[test]
    fn first_registered_template_wins_ties() {
        let regs = vec![
            registration(1, Template::compile("roll :dice").unwrap()),
            registration(2, Template::compile("roll :sides").unwrap()),
        ];

        let resolution = resolve(&tokens("roll 2d6"), &regs);
        let winner = resolution.winner.unwrap();

        assert_eq!(winner.registration.id, RegistrationId(1));
        assert_eq!(winner.bindings.get("dice"), Some("2d6"));
    }

    #[test]
    fn requirement_rejection_is_soft() {
        let with_req = Template::compile("cal :month :year")
            .unwrap()
            .with_requirement("month", r"^\d+$")
            .unwrap()
            .with_requirement("year", r"^\d+$")
            .unwrap();
        let regs = vec![
            registration(1, with_req),
            registration(2, Template::compile("cal").unwrap()),
        ];

        // Numeric arguments satisfy the first template.
        let resolution = resolve(&tokens("cal 12 2024"), &regs);
        let winner = resolution.winner.unwrap();
        assert_eq!(winner.registration.id, RegistrationId(1));
        assert_eq!(winner.bindings.get("month"), Some("12"));
        assert_eq!(winner.bindings.get("year"), Some("2024"));

        // The bare fallback still matches.
        let resolution = resolve(&tokens("cal"), &regs);
        assert_eq!(
            resolution.winner.unwrap().registration.id,
            RegistrationId(2)
        );

        // One non-numeric argument fails the first on a requirement and the
        // second on arity.
        let resolution = resolve(&tokens("cal abc"), &regs);
        assert!(!resolution.is_match());
        assert_eq!(resolution.failures.len(), 2);
        assert_eq!(resolution.failures[0].1, MatchFailure::Structure);
        assert_eq!(resolution.failures[1].1, MatchFailure::Structure);
    }

    #[test]
    fn requirement_failure_is_reported_by_parameter() {
        let with_req = Template::compile("cal :month")
            .unwrap()
            .with_requirement("month", r"^\d+$")
            .unwrap();
        let regs = vec![registration(1, with_req)];

        let resolution = resolve(&tokens("cal dec"), &regs);
        assert!(!resolution.is_match());
        assert_eq!(
            resolution.failures[0].1,
            MatchFailure::Requirement {
                param: "month".to_string()
            }
        );
    }

    #[test]
    fn similar_prefixes_never_cross_match() {
        let regs = vec![
            registration(1, Template::compile("op [:user] [:channel]").unwrap()),
            registration(2, Template::compile("opme [:channel]").unwrap()),
        ];

        let resolution = resolve(&tokens("opme #foo"), &regs);
        let winner = resolution.winner.unwrap();

        assert_eq!(winner.registration.id, RegistrationId(2));
        assert_eq!(winner.bindings.get("channel"), Some("#foo"));
        assert_eq!(resolution.failures[0].1, MatchFailure::Structure);
    }
}
