//! Command registration and dispatch.
//!
//! The router owns every registered template across all modules together
//! with the authorization policy. Dispatch reads an immutable snapshot of
//! that state, so concurrent `handle` calls never contend; registration,
//! unmapping and policy edits build a fresh state and swap it in under a
//! single writer lock.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::auth::{AuthPath, AuthPolicy};
use crate::invoke::{self, CancelToken, InvocationHandle, WorkerPool};
use crate::matcher;
use crate::message::{Location, Message};
use crate::template::{Bindings, Template};
use crate::Error;

/// A command handler bound to one or more templates.
///
/// Handlers are resolved at module load time into the registration table;
/// nothing is looked up reflectively at dispatch time.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Invoked with the originating message and the extracted bindings.
    ///
    /// Threaded handlers should check `cancel` around long operations or
    /// race it against their I/O.
    ///
    /// # Errors
    ///
    /// Any error returned here is caught at the dispatch boundary; it is
    /// logged and reported to the reply target, never propagated.
    async fn call(
        &self,
        message: &Message,
        args: &Bindings,
        cancel: &CancelToken,
    ) -> Result<(), Error>;
}

/// Opaque handle identifying one registration, usable to unmap it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(pub u64);

/// Options accepted by [`Router::map`].
#[derive(Debug, Clone, Default)]
pub struct MapOptions {
    auth_path: Option<String>,
    requirements: Vec<(String, String)>,
    defaults: Vec<(String, String)>,
    threaded: bool,
}

impl MapOptions {
    /// Creates the default option set: derived auth path, no requirements,
    /// no defaults, inline execution.
    #[must_use]
    pub fn new() -> MapOptions {
        MapOptions::default()
    }

    /// Gates the command behind an explicit authorization path. Templates
    /// with an explicit path fall back to deny when no policy rule exists.
    #[must_use]
    pub fn auth(mut self, path: &str) -> MapOptions {
        self.auth_path = Some(path.to_string());
        self
    }

    /// Requires the named parameter's bound value to match `regex`.
    #[must_use]
    pub fn require(mut self, name: &str, regex: &str) -> MapOptions {
        self.requirements.push((name.to_string(), regex.to_string()));
        self
    }

    /// Supplies a default for an optional parameter.
    #[must_use]
    pub fn default_value(mut self, name: &str, value: &str) -> MapOptions {
        self.defaults.push((name.to_string(), value.to_string()));
        self
    }

    /// Marks the command for execution on the worker pool.
    #[must_use]
    pub fn threaded(mut self, threaded: bool) -> MapOptions {
        self.threaded = threaded;
        self
    }
}

/// One template bound to its handler and authorization path.
#[derive(Clone)]
pub struct Registration {
    /// The handle returned by [`Router::map`].
    pub id: RegistrationId,
    /// The module that registered the command.
    pub module: String,
    /// The compiled pattern.
    pub template: Template,
    /// The effective authorization path.
    pub auth: AuthPath,
    /// Whether the path was given explicitly (deny fallback) or derived
    /// from the module name and literals (allow fallback).
    pub explicit_auth: bool,
    /// Whether invocations run on the worker pool.
    pub threaded: bool,
    /// The bound handler.
    pub handler: Arc<dyn Handler>,
}

impl Registration {
    pub(crate) fn new(
        id: RegistrationId,
        module: &str,
        template: Template,
        auth: AuthPath,
        explicit_auth: bool,
        threaded: bool,
        handler: Arc<dyn Handler>,
    ) -> Registration {
        Registration {
            id,
            module: module.to_string(),
            template,
            auth,
            explicit_auth,
            threaded,
            handler,
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.id)
            .field("module", &self.module)
            .field("template", &self.template)
            .field("auth", &self.auth)
            .field("threaded", &self.threaded)
            .finish_non_exhaustive()
    }
}

/// The registration table and policy, swapped wholesale on mutation.
#[derive(Debug, Clone, Default)]
pub struct RouterState {
    /// Registrations in registration order; earlier means higher priority.
    pub registrations: Vec<Registration>,
    /// The authorization tables.
    pub policy: AuthPolicy,
}

/// The result of dispatching one message.
#[derive(Debug)]
pub enum Outcome {
    /// No template recognized the input. Not an error; fallback
    /// collaborators may still act on the line.
    NoMatch,
    /// A template matched but the actor is not authorized. The handler was
    /// never invoked.
    Denied {
        /// The authorization path that denied the invocation.
        path: AuthPath,
    },
    /// The handler was invoked inline or submitted to the worker pool.
    Dispatched(InvocationHandle),
}

impl Outcome {
    /// True when a handler was invoked or submitted.
    #[must_use]
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Outcome::Dispatched(_))
    }
}

/// The command router: single entry point for inbound messages.
pub struct Router {
    state: RwLock<Arc<RouterState>>,
    pool: WorkerPool,
    next_id: AtomicU64,
}

impl Router {
    /// Creates a router whose worker pool runs at most `max_inflight`
    /// threaded handlers concurrently.
    #[must_use]
    pub fn new(max_inflight: usize) -> Router {
        Router {
            state: RwLock::new(Arc::new(RouterState::default())),
            pool: WorkerPool::new(max_inflight),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a command pattern bound to `handler`.
    ///
    /// When `options` carries no explicit auth path, one is derived from the
    /// module name and the pattern's literal tokens, e.g. `calendar::cal`.
    /// A registration whose literal/arity skeleton duplicates an existing
    /// one without distinguishing requirements is accepted but logged as
    /// ambiguous; the earlier registration keeps priority.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] when the pattern, a requirement or a
    /// default does not compile. The failure affects only this
    /// registration.
    pub fn map(
        &self,
        module: &str,
        pattern: &str,
        options: MapOptions,
        handler: Arc<dyn Handler>,
    ) -> Result<RegistrationId, Error> {
        let mut template = Template::compile(pattern)?;

        for (name, regex) in &options.requirements {
            template = template.with_requirement(name, regex)?;
        }
        for (name, value) in &options.defaults {
            template = template.with_default(name, value)?;
        }

        let (auth, explicit_auth) = match options.auth_path {
            Some(ref path) => (AuthPath::parse(path), true),
            None => {
                let mut segments = vec![module];
                segments.extend(template.literals());
                (AuthPath::from_segments(&segments), false)
            }
        };

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let registration = Registration::new(
            id,
            module,
            template,
            auth,
            explicit_auth,
            options.threaded,
            handler,
        );

        let mut guard = self.state.write().expect("router state lock poisoned");

        for existing in &guard.registrations {
            if existing.template.skeleton() == registration.template.skeleton()
                && existing.template.requirement_keys() == registration.template.requirement_keys()
            {
                warn!(
                    earlier = %existing.template,
                    later = %registration.template,
                    "ambiguous registration; first registered wins"
                );
            }
        }

        let mut next = (**guard).clone();
        next.registrations.push(registration);
        *guard = Arc::new(next);

        debug!(id = id.0, module, pattern, "mapped command");

        Ok(id)
    }

    /// Removes the registration identified by `id`. Returns whether it was
    /// present; unmapping twice is a no-op.
    pub fn unmap(&self, id: RegistrationId) -> bool {
        let mut guard = self.state.write().expect("router state lock poisoned");

        let mut next = (**guard).clone();
        let before = next.registrations.len();
        next.registrations.retain(|reg| reg.id != id);
        let removed = next.registrations.len() != before;
        *guard = Arc::new(next);

        removed
    }

    /// Declares a module's baseline policy for `path`. Re-declaring the
    /// same path overwrites the earlier baseline.
    pub fn default_auth(&self, path: &str, allow: bool) {
        self.edit_policy(|policy| policy.register_default(path, allow));
    }

    /// Sets an allow/deny rule for an actor class on `path`.
    pub fn set_class_rule(&self, class: &str, path: &str, allow: bool) {
        self.edit_policy(|policy| policy.set_class_rule(class, path, allow));
    }

    /// Sets an allow/deny rule scoped to one location on `path`.
    pub fn set_location_rule(&self, location: &Location, path: &str, allow: bool) {
        self.edit_policy(|policy| policy.set_location_rule(location, path, allow));
    }

    /// Applies one policy edit under the write lock and publishes a fresh
    /// snapshot, the same swap discipline as [`Router::map`].
    fn edit_policy(&self, edit: impl FnOnce(&mut AuthPolicy)) {
        let mut guard = self.state.write().expect("router state lock poisoned");

        let mut next = (**guard).clone();
        edit(&mut next.policy);
        *guard = Arc::new(next);
    }

    /// The current immutable state snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<RouterState> {
        Arc::clone(&self.state.read().expect("router state lock poisoned"))
    }

    /// Matches, authorizes and dispatches one inbound message.
    ///
    /// Non-threaded handlers run inline before this returns; they are
    /// contractually fast and non-blocking. Threaded handlers are submitted
    /// to the worker pool and this returns without waiting for them.
    pub async fn handle(&self, message: Message) -> Outcome {
        let state = self.snapshot();
        let tokens: Vec<&str> = message.text.split_whitespace().collect();

        let resolution = matcher::resolve(&tokens, &state.registrations);

        let Some(matched) = resolution.winner else {
            debug!(
                text = %message.text,
                candidates = resolution.failures.len(),
                "no command recognized"
            );
            return Outcome::NoMatch;
        };

        let registration = matched.registration;
        let allowed = state.policy.permitted(
            &message.actor,
            &message.location,
            &registration.auth,
            !registration.explicit_auth,
        );

        if !allowed {
            debug!(
                actor = %message.actor.nickname,
                location = %message.location,
                path = %registration.auth,
                "denied command invocation"
            );
            return Outcome::Denied {
                path: registration.auth.clone(),
            };
        }

        let handler = Arc::clone(&registration.handler);
        let bindings = matched.bindings;
        let pattern = registration.template.source().to_string();
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let fut = async move {
            let result = handler.call(&message, &bindings, &token).await;

            if let Err(ref err) = result {
                error!(
                    pattern,
                    actor = %message.actor.nickname,
                    location = %message.location,
                    error = %err,
                    "handler failed"
                );
                message.say(&format!("error: {err}"));
            }

            result
        };

        if registration.threaded {
            Outcome::Dispatched(self.pool.submit(cancel, fut))
        } else {
            Outcome::Dispatched(invoke::run_inline(cancel, fut).await)
        }
    }
}
