//! End-to-end dispatch through the preloaded plugin registry.

use std::sync::{Arc, Mutex};

use hermod::invoke::InvocationState;
use hermod::message::{Actor, Location, Message, Replier};
use hermod::plugin::Registry;
use hermod::{Outcome, Router};

struct Sink(Mutex<Vec<String>>);

impl Sink {
    fn new() -> Arc<Sink> {
        Arc::new(Sink(Mutex::new(Vec::new())))
    }

    fn lines(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Replier for Sink {
    fn say(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
}

fn setup() -> (Arc<Router>, Registry) {
    let router = Arc::new(Router::new(4));
    let registry = Registry::preloaded(&router);

    (router, registry)
}

fn message(text: &str, actor: Actor, reply: Arc<Sink>) -> Message {
    Message::new(
        text,
        actor,
        Location::Channel("#hermod".to_string()),
        reply as Arc<dyn Replier>,
    )
}

#[tokio::test]
async fn preloaded_registry_loads_every_plugin() {
    let (_router, registry) = setup();
    assert_eq!(registry.plugins.len(), 4);
}

#[tokio::test]
async fn echo_round_trip() {
    let (router, _registry) = setup();
    let sink = Sink::new();

    let outcome = router
        .handle(message("echo hello world", Actor::new("alice"), Arc::clone(&sink)))
        .await;

    assert!(outcome.is_dispatched());
    assert_eq!(sink.lines(), vec!["hello world"]);
}

#[tokio::test]
async fn calendar_distinguishes_arity_and_requirements() {
    let (router, _registry) = setup();

    let sink = Sink::new();
    let outcome = router
        .handle(message("cal 12 2024", Actor::new("alice"), Arc::clone(&sink)))
        .await;
    assert!(outcome.is_dispatched());
    assert_eq!(sink.lines()[0], "December 2024");

    let sink = Sink::new();
    let outcome = router
        .handle(message("cal", Actor::new("alice"), Arc::clone(&sink)))
        .await;
    assert!(outcome.is_dispatched());

    let sink = Sink::new();
    let outcome = router
        .handle(message("cal abc", Actor::new("alice"), Arc::clone(&sink)))
        .await;
    assert!(matches!(outcome, Outcome::NoMatch));
    assert!(sink.lines().is_empty());
}

#[tokio::test]
async fn moderation_is_denied_without_a_grant() {
    let (router, _registry) = setup();
    let sink = Sink::new();

    let outcome = router
        .handle(message("opme #hermod", Actor::new("alice"), Arc::clone(&sink)))
        .await;

    let Outcome::Denied { path } = outcome else {
        panic!("expected Denied");
    };
    assert_eq!(path.to_string(), "chan::op");
    assert!(sink.lines().is_empty());
}

#[tokio::test]
async fn moderation_allows_granted_operators() {
    let (router, _registry) = setup();
    router.set_class_rule("operator", "chan", true);

    let sink = Sink::new();
    let outcome = router
        .handle(message(
            "opme",
            Actor::with_classes("mk", &["operator"]),
            Arc::clone(&sink),
        ))
        .await;

    assert!(outcome.is_dispatched());
    assert_eq!(sink.lines(), vec!["+o mk on #hermod"]);
}

#[tokio::test(start_paused = true)]
async fn threaded_reminder_completes_off_the_dispatch_path() {
    let (router, _registry) = setup();
    let sink = Sink::new();

    let outcome = router
        .handle(message(
            "remind 10s tea is ready",
            Actor::new("mk"),
            Arc::clone(&sink),
        ))
        .await;

    let Outcome::Dispatched(mut handle) = outcome else {
        panic!("expected Dispatched");
    };
    assert_eq!(handle.finished().await, InvocationState::Completed);

    tokio::time::sleep(std::time::Duration::from_secs(11)).await;
    assert_eq!(sink.lines(), vec!["reminder set", "mk: tea is ready"]);
}

#[tokio::test]
async fn unmapping_a_plugin_command_and_remapping_it_restores_behavior() {
    let (router, _registry) = setup();

    // Find and remove the echo registration.
    let id = router
        .snapshot()
        .registrations
        .iter()
        .find(|reg| reg.module == "echo")
        .map(|reg| reg.id)
        .expect("echo should be registered");

    assert!(router.unmap(id));

    let sink = Sink::new();
    assert!(matches!(
        router
            .handle(message("echo hi", Actor::new("alice"), Arc::clone(&sink)))
            .await,
        Outcome::NoMatch
    ));

    // Re-register the same surface through a fresh plugin instance.
    use hermod::plugin::echo::Echo;
    use hermod::Plugin;
    Echo::new().register(&router).unwrap();

    let sink = Sink::new();
    assert!(router
        .handle(message("echo hi", Actor::new("alice"), Arc::clone(&sink)))
        .await
        .is_dispatched());
    assert_eq!(sink.lines(), vec!["hi"]);
}
