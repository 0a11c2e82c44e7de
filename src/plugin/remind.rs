//! Delayed reminders built on the one-shot timer.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::invoke::{self, TimerHandle};
use crate::plugin::prelude::*;

pub struct Remind {
    /// Pending reminder timers per nickname.
    timers: Arc<Mutex<HashMap<String, Vec<TimerHandle>>>>,
}

struct ScheduleHandler {
    timers: Arc<Mutex<HashMap<String, Vec<TimerHandle>>>>,
}

#[async_trait]
impl Handler for ScheduleHandler {
    async fn call(
        &self,
        message: &Message,
        args: &Bindings,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        // The requirement regex guarantees the delay shape.
        let delay = args.get("delay").unwrap_or_default();
        let Some(delay) = parse_delay(delay) else {
            message.say("could not parse that delay");
            return Ok(());
        };

        let text = args.joined("text").unwrap_or_default();
        let reminder = message.clone();

        let handle = invoke::after(delay, move || async move {
            reminder.say(&format!("{}: {}", reminder.actor.nickname, text));
        });

        self.timers
            .lock()
            .expect("reminder table lock poisoned")
            .entry(message.actor.nickname.clone())
            .or_default()
            .push(handle);

        message.say("reminder set");

        Ok(())
    }
}

struct CancelHandler {
    timers: Arc<Mutex<HashMap<String, Vec<TimerHandle>>>>,
}

#[async_trait]
impl Handler for CancelHandler {
    async fn call(
        &self,
        message: &Message,
        _args: &Bindings,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        let handles = self
            .timers
            .lock()
            .expect("reminder table lock poisoned")
            .remove(&message.actor.nickname)
            .unwrap_or_default();

        // Cancelling is idempotent, so already-fired timers are harmless.
        for handle in &handles {
            handle.cancel();
        }

        message.say(&format!("cancelled {} reminder(s)", handles.len()));

        Ok(())
    }
}

/// Parses delays like `30`, `30s`, `5m` or `2h` into a duration; a bare
/// number means seconds.
fn parse_delay(s: &str) -> Option<Duration> {
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    };

    let amount: u64 = digits.parse().ok()?;

    let seconds = match unit {
        "" | "s" => amount,
        "m" => amount.checked_mul(60)?,
        "h" => amount.checked_mul(3600)?,
        _ => return None,
    };

    Some(Duration::from_secs(seconds))
}

impl Plugin for Remind {
    fn new() -> Remind {
        Remind {
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn name() -> Name {
        Name("remind")
    }

    fn author() -> Author {
        Author("Hermod contributors")
    }

    fn version() -> Version {
        Version("0.1")
    }

    fn register(&self, router: &Router) -> Result<(), Error> {
        router.map(
            "remind",
            "remind cancel",
            MapOptions::new(),
            Arc::new(CancelHandler {
                timers: Arc::clone(&self.timers),
            }),
        )?;
        router.map(
            "remind",
            "remind :delay *text",
            MapOptions::new()
                .require("delay", r"^\d+[smh]?$")
                .threaded(true),
            Arc::new(ScheduleHandler {
                timers: Arc::clone(&self.timers),
            }),
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::message::{Actor, Location, Replier};
    use crate::router::Outcome;

    use super::*;

    struct Sink(Mutex<Vec<String>>);

    impl Replier for Sink {
        fn say(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn message(text: &str, reply: Arc<dyn Replier>) -> Message {
        Message::new(
            text,
            Actor::new("mk"),
            Location::Channel("#test".to_string()),
            reply,
        )
    }

    #[test]
    fn delays_parse_with_and_without_units() {
        assert_eq!(parse_delay("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_delay("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_delay("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_delay("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_delay("soon"), None);
    }

    #[test]
    fn absurdly_large_delays_are_rejected_not_wrapped() {
        assert_eq!(parse_delay(&format!("{}h", u64::MAX)), None);
        assert_eq!(parse_delay(&format!("{}m", u64::MAX)), None);
        // The largest representable second count still parses.
        assert_eq!(parse_delay(&format!("{}s", u64::MAX)), Some(Duration::from_secs(u64::MAX)));
    }

    #[tokio::test(start_paused = true)]
    async fn reminder_fires_after_the_delay() {
        let router = Router::new(2);
        Remind::new().register(&router).unwrap();

        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        let outcome = router
            .handle(message(
                "remind 5s drink coffee",
                Arc::clone(&sink) as Arc<dyn Replier>,
            ))
            .await;

        let Outcome::Dispatched(mut handle) = outcome else {
            panic!("expected Dispatched");
        };
        handle.finished().await;
        assert_eq!(*sink.0.lock().unwrap(), vec!["reminder set"]);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec!["reminder set", "mk: drink coffee"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_reminders_never_fire() {
        let router = Router::new(2);
        Remind::new().register(&router).unwrap();

        let sink = Arc::new(Sink(Mutex::new(Vec::new())));

        let Outcome::Dispatched(mut handle) = router
            .handle(message(
                "remind 1h stretch",
                Arc::clone(&sink) as Arc<dyn Replier>,
            ))
            .await
        else {
            panic!("expected Dispatched");
        };
        handle.finished().await;

        router
            .handle(message(
                "remind cancel",
                Arc::clone(&sink) as Arc<dyn Replier>,
            ))
            .await;

        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec!["reminder set", "cancelled 1 reminder(s)"]
        );
    }

    #[tokio::test]
    async fn cancel_with_nothing_pending_is_a_no_op() {
        let router = Router::new(2);
        Remind::new().register(&router).unwrap();

        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        router
            .handle(message(
                "remind cancel",
                Arc::clone(&sink) as Arc<dyn Replier>,
            ))
            .await;

        assert_eq!(*sink.0.lock().unwrap(), vec!["cancelled 0 reminder(s)"]);
    }
}
