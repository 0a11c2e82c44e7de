use crate::plugin::prelude::*;

pub struct Echo;

struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn call(
        &self,
        message: &Message,
        args: &Bindings,
        _cancel: &CancelToken,
    ) -> Result<(), Error> {
        if let Some(text) = args.joined("text") {
            message.say(&text);
        }

        Ok(())
    }
}

impl Plugin for Echo {
    fn new() -> Echo {
        Echo {}
    }

    fn name() -> Name {
        Name("echo")
    }

    fn author() -> Author {
        Author("Hermod contributors")
    }

    fn version() -> Version {
        Version("0.1")
    }

    fn register(&self, router: &Router) -> Result<(), Error> {
        router.map("echo", "echo *text", MapOptions::new(), Arc::new(EchoHandler))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use crate::message::{Actor, Location, Replier};
    use crate::router::Outcome;

    use super::*;

    struct Sink(Mutex<Vec<String>>);

    impl Replier for Sink {
        fn say(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    #[tokio::test]
    async fn echo_repeats_its_arguments() {
        let router = Router::new(1);
        Echo::new().register(&router).unwrap();

        let sink = Arc::new(Sink(Mutex::new(Vec::new())));
        let message = Message::new(
            "echo hello there",
            Actor::new("alice"),
            Location::Channel("#test".to_string()),
            Arc::clone(&sink) as Arc<dyn Replier>,
        );

        assert!(router.handle(message).await.is_dispatched());
        assert_eq!(*sink.0.lock().unwrap(), vec!["hello there"]);
    }

    #[tokio::test]
    async fn bare_echo_is_not_a_match() {
        let router = Router::new(1);
        Echo::new().register(&router).unwrap();

        let message = Message::new(
            "echo",
            Actor::new("alice"),
            Location::Private,
            Arc::new(crate::message::NullReplier),
        );

        assert!(matches!(router.handle(message).await, Outcome::NoMatch));
    }
}
