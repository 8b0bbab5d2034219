//! Inbound message dispatch.
//!
//! One registered handler per message kind. Routing failures are contained
//! here: an unmatched kind is dropped with a diagnostic, and a handler error
//! is logged and swallowed — one bad message never terminates the connection.

use std::collections::HashMap;

use log::{debug, warn};

use parley_protocol::{MessageKind, ServerMessage};

use crate::error::EngineError;

/// Handler for one message kind, mutating the engine context `C`.
pub type Handler<C> = Box<dyn Fn(&mut C, ServerMessage) -> Result<(), EngineError> + Send>;

/// Registry routing each decoded message to exactly one handler.
pub struct Dispatcher<C> {
    handlers: HashMap<MessageKind, Handler<C>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `kind`. Idempotent: re-registering overwrites the
    /// previous binding with a warning.
    pub fn register(&mut self, kind: MessageKind, handler: Handler<C>) {
        if self.handlers.insert(kind, handler).is_some() {
            warn!("handler for {kind:?} overwritten");
        }
    }

    /// Routes one message. The dispatcher never originates outbound traffic.
    pub fn dispatch(&self, context: &mut C, message: ServerMessage) {
        let kind = message.kind();
        match self.handlers.get(&kind) {
            Some(handler) => {
                if let Err(e) = handler(context, message) {
                    warn!("handler for {kind:?} failed: {e}");
                }
            }
            None => debug!("no handler for {kind:?}, message dropped"),
        }
    }

    pub fn is_registered(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        pongs: usize,
        errors: usize,
    }

    #[test]
    fn test_routes_to_single_matching_handler() {
        let mut dispatcher: Dispatcher<Counter> = Dispatcher::new();
        dispatcher.register(
            MessageKind::Pong,
            Box::new(|c, _| {
                c.pongs += 1;
                Ok(())
            }),
        );

        let mut counter = Counter::default();
        dispatcher.dispatch(&mut counter, ServerMessage::Pong);
        dispatcher.dispatch(
            &mut counter,
            ServerMessage::Warning {
                warning: "unrouted".to_string(),
            },
        );

        assert_eq!(counter.pongs, 1);
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut dispatcher: Dispatcher<Counter> = Dispatcher::new();
        dispatcher.register(MessageKind::Pong, Box::new(|_, _| Ok(())));
        dispatcher.register(
            MessageKind::Pong,
            Box::new(|c, _| {
                c.pongs += 10;
                Ok(())
            }),
        );

        let mut counter = Counter::default();
        dispatcher.dispatch(&mut counter, ServerMessage::Pong);
        assert_eq!(counter.pongs, 10);
    }

    #[test]
    fn test_handler_error_is_contained() {
        let mut dispatcher: Dispatcher<Counter> = Dispatcher::new();
        dispatcher.register(
            MessageKind::Pong,
            Box::new(|c, _| {
                c.errors += 1;
                Err(EngineError::NotConnected)
            }),
        );

        let mut counter = Counter::default();
        dispatcher.dispatch(&mut counter, ServerMessage::Pong);
        dispatcher.dispatch(&mut counter, ServerMessage::Pong);
        assert_eq!(counter.errors, 2);
    }
}
