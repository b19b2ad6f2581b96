//! Action registries.
//!
//! An actor's behavior is a registry of named actions. A handler receives
//! the actor's private state, a reference to the actor itself and the
//! request arguments, and returns an [`Async`]: a value, a failure, a
//! deferred or a coroutine.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strand_core::value::{from_value, to_value};
use strand_core::{ConcurrencyError, Value};

use super::ActorRef;
use crate::deferred::Async;

type Handler<S> = Box<dyn FnMut(&mut S, &ActorRef, Vec<Value>) -> Async + Send + 'static>;

/// Named handlers over actor state `S`.
pub struct Actions<S> {
    handlers: HashMap<String, Handler<S>>,
    names: Vec<String>,
    problems: Vec<String>,
}

impl<S: Send + 'static> Actions<S> {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            names: Vec::new(),
            problems: Vec::new(),
        }
    }

    /// Register `handler` under `name`.
    ///
    /// Invalid or duplicate names are recorded and reported when the actor
    /// is spawned.
    pub fn action<F, R>(mut self, name: &str, mut handler: F) -> Self
    where
        F: FnMut(&mut S, &ActorRef, Vec<Value>) -> R + Send + 'static,
        R: Into<Async>,
    {
        if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
            self.problems.push(format!("invalid action name {:?}", name));
            return self;
        }
        if self.handlers.contains_key(name) {
            self.problems.push(format!("duplicate action {}", name));
            return self;
        }

        self.names.push(name.to_string());
        self.handlers.insert(
            name.to_string(),
            Box::new(move |state, actor, args| handler(state, actor, args).into()),
        );
        self
    }

    /// Register a handler taking deserialized arguments.
    ///
    /// The positional arguments are deserialized as a JSON array into `A`,
    /// so a tuple `(i64, String)` matches two arguments. The handler's
    /// result is serialized back into a value.
    pub fn typed_action<A, R, F>(self, name: &str, mut handler: F) -> Self
    where
        A: DeserializeOwned,
        R: Serialize,
        F: FnMut(&mut S, A) -> strand_core::Result<R> + Send + 'static,
    {
        self.action(name, move |state: &mut S, _actor: &ActorRef, args: Vec<Value>| {
            from_value::<A>(Value::Array(args))
                .and_then(|input| handler(state, input))
                .and_then(to_value)
        })
    }

    /// Registered action names in registration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether an action is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub(crate) fn validate(&self, actor: &str) -> Result<(), ConcurrencyError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(ConcurrencyError::InvalidActions {
                actor: actor.to_string(),
                reason: self.problems.join(", "),
            })
        }
    }

    pub(crate) fn dispatch(
        &mut self,
        state: &mut S,
        actor: &ActorRef,
        action: &str,
        args: Vec<Value>,
    ) -> Option<Async> {
        self.handlers
            .get_mut(action)
            .map(|handler| handler(state, actor, args))
    }
}

impl<S: Send + 'static> Default for Actions<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Actions<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actions")
            .field("names", &self.names)
            .field("problems", &self.problems)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registration_order_and_lookup() {
        let actions: Actions<u32> = Actions::new()
            .action("increment", |count: &mut u32, _: &ActorRef, _| {
                *count += 1;
                json!(*count)
            })
            .typed_action("add", |count: &mut u32, (amount,): (u32,)| {
                *count += amount;
                Ok(*count)
            });

        assert_eq!(actions.names(), ["increment", "add"]);
        assert!(actions.contains("add"));
        assert!(!actions.contains("remove"));
        assert!(actions.validate("counter").is_ok());
    }

    #[test]
    fn test_duplicate_and_empty_names_are_rejected() {
        let actions: Actions<()> = Actions::new()
            .action("ping", |_: &mut (), _: &ActorRef, _| json!(1))
            .action("ping", |_: &mut (), _: &ActorRef, _| json!(2))
            .action("", |_: &mut (), _: &ActorRef, _| json!(3));

        match actions.validate("broken") {
            Err(ConcurrencyError::InvalidActions { actor, reason }) => {
                assert_eq!(actor, "broken");
                assert!(reason.contains("duplicate action ping"));
                assert!(reason.contains("invalid action name"));
            }
            other => panic!("Expected invalid actions, got {:?}", other),
        }
        assert_eq!(actions.names(), ["ping"]);
    }
}
