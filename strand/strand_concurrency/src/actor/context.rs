//! The actor executing on the current thread.

use std::cell::RefCell;

use super::ActorRef;

thread_local! {
    static CURRENT: RefCell<Option<ActorRef>> = const { RefCell::new(None) };
}

/// The actor whose loop runs on this thread, if any.
pub fn get_actor() -> Option<ActorRef> {
    CURRENT.with(|current| current.borrow().clone())
}

pub(crate) fn current_actor_name() -> Option<String> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|actor| actor.name().to_string())
    })
}

/// Whether `actor` is the one running on this thread.
pub(crate) fn is_current(actor: &ActorRef) -> bool {
    CURRENT.with(|current| current.borrow().as_ref() == Some(actor))
}

/// Installs an actor as current until dropped.
pub(crate) struct ContextGuard {
    previous: Option<ActorRef>,
}

pub(crate) fn enter(actor: ActorRef) -> ContextGuard {
    let previous = CURRENT.with(|current| current.borrow_mut().replace(actor));
    ContextGuard { previous }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}
