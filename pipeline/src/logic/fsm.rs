//! Small FSM runtime: keyed states, pluggable handlers, intent emission
//!
//! SPDX-License-Identifier: GPL-3.0-or-later

use crate::logic::context::SessionContext;
use crate::logic::events::SessionEvent;
use crate::logic::intent::Intent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

/// Trait bound for the enum-like state keys. Keys are tiny copyable enums
/// that must also be printable and serializable for logs, telemetry and
/// replay files.
pub trait StateKeyLike:
    Eq + Hash + Copy + Display + Serialize + for<'de> Deserialize<'de> + 'static
{
}
impl<T> StateKeyLike for T where
    T: Eq + Hash + Copy + Display + Serialize + for<'de> Deserialize<'de> + 'static
{
}

/// Decision returned by a state handler.
/// Stay(intents) keeps the current state, Transition switches to `to`.
pub(crate) enum TransitionDecision<K> {
    Stay(Vec<Intent>),
    Transition {
        to: K,
        reason: String,
        intents: Vec<Intent>,
    },
}

/// Per-state event handler: reads and writes the shared context, then
/// decides whether to stay or move, plus which side effects to request.
/// Handlers never touch transports directly; that is what intents are for.
pub(crate) trait StateHandler<K: StateKeyLike> {
    fn on_event(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
    ) -> TransitionDecision<K>;
}

/// Maps each state key to its handler. One registry per state machine; the
/// controller routes every event through all registries it owns.
pub(crate) struct FsmRegistry<K: StateKeyLike> {
    handlers: HashMap<K, Box<dyn StateHandler<K>>>,
}

impl<K: StateKeyLike> FsmRegistry<K> {
    pub(crate) fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub(crate) fn register(&mut self, state: K, handler: Box<dyn StateHandler<K>>) {
        self.handlers.insert(state, handler);
    }

    /// Route an event to the current state's handler and return (next_state,
    /// intents). On a transition a LogTransition intent is prepended so the
    /// move shows up in telemetry before its side effects. The caller commits
    /// next_state after the intents have run.
    pub(crate) fn handle<F>(
        &mut self,
        ctx: &mut SessionContext,
        event: &SessionEvent,
        get_state: F,
    ) -> (K, Vec<Intent>)
    where
        F: Fn(&SessionContext) -> K,
    {
        let state = get_state(ctx);
        match self.handlers.get_mut(&state) {
            Some(handler) => match handler.on_event(ctx, event) {
                TransitionDecision::Stay(intents) => (state, intents),
                TransitionDecision::Transition {
                    to,
                    reason,
                    mut intents,
                } => {
                    intents.insert(
                        0,
                        Intent::LogTransition {
                            from: state.to_string(),
                            to: to.to_string(),
                            triggered_by: Some(event.clone()),
                            reason,
                        },
                    );
                    (to, intents)
                }
            },
            // No handler registered: stay put.
            None => (state, vec![Intent::NoOp]),
        }
    }
}
