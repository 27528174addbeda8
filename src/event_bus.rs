/*
    Copyright © 2024, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Thread that receives published [events](crate::events) and fires the handlers registered for them.

use crate::events::*;
use crate::logging::Logger;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pointer to a handler closure, parametrised by the argument (for our use case, event type).
pub(crate) type HandlerPtr<T> = Box<dyn Fn(&T) + Send>;

// How long the event bus waits for an event before checking for a shutdown signal.
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Stores the handlers for every event type. For each event type, this may include the default
/// logging handler (if logging is enabled) and a user-defined handler (if one was registered).
pub(crate) struct EventHandlers {
    pub(crate) add_candidate_handlers: Vec<HandlerPtr<AddCandidateEvent>>,
    pub(crate) accept_candidate_handlers: Vec<HandlerPtr<AcceptCandidateEvent>>,
    pub(crate) reject_candidate_handlers: Vec<HandlerPtr<RejectCandidateEvent>>,
    pub(crate) record_poll_handlers: Vec<HandlerPtr<RecordPollEvent>>,
    pub(crate) start_poll_handlers: Vec<HandlerPtr<StartPollEvent>>,
    pub(crate) finish_poll_handlers: Vec<HandlerPtr<FinishPollEvent>>,
    pub(crate) halt_handlers: Vec<HandlerPtr<HaltEvent>>,
}

impl EventHandlers {
    /// Collect the user-defined handlers, prepending the default loggers if `log_events` is true.
    pub(crate) fn new(
        log_events: bool,
        add_candidate_handler: Option<HandlerPtr<AddCandidateEvent>>,
        accept_candidate_handler: Option<HandlerPtr<AcceptCandidateEvent>>,
        reject_candidate_handler: Option<HandlerPtr<RejectCandidateEvent>>,
        record_poll_handler: Option<HandlerPtr<RecordPollEvent>>,
        start_poll_handler: Option<HandlerPtr<StartPollEvent>>,
        finish_poll_handler: Option<HandlerPtr<FinishPollEvent>>,
        halt_handler: Option<HandlerPtr<HaltEvent>>,
    ) -> EventHandlers {
        EventHandlers {
            add_candidate_handlers: handlers(log_events, add_candidate_handler),
            accept_candidate_handlers: handlers(log_events, accept_candidate_handler),
            reject_candidate_handlers: handlers(log_events, reject_candidate_handler),
            record_poll_handlers: handlers(log_events, record_poll_handler),
            start_poll_handlers: handlers(log_events, start_poll_handler),
            finish_poll_handlers: handlers(log_events, finish_poll_handler),
            halt_handlers: handlers(log_events, halt_handler),
        }
    }

    /// Whether no handler is registered for any event type, in which case there is no need to
    /// publish events at all.
    pub(crate) fn is_empty(&self) -> bool {
        self.add_candidate_handlers.is_empty()
            && self.accept_candidate_handlers.is_empty()
            && self.reject_candidate_handlers.is_empty()
            && self.record_poll_handlers.is_empty()
            && self.start_poll_handlers.is_empty()
            && self.finish_poll_handlers.is_empty()
            && self.halt_handlers.is_empty()
    }

    /// Fire every handler registered for the type of `event`, in registration order.
    pub(crate) fn fire_handlers(&self, event: Event) {
        match event {
            Event::AddCandidate(add_candidate_event) => self
                .add_candidate_handlers
                .iter()
                .for_each(|handler| handler(&add_candidate_event)),

            Event::AcceptCandidate(accept_candidate_event) => self
                .accept_candidate_handlers
                .iter()
                .for_each(|handler| handler(&accept_candidate_event)),

            Event::RejectCandidate(reject_candidate_event) => self
                .reject_candidate_handlers
                .iter()
                .for_each(|handler| handler(&reject_candidate_event)),

            Event::RecordPoll(record_poll_event) => self
                .record_poll_handlers
                .iter()
                .for_each(|handler| handler(&record_poll_event)),

            Event::StartPoll(start_poll_event) => self
                .start_poll_handlers
                .iter()
                .for_each(|handler| handler(&start_poll_event)),

            Event::FinishPoll(finish_poll_event) => self
                .finish_poll_handlers
                .iter()
                .for_each(|handler| handler(&finish_poll_event)),

            Event::Halt(halt_event) => self
                .halt_handlers
                .iter()
                .for_each(|handler| handler(&halt_event)),
        }
    }
}

fn handlers<T: Logger>(log_events: bool, user_handler: Option<HandlerPtr<T>>) -> Vec<HandlerPtr<T>> {
    let mut handlers = Vec::new();
    if log_events {
        handlers.push(T::get_logger());
    }
    if let Some(handler) = user_handler {
        handlers.push(handler);
    }
    handlers
}

/// Start the event bus thread, which fires the handlers in `event_handlers` for every event received on
/// `event_subscriber`.
///
/// The thread exits when it receives a shutdown signal, after draining every event that was already
/// published, or when every publisher has been dropped.
pub(crate) fn start_event_bus(
    event_handlers: EventHandlers,
    event_subscriber: Receiver<Event>,
    shutdown_signal: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || loop {
        match shutdown_signal.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => {
                while let Ok(event) = event_subscriber.try_recv() {
                    event_handlers.fire_handlers(event)
                }
                return;
            }
            Err(TryRecvError::Empty) => (),
        }

        match event_subscriber.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(event) => event_handlers.fire_handlers(event),
            Err(RecvTimeoutError::Timeout) => (),
            Err(RecvTimeoutError::Disconnected) => return,
        }
    })
}
