//! # Subscriptions
//!
//! A subscription pairs a matcher predicate with a subscriber callback
//! and an operation mask. Activating one spawns a dedicated worker
//! thread fed by a channel, so each subscription observes mutations in
//! commit order; distinct subscriptions run independently.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::errors::{Error, Result};
use crate::events::registry::{ChangeEvent, Registry};
use crate::events::{Operation, Ops};
use crate::schema::Record;

/// Storage-free predicate over a serialized record.
pub(crate) type Matcher = Arc<dyn Fn(&Value) -> Result<bool> + Send + Sync>;

/// Type-erased subscriber callback.
pub(crate) type SubscriberFn = Box<dyn Fn(&Value, Operation) -> Result<()> + Send>;

/// Callback invoked with the record, operation and handler elapsed time
/// after every successful delivery.
pub type SubscriptionLogger = Box<dyn Fn(&Value, Operation, Duration) + Send>;

/// Notified when a subscription removes itself.
pub type UnsubscribeListener = Box<dyn Fn(&str, &UnsubscribeReason) + Send>;

/// Why a subscription was removed.
#[derive(Debug)]
pub enum UnsubscribeReason {
    /// The matcher or the subscriber returned an error.
    Error(Error),
    /// The subscriber panicked; the payload rendered as text.
    Panic(String),
}

impl std::fmt::Display for UnsubscribeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnsubscribeReason::Error(err) => write!(f, "{}", err),
            UnsubscribeReason::Panic(msg) => write!(f, "panic: {}", msg),
        }
    }
}

/// Adapt a typed subscriber into the erased form the worker drives.
pub(crate) fn wrap_subscriber<T, F>(subscriber: F) -> SubscriberFn
where
    T: Record,
    F: Fn(T, Operation) -> Result<()> + Send + 'static,
{
    Box::new(move |value, op| {
        let record: T = serde_json::from_value(value.clone())?;
        subscriber(record, op)
    })
}

/// An inactive subscription. Configure it, then call
/// [`Subscription::subscribe`] to start delivery.
pub struct Subscription {
    name: String,
    type_name: &'static str,
    ops: Ops,
    matcher: Matcher,
    subscriber: SubscriberFn,
    logger: Option<SubscriptionLogger>,
    unsubscribe_listener: Option<UnsubscribeListener>,
    registry: Arc<Registry>,
}

impl Subscription {
    pub(crate) fn new(
        registry: Arc<Registry>,
        name: String,
        type_name: &'static str,
        ops: Ops,
        matcher: Matcher,
        subscriber: SubscriberFn,
    ) -> Self {
        Subscription {
            name,
            type_name,
            ops,
            matcher,
            subscriber,
            logger: None,
            unsubscribe_listener: None,
            registry,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a delivery logger.
    pub fn logger(mut self, logger: impl Fn(&Value, Operation, Duration) + Send + 'static) -> Self {
        self.logger = Some(Box::new(logger));
        self
    }

    /// Attach a listener notified when the subscription removes itself.
    pub fn unsubscribe_listener(
        mut self,
        listener: impl Fn(&str, &UnsubscribeReason) + Send + 'static,
    ) -> Self {
        self.unsubscribe_listener = Some(Box::new(listener));
        self
    }

    /// Register the subscription and spawn its delivery worker.
    pub fn subscribe(self) -> Result<()> {
        let (sender, receiver) = mpsc::channel();
        self.registry
            .insert(self.type_name, self.name.clone(), sender);
        let worker = Worker {
            name: self.name,
            ops: self.ops,
            matcher: self.matcher,
            subscriber: self.subscriber,
            logger: self.logger,
            unsubscribe_listener: self.unsubscribe_listener,
            registry: self.registry,
            receiver,
        };
        thread::Builder::new()
            .name(format!("stratadb-sub-{}", worker.name))
            .spawn(move || worker.run())?;
        Ok(())
    }
}

struct Worker {
    name: String,
    ops: Ops,
    matcher: Matcher,
    subscriber: SubscriberFn,
    logger: Option<SubscriptionLogger>,
    unsubscribe_listener: Option<UnsubscribeListener>,
    registry: Arc<Registry>,
    receiver: Receiver<ChangeEvent>,
}

impl Worker {
    /// Drain events until the registry drops this subscription's sender
    /// or a failure unsubscribes it.
    fn run(self) {
        while let Ok(event) = self.receiver.recv() {
            if !self.handle(event) {
                return;
            }
        }
    }

    fn handle(&self, event: ChangeEvent) -> bool {
        let started = Instant::now();
        let old_match = match self.evaluate(event.old.as_ref()) {
            Ok(matched) => matched,
            Err(err) => {
                self.cancel(UnsubscribeReason::Error(err));
                return false;
            }
        };
        let new_match = match self.evaluate(event.new.as_ref()) {
            Ok(matched) => matched,
            Err(err) => {
                self.cancel(UnsubscribeReason::Error(err));
                return false;
            }
        };

        let (payload, op) = if old_match && new_match && self.ops.contains(Operation::Update) {
            (event.new, Operation::Update)
        } else if old_match && self.ops.contains(Operation::Delete) {
            (event.old, Operation::Delete)
        } else if new_match && self.ops.contains(Operation::Create) {
            (event.new, Operation::Create)
        } else {
            return true;
        };
        let payload = match payload {
            Some(payload) => payload,
            None => return true,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.subscriber)(&payload, op)));
        match outcome {
            Err(cause) => {
                self.cancel(UnsubscribeReason::Panic(panic_message(&cause)));
                panic::resume_unwind(cause);
            }
            Ok(Err(err)) => {
                self.cancel(UnsubscribeReason::Error(err));
                false
            }
            Ok(Ok(())) => {
                if let Some(logger) = &self.logger {
                    logger(&payload, op, started.elapsed());
                }
                true
            }
        }
    }

    fn evaluate(&self, value: Option<&Value>) -> Result<bool> {
        match value {
            Some(value) => (self.matcher)(value),
            None => Ok(false),
        }
    }

    fn cancel(&self, reason: UnsubscribeReason) {
        tracing::warn!(subscription = %self.name, reason = %reason, "unsubscribing");
        self.registry.remove(&self.name);
        if let Some(listener) = &self.unsubscribe_listener {
            listener(&self.name, &reason);
        }
    }
}

fn panic_message(cause: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = cause.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = cause.downcast_ref::<String>() {
        msg.clone()
    } else {
        "subscriber panicked".to_string()
    }
}
