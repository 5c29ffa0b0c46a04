//! Event subscriptions and fan-out.

use crate::messages::{ProtocolEvent, Subscribe, Unsubscribe};
use actix::prelude::*;
use log::{debug, info, trace};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

type SubscriptionKey = (String, Option<String>);

#[derive(Default)]
pub struct EventActor {
    subscriptions: HashMap<SubscriptionKey, HashSet<Recipient<ProtocolEvent>>>,
}

impl Actor for EventActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Context<Self>) {
        info!("EventActor started");
    }
}

impl Handler<Subscribe> for EventActor {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _ctx: &mut Context<Self>) {
        debug!("Subscribe {} (session {:?})", msg.event_name, msg.session_id);
        self.subscriptions
            .entry((msg.event_name, msg.session_id))
            .or_default()
            .insert(msg.subscriber);
    }
}

impl Handler<Unsubscribe> for EventActor {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _ctx: &mut Context<Self>) {
        let key = (msg.event_name, msg.session_id);
        if let Some(subscribers) = self.subscriptions.get_mut(&key) {
            subscribers.remove(&msg.subscriber);
            if subscribers.is_empty() {
                self.subscriptions.remove(&key);
            }
        }
    }
}

impl Handler<ProtocolEvent> for EventActor {
    type Result = ();

    fn handle(&mut self, event: ProtocolEvent, _ctx: &mut Context<Self>) {
        let exact = (event.method.clone(), event.session_id.clone());
        let any_session = (event.method.clone(), None);

        let mut targets: Vec<Recipient<ProtocolEvent>> = Vec::new();
        for key in [&exact, &any_session] {
            if let Some(set) = self.subscriptions.get_mut(key) {
                set.retain(|r| r.connected());
                targets.extend(set.iter().cloned());
            }
            if exact == any_session {
                break;
            }
        }
        self.subscriptions.retain(|_, set| !set.is_empty());

        if targets.is_empty() {
            trace!("No subscribers for {}", event.method);
            return;
        }
        for recipient in targets {
            recipient.do_send(event.clone());
        }
    }
}

/// Bridges actor-delivered events into a channel so plain async code can
/// await them.
pub struct EventForwarder {
    tx: mpsc::UnboundedSender<ProtocolEvent>,
}

impl Actor for EventForwarder {
    type Context = Context<Self>;
}

impl Handler<ProtocolEvent> for EventForwarder {
    type Result = ();

    fn handle(&mut self, msg: ProtocolEvent, ctx: &mut Context<Self>) {
        if self.tx.send(msg).is_err() {
            ctx.stop();
        }
    }
}

/// A live subscription to a set of events. Unsubscribes when dropped.
pub struct EventSubscription {
    events: Recipient<Subscribe>,
    unsubscribe: Recipient<Unsubscribe>,
    forwarder: Addr<EventForwarder>,
    keys: Vec<SubscriptionKey>,
    rx: mpsc::UnboundedReceiver<ProtocolEvent>,
}

impl EventSubscription {
    pub fn open(
        dispatcher: &Addr<EventActor>,
        event_names: &[&str],
        session_id: Option<String>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let forwarder = EventForwarder { tx }.start();
        let keys: Vec<SubscriptionKey> = event_names
            .iter()
            .map(|name| (name.to_string(), session_id.clone()))
            .collect();
        let subscription = Self {
            events: dispatcher.clone().recipient(),
            unsubscribe: dispatcher.clone().recipient(),
            forwarder,
            keys,
            rx,
        };
        for (name, session) in &subscription.keys {
            subscription.events.do_send(Subscribe {
                event_name: name.clone(),
                session_id: session.clone(),
                subscriber: subscription.forwarder.clone().recipient(),
            });
        }
        subscription
    }

    /// Next matching event, or `None` once the dispatcher went away.
    pub async fn next(&mut self) -> Option<ProtocolEvent> {
        self.rx.recv().await
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        for (name, session) in self.keys.drain(..) {
            self.unsubscribe.do_send(Unsubscribe {
                event_name: name,
                session_id: session,
                subscriber: self.forwarder.clone().recipient(),
            });
        }
    }
}
