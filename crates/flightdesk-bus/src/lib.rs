use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use flightdesk_schema::BusMessage;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Topic {
    TurnAccepted,
    ReplyReady,
    TurnFailed,
    TicketSubmitted,
}

impl Topic {
    pub fn from_message(msg: &BusMessage) -> Self {
        match msg {
            BusMessage::TurnAccepted { .. } => Topic::TurnAccepted,
            BusMessage::ReplyReady { .. } => Topic::ReplyReady,
            BusMessage::TurnFailed { .. } => Topic::TurnFailed,
            BusMessage::TicketSubmitted { .. } => Topic::TicketSubmitted,
        }
    }
}

type Subscriber = mpsc::Sender<BusMessage>;
type SubscriberMap = Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>;

pub struct EventBus {
    subscribers: SubscriberMap,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub async fn subscribe(&self, topic: Topic) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.write().await;
        subs.entry(topic).or_default().push(tx);
        rx
    }

    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        deliver(&self.subscribers, msg).await
    }

    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            subscribers: self.subscribers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BusPublisher {
    subscribers: SubscriberMap,
}

impl BusPublisher {
    pub async fn publish(&self, msg: BusMessage) -> Result<()> {
        deliver(&self.subscribers, msg).await
    }
}

async fn deliver(subscribers: &SubscriberMap, msg: BusMessage) -> Result<()> {
    let topic = Topic::from_message(&msg);
    let subs = subscribers.read().await;
    if let Some(subscribers) = subs.get(&topic) {
        for tx in subscribers {
            if tx.try_send(msg.clone()).is_err() {
                tracing::debug!(?topic, "bus subscriber full or closed, dropping message");
            }
        }
    }
    Ok(())
}
