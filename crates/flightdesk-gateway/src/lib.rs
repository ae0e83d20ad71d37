use std::collections::HashMap as StdHashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flightdesk_bus::BusPublisher;
use flightdesk_core::{FlightBot, RateLimitSettings, Transport, TurnReport};
use flightdesk_schema::*;
use tokio::sync::Mutex as TokioMutex;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 30,
            burst: 10,
        }
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            requests_per_minute: settings.requests_per_minute,
            burst: settings.burst,
        }
    }
}

/// Fully refilled buckets are dropped at most this often.
const SWEEP_INTERVAL_SECS: i64 = 60;

struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_per_sec: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    fn new(config: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self {
            tokens: config.burst as f64,
            max_tokens: config.burst as f64,
            refill_per_sec: config.requests_per_minute as f64 / 60.0,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.max_tokens);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: DateTime<Utc>) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Full buckets are indistinguishable from fresh ones.
    fn is_full(&self) -> bool {
        self.tokens >= self.max_tokens
    }
}

struct Buckets {
    by_conversation: StdHashMap<ConversationKey, TokenBucket>,
    last_sweep: DateTime<Utc>,
}

/// Token buckets keyed by conversation.
pub struct RateLimiter {
    buckets: TokioMutex<Buckets>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: TokioMutex::new(Buckets {
                by_conversation: StdHashMap::new(),
                last_sweep: Utc::now(),
            }),
            config,
        }
    }

    /// Takes one turn from the conversation's budget; `false` when exhausted.
    pub async fn check(&self, conversation: &ConversationKey) -> bool {
        let now = Utc::now();
        let mut buckets = self.buckets.lock().await;
        if (now - buckets.last_sweep).num_seconds() >= SWEEP_INTERVAL_SECS {
            let evicted = sweep(&mut buckets, now);
            if evicted > 0 {
                tracing::debug!(evicted, "dropped idle rate-limit buckets");
            }
        }
        let config = &self.config;
        buckets
            .by_conversation
            .entry(conversation.clone())
            .or_insert_with(|| TokenBucket::new(config, now))
            .try_take(now)
    }

    /// Drops buckets that have refilled completely. Returns how many went.
    pub async fn sweep(&self) -> usize {
        let mut buckets = self.buckets.lock().await;
        sweep(&mut buckets, Utc::now())
    }

    pub async fn tracked(&self) -> usize {
        self.buckets.lock().await.by_conversation.len()
    }
}

fn sweep(buckets: &mut Buckets, now: DateTime<Utc>) -> usize {
    let before = buckets.by_conversation.len();
    buckets.by_conversation.retain(|_, bucket| {
        bucket.refill(now);
        !bucket.is_full()
    });
    buckets.last_sweep = now;
    before - buckets.by_conversation.len()
}

/// Publishes every bot reply as `ReplyReady` instead of delivering it directly.
pub struct BusTransport {
    bus: BusPublisher,
}

impl BusTransport {
    pub fn new(bus: BusPublisher) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl Transport for BusTransport {
    async fn send_activity(
        &self,
        conversation: &ConversationKey,
        message: OutboundMessage,
    ) -> Result<()> {
        tracing::debug!(
            conversation = %conversation,
            trace_id = %message.trace_id,
            "reply ready"
        );
        self.bus
            .publish(BusMessage::ReplyReady { outbound: message })
            .await
    }
}

pub struct Gateway {
    bot: Arc<FlightBot>,
    bus: BusPublisher,
    rate_limiter: RateLimiter,
}

impl Gateway {
    pub fn new(bot: Arc<FlightBot>, bus: BusPublisher, rate_limiter: RateLimiter) -> Self {
        Self {
            bot,
            bus,
            rate_limiter,
        }
    }

    pub fn bot(&self) -> &Arc<FlightBot> {
        &self.bot
    }

    pub async fn handle_inbound(&self, inbound: InboundMessage) -> Result<TurnReport> {
        let trace_id = inbound.trace_id;
        let conversation_key = ConversationKey::from_inbound(&inbound);

        if !self.rate_limiter.check(&conversation_key).await {
            tracing::warn!(conversation = %conversation_key, "rate limited inbound message");
            return Err(anyhow::anyhow!("rate limited: too many requests"));
        }

        let _ = self
            .bus
            .publish(BusMessage::TurnAccepted {
                trace_id,
                conversation_key: conversation_key.0.clone(),
            })
            .await;

        match self.bot.on_turn(inbound).await {
            Ok(report) => {
                for receipt in &report.submitted {
                    let _ = self
                        .bus
                        .publish(BusMessage::TicketSubmitted {
                            ticket_id: receipt.ticket_id,
                            conversation_key: conversation_key.0.clone(),
                            person_name: receipt.person_name.clone(),
                        })
                        .await;
                }
                if let Some(error) = &report.recovered_error {
                    let _ = self
                        .bus
                        .publish(BusMessage::TurnFailed {
                            trace_id,
                            error: error.clone(),
                        })
                        .await;
                }
                Ok(report)
            }
            Err(err) => {
                let _ = self
                    .bus
                    .publish(BusMessage::TurnFailed {
                        trace_id,
                        error: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use flightdesk_bus::{EventBus, Topic};
    use flightdesk_core::{
        InMemoryTicketLedger, IntentRule, KeywordRecognizer, RecognizerConfig,
    };
    use flightdesk_memory::{InMemoryStateStore, StateScope, StateStore};
    use serde_json::json;
    use tokio::sync::mpsc::Receiver;

    use super::*;

    fn recognizer_config() -> RecognizerConfig {
        RecognizerConfig {
            intents: vec![
                IntentRule {
                    intent: "Help".into(),
                    phrases: vec!["help".into()],
                },
                IntentRule {
                    intent: "TicketBuy".into(),
                    phrases: vec!["buy".into()],
                },
            ],
            yes_words: vec!["yes".into()],
            no_words: vec!["no".into(), "edit".into()],
        }
    }

    fn make_gateway(bus: &EventBus, store: Arc<InMemoryStateStore>, limit: RateLimitConfig) -> Gateway {
        let publisher = bus.publisher();
        let bot = FlightBot::builder()
            .recognizer(Arc::new(KeywordRecognizer::new(recognizer_config())))
            .state_store(store)
            .transport(Arc::new(BusTransport::new(publisher.clone())))
            .record_sink(Arc::new(InMemoryTicketLedger::new()))
            .build()
            .unwrap();
        Gateway::new(Arc::new(bot), publisher, RateLimiter::new(limit))
    }

    fn inbound(text: &str) -> InboundMessage {
        InboundMessage::text("telegram", "chat:100", "user:200", text)
    }

    async fn next(rx: &mut Receiver<BusMessage>) -> BusMessage {
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    fn reply_text(msg: BusMessage) -> String {
        match msg {
            BusMessage::ReplyReady { outbound } => outbound.activity.render(),
            other => panic!("expected ReplyReady, got {other:?}"),
        }
    }

    fn key(scope: &str) -> ConversationKey {
        ConversationKey(format!("telegram:telegram:{scope}"))
    }

    #[tokio::test]
    async fn rate_limiter_allows_within_limit() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst: 5,
        });
        for _ in 0..5 {
            assert!(limiter.check(&key("chat:1")).await);
        }
    }

    #[tokio::test]
    async fn rate_limiter_blocks_after_burst() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst: 2,
        });
        assert!(limiter.check(&key("chat:1")).await);
        assert!(limiter.check(&key("chat:1")).await);
        assert!(!limiter.check(&key("chat:1")).await);
    }

    #[tokio::test]
    async fn rate_limiter_conversations_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst: 1,
        });
        assert!(limiter.check(&key("chat:1")).await);
        assert!(limiter.check(&key("chat:2")).await);
        assert!(!limiter.check(&key("chat:1")).await);
    }

    #[tokio::test]
    async fn refilled_buckets_are_evicted() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60_000,
            burst: 2,
        });
        for i in 0..100 {
            assert!(limiter.check(&key(&format!("chat:{i}"))).await);
        }
        assert_eq!(limiter.tracked().await, 100);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limiter.sweep().await, 100);
        assert_eq!(limiter.tracked().await, 0);
    }

    #[tokio::test]
    async fn drained_bucket_survives_sweep() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_minute: 1,
            burst: 1,
        });
        assert!(limiter.check(&key("busy")).await);
        assert_eq!(limiter.sweep().await, 0);
        assert!(!limiter.check(&key("busy")).await);
        assert_eq!(limiter.tracked().await, 1);
    }

    #[test]
    fn rate_limit_config_follows_settings() {
        let config = RateLimitConfig::from(&RateLimitSettings {
            requests_per_minute: 12,
            burst: 3,
        });
        assert_eq!(config.requests_per_minute, 12);
        assert_eq!(config.burst, 3);

        let config = RateLimitConfig::default();
        assert_eq!(config.requests_per_minute, 30);
        assert_eq!(config.burst, 10);
    }

    #[tokio::test]
    async fn handle_inbound_publishes_accept_then_replies() {
        let bus = EventBus::new(16);
        let mut accepted_rx = bus.subscribe(Topic::TurnAccepted).await;
        let mut reply_rx = bus.subscribe(Topic::ReplyReady).await;
        let gw = make_gateway(&bus, Arc::new(InMemoryStateStore::new()), RateLimitConfig::default());

        let msg = inbound("help");
        let expected_trace = msg.trace_id;
        let report = gw.handle_inbound(msg).await.unwrap();
        assert_eq!(report.activities_sent, 2);
        assert!(report.recovered_error.is_none());

        assert!(matches!(
            next(&mut accepted_rx).await,
            BusMessage::TurnAccepted { trace_id, conversation_key }
                if trace_id == expected_trace && conversation_key == "telegram:telegram:chat:100"
        ));
        assert_eq!(
            reply_text(next(&mut reply_rx).await),
            "Let me try to provide some help."
        );
        assert!(reply_text(next(&mut reply_rx).await).starts_with("Help - show this info block."));
    }

    #[tokio::test]
    async fn handle_inbound_rejects_when_rate_limited() {
        let bus = EventBus::new(16);
        let gw = make_gateway(
            &bus,
            Arc::new(InMemoryStateStore::new()),
            RateLimitConfig {
                requests_per_minute: 1,
                burst: 1,
            },
        );

        assert!(gw.handle_inbound(inbound("help")).await.is_ok());
        let second = gw.handle_inbound(inbound("help")).await;
        assert!(second.unwrap_err().to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn submitted_ticket_is_announced() {
        let bus = EventBus::new(32);
        let mut submitted_rx = bus.subscribe(Topic::TicketSubmitted).await;
        let gw = make_gateway(&bus, Arc::new(InMemoryStateStore::new()), RateLimitConfig::default());

        let card = inbound("").with_value(json!({
            "intent": "TicketBuy",
            "personName": "Alice",
            "ticket_class": "First",
            "cityFrom": "Lyon",
            "cityTo": "Bath"
        }));
        let report = gw.handle_inbound(card).await.unwrap();
        assert!(report.submitted.is_empty());

        let report = gw.handle_inbound(inbound("yes")).await.unwrap();
        assert_eq!(report.submitted.len(), 1);

        match next(&mut submitted_rx).await {
            BusMessage::TicketSubmitted {
                ticket_id,
                conversation_key,
                person_name,
            } => {
                assert_eq!(ticket_id, report.submitted[0].ticket_id);
                assert_eq!(conversation_key, "telegram:telegram:chat:100");
                assert_eq!(person_name, "Alice");
            }
            other => panic!("expected TicketSubmitted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovered_turn_publishes_failure() {
        let bus = EventBus::new(16);
        let mut failed_rx = bus.subscribe(Topic::TurnFailed).await;
        let store = Arc::new(InMemoryStateStore::new());
        let gw = make_gateway(&bus, store.clone(), RateLimitConfig::default());

        let msg = inbound("help");
        let key = ConversationKey::from_inbound(&msg);
        store
            .set(key.as_str(), StateScope::DialogStack, json!("not a stack"))
            .await
            .unwrap();

        let expected_trace = msg.trace_id;
        let report = gw.handle_inbound(msg).await.unwrap();
        assert!(report.recovered_error.is_some());
        assert!(matches!(
            next(&mut failed_rx).await,
            BusMessage::TurnFailed { trace_id, .. } if trace_id == expected_trace
        ));
    }
}
