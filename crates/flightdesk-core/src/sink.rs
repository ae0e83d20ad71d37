use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ticket::TicketBuyProperty;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketReceipt {
    pub ticket_id: Uuid,
    pub person_name: String,
    pub submitted_at: DateTime<Utc>,
}

/// Destination for confirmed purchases.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn submit(&self, record: &TicketBuyProperty) -> Result<TicketReceipt>;
    async fn find_by_person(&self, person_name: &str) -> Result<Vec<TicketBuyProperty>>;
}

/// Keeps submitted tickets in process memory.
#[derive(Default)]
pub struct InMemoryTicketLedger {
    tickets: RwLock<Vec<TicketBuyProperty>>,
}

impl InMemoryTicketLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tickets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tickets.read().await.is_empty()
    }

    pub async fn all(&self) -> Vec<TicketBuyProperty> {
        self.tickets.read().await.clone()
    }
}

#[async_trait]
impl RecordSink for InMemoryTicketLedger {
    async fn submit(&self, record: &TicketBuyProperty) -> Result<TicketReceipt> {
        let mut tickets = self.tickets.write().await;
        if tickets.iter().any(|t| t.id == record.id) {
            return Err(anyhow!("ticket {} was already submitted", record.id));
        }
        tickets.push(record.clone());

        tracing::info!(ticket_id = %record.id, person = %record.person_name, "ticket submitted");
        Ok(TicketReceipt {
            ticket_id: record.id,
            person_name: record.person_name.clone(),
            submitted_at: Utc::now(),
        })
    }

    async fn find_by_person(&self, person_name: &str) -> Result<Vec<TicketBuyProperty>> {
        let needle = person_name.trim().to_lowercase();
        let tickets = self.tickets.read().await;
        Ok(tickets
            .iter()
            .filter(|t| t.person_name.to_lowercase() == needle)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::TicketClass;

    fn ticket(name: &str) -> TicketBuyProperty {
        TicketBuyProperty {
            person_name: name.into(),
            ticket_class: Some(TicketClass::Second),
            city_from: "Lyon".into(),
            city_to: "Bath".into(),
            confirmed: Some(true),
            ..TicketBuyProperty::default()
        }
    }

    #[tokio::test]
    async fn submit_then_find_is_case_insensitive() {
        let ledger = InMemoryTicketLedger::new();
        let receipt = ledger.submit(&ticket("Alice")).await.unwrap();
        ledger.submit(&ticket("Bob Stone")).await.unwrap();

        assert_eq!(receipt.person_name, "Alice");
        let found = ledger.find_by_person("alice ").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, receipt.ticket_id);
        assert!(ledger.find_by_person("Carol").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_ticket_cannot_be_submitted_twice() {
        let ledger = InMemoryTicketLedger::new();
        let record = ticket("Alice");
        ledger.submit(&record).await.unwrap();

        let err = ledger.submit(&record).await.unwrap_err();
        assert!(err.to_string().contains("already submitted"));
        assert_eq!(ledger.len().await, 1);
    }
}
