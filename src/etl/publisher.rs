//! Progress publishing.
//!
//! Subscribers register interest in named events and receive them over a
//! bounded channel. Publishing never blocks: an event for a subscriber whose
//! channel is full is dropped, and closed subscribers are pruned.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::etl::model::{Application, Category, Contract, ContractType, ScanProgress};

/// Default per-subscriber buffer.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    Progress,
    ApplicationDiscovered,
    Completed,
    Stopped,
    Error,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        Self::Progress,
        Self::ApplicationDiscovered,
        Self::Completed,
        Self::Stopped,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::ApplicationDiscovered => "application-discovered",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

/// Contracts listed in a discovery announcement.
const ANNOUNCED_CONTRACTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSummary {
    pub address: String,
    pub contract_type: ContractType,
    pub deployment_block: u64,
}

/// Payload announcing an application found during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredApplication {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub contract_count: usize,
    /// Most recently deployed contracts first.
    pub contracts: Vec<ContractSummary>,
    pub discovered_at: i64,
}

impl DiscoveredApplication {
    pub fn new(application: &Application, contracts: &[Contract]) -> Self {
        let mut recent: Vec<&Contract> = contracts.iter().collect();
        recent.sort_by(|a, b| b.deployment_block.cmp(&a.deployment_block));

        Self {
            id: application.id.clone(),
            name: application.name.clone(),
            category: application.category,
            contract_count: contracts.len(),
            contracts: recent
                .into_iter()
                .take(ANNOUNCED_CONTRACTS)
                .map(|c| ContractSummary {
                    address: c.address.clone(),
                    contract_type: c.contract_type,
                    deployment_block: c.deployment_block,
                })
                .collect(),
            discovered_at: application.created_at,
        }
    }
}

/// An event published during a scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Progress(ScanProgress),
    ApplicationDiscovered(DiscoveredApplication),
    Completed(ScanProgress),
    Stopped(ScanProgress),
    Error(ScanProgress),
}

impl ScanEvent {
    pub fn name(&self) -> EventName {
        match self {
            Self::Progress(_) => EventName::Progress,
            Self::ApplicationDiscovered(_) => EventName::ApplicationDiscovered,
            Self::Completed(_) => EventName::Completed,
            Self::Stopped(_) => EventName::Stopped,
            Self::Error(_) => EventName::Error,
        }
    }

    /// JSON payload, without the event name.
    pub fn payload(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Self::ApplicationDiscovered(app) => serde_json::to_value(app),
            Self::Progress(p) | Self::Completed(p) | Self::Stopped(p) | Self::Error(p) => {
                serde_json::to_value(p)
            }
        }
    }
}

struct Subscriber {
    events: HashSet<EventName>,
    tx: mpsc::Sender<ScanEvent>,
}

/// Receiving end of a subscription.
pub struct Subscription {
    pub id: String,
    pub events: mpsc::Receiver<ScanEvent>,
}

/// Named-event fan-out to subscribers.
pub struct ProgressPublisher {
    subscribers: RwLock<HashMap<String, Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl ProgressPublisher {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    /// Registers a subscriber for `events`.
    pub fn subscribe(&self, events: &[EventName]) -> Subscription {
        let id = format!("sub-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.capacity);

        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                Subscriber {
                    events: events.iter().copied().collect(),
                    tx,
                },
            );
        tracing::debug!(target: "scout::etl::publisher", "Subscriber {} registered", id);

        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&self, id: &str) {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            tracing::debug!(target: "scout::etl::publisher", "Subscriber {} unregistered", id);
        }
    }

    /// Unsubscribes `id` when the returned guard is dropped.
    pub fn guard(self: &Arc<Self>, id: impl Into<String>) -> SubscriptionGuard {
        SubscriptionGuard {
            publisher: Arc::clone(self),
            id: id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every interested subscriber; returns how many got it.
    pub fn publish(&self, event: ScanEvent) -> usize {
        let name = event.name();
        let mut sent_count = 0;
        let mut closed = Vec::new();

        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);

            for (id, subscriber) in subscribers.iter() {
                if !subscriber.events.contains(&name) {
                    continue;
                }
                match subscriber.tx.try_send(event.clone()) {
                    Ok(()) => sent_count += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(
                            target: "scout::etl::publisher",
                            "Subscriber {} is lagging, dropped '{}'",
                            id,
                            name.as_str()
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => closed.push(id.clone()),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self
                .subscribers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            for id in &closed {
                subscribers.remove(id);
            }
        }

        tracing::trace!(
            target: "scout::etl::publisher",
            "Published '{}' to {} subscribers",
            name.as_str(),
            sent_count
        );

        sent_count
    }
}

/// Removes its subscription from the publisher on drop.
pub struct SubscriptionGuard {
    publisher: Arc<ProgressPublisher>,
    id: String,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.publisher.unsubscribe(&self.id);
    }
}
