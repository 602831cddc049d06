use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::broadcast::{self, error::RecvError};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Ticket, TicketScope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ChangeKind {
    Insert,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ChangeTable {
    Tickets,
    TicketMessages,
}

/// ChangeEvent
///
/// One row change, carrying enough of the parent ticket to decide who may see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    pub record_id: Uuid,
    pub ticket_id: Uuid,
    pub organization_id: Uuid,
    pub customer_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
}

impl ChangeEvent {
    pub fn ticket(kind: ChangeKind, ticket: &Ticket) -> Self {
        Self::for_record(ChangeTable::Tickets, kind, ticket.id, ticket)
    }

    pub fn message(message_id: Uuid, ticket: &Ticket) -> Self {
        Self::for_record(ChangeTable::TicketMessages, ChangeKind::Insert, message_id, ticket)
    }

    fn for_record(table: ChangeTable, kind: ChangeKind, record_id: Uuid, ticket: &Ticket) -> Self {
        Self {
            table,
            kind,
            record_id,
            ticket_id: ticket.id,
            organization_id: ticket.organization_id,
            customer_id: ticket.customer_id,
            assigned_agent_id: ticket.assigned_agent_id,
        }
    }

    pub fn visible_to(&self, scope: &TicketScope) -> bool {
        match *scope {
            TicketScope::Organization(org) => self.organization_id == org,
            TicketScope::Agent(agent) => self.assigned_agent_id == Some(agent),
            TicketScope::Customer(customer) => self.customer_id == customer,
        }
    }
}

/// ChangeFeed
///
/// In-process fan-out of ticket changes. Subscribers get a [`Subscription`] handle and stop
/// receiving when they call [`Subscription::unsubscribe`] or drop it.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
    active: Arc<AtomicUsize>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ChangeFeed {
    /// `capacity` bounds how far a slow subscriber may lag before it starts skipping events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the number of subscriptions the event was handed to (before scope filtering).
    pub fn publish(&self, event: ChangeEvent) -> usize {
        // No subscribers is not an error.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self, scope: TicketScope) -> Subscription {
        self.active.fetch_add(1, Ordering::SeqCst);
        Subscription {
            receiver: self.sender.subscribe(),
            scope,
            active: Some(self.active.clone()),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// Subscription
///
/// Handle for one scoped listener on the [`ChangeFeed`].
pub struct Subscription {
    receiver: broadcast::Receiver<ChangeEvent>,
    scope: TicketScope,
    active: Option<Arc<AtomicUsize>>,
}

impl Subscription {
    pub fn scope(&self) -> &TicketScope {
        &self.scope
    }

    /// Next event within the scope. `None` once the feed has shut down.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.visible_to(&self.scope) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change feed subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
