mod common;

use common::{ORG, OTHER_ORG, ticket};
use std::time::Duration;
use support_desk::{
    ChangeFeed,
    models::TicketScope,
    realtime::{ChangeEvent, ChangeKind, ChangeTable},
};
use tokio::time::timeout;
use uuid::Uuid;

#[tokio::test]
async fn test_organization_scope_filters_other_tenants() {
    let feed = ChangeFeed::default();
    let mut subscription = feed.subscribe(TicketScope::Organization(ORG));

    let foreign = ticket(OTHER_ORG, Uuid::new_v4(), None);
    let own = ticket(ORG, Uuid::new_v4(), None);
    feed.publish(ChangeEvent::ticket(ChangeKind::Insert, &foreign));
    feed.publish(ChangeEvent::ticket(ChangeKind::Insert, &own));

    let event = subscription.recv().await.expect("event");
    assert_eq!(event.ticket_id, own.id);
    assert_eq!(event.table, ChangeTable::Tickets);
}

#[tokio::test]
async fn test_customer_scope_sees_only_own_tickets() {
    let feed = ChangeFeed::default();
    let customer = Uuid::new_v4();
    let mut subscription = feed.subscribe(TicketScope::Customer(customer));

    let other = ticket(ORG, Uuid::new_v4(), None);
    let own = ticket(ORG, customer, None);
    let message_id = Uuid::new_v4();
    feed.publish(ChangeEvent::message(Uuid::new_v4(), &other));
    feed.publish(ChangeEvent::message(message_id, &own));

    let event = subscription.recv().await.expect("event");
    assert_eq!(event.record_id, message_id);
    assert_eq!(event.table, ChangeTable::TicketMessages);
    assert_eq!(event.kind, ChangeKind::Insert);
}

#[tokio::test]
async fn test_agent_scope_follows_assignment() {
    let feed = ChangeFeed::default();
    let agent = Uuid::new_v4();
    let mut subscription = feed.subscribe(TicketScope::Agent(agent));

    let mut assigned = ticket(ORG, Uuid::new_v4(), None);
    feed.publish(ChangeEvent::ticket(ChangeKind::Insert, &assigned));
    assigned.assigned_agent_id = Some(agent);
    feed.publish(ChangeEvent::ticket(ChangeKind::Update, &assigned));

    let event = subscription.recv().await.expect("event");
    assert_eq!(event.kind, ChangeKind::Update);
    assert_eq!(event.assigned_agent_id, Some(agent));
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let feed = ChangeFeed::default();
    let first = feed.subscribe(TicketScope::Organization(ORG));
    let second = feed.subscribe(TicketScope::Organization(ORG));
    assert_eq!(feed.active_subscriptions(), 2);

    first.unsubscribe();
    assert_eq!(feed.active_subscriptions(), 1);

    drop(second);
    assert_eq!(feed.active_subscriptions(), 0);

    let delivered = feed.publish(ChangeEvent::ticket(
        ChangeKind::Insert,
        &ticket(ORG, Uuid::new_v4(), None),
    ));
    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn test_publish_without_subscribers_is_not_an_error() {
    let feed = ChangeFeed::new(4);

    let delivered = feed.publish(ChangeEvent::ticket(
        ChangeKind::Update,
        &ticket(ORG, Uuid::new_v4(), None),
    ));

    assert_eq!(delivered, 0);
}

#[tokio::test]
async fn test_recv_ends_when_feed_shuts_down() {
    let feed = ChangeFeed::default();
    let mut subscription = feed.subscribe(TicketScope::Organization(ORG));
    drop(feed);

    let next = timeout(Duration::from_secs(1), subscription.recv())
        .await
        .expect("recv should not hang");
    assert_eq!(next, None);
}

#[tokio::test]
async fn test_lagged_subscriber_keeps_receiving() {
    let feed = ChangeFeed::new(2);
    let mut subscription = feed.subscribe(TicketScope::Organization(ORG));

    let tickets: Vec<_> = (0..5).map(|_| ticket(ORG, Uuid::new_v4(), None)).collect();
    for t in &tickets {
        feed.publish(ChangeEvent::ticket(ChangeKind::Insert, t));
    }

    // The oldest events were overwritten; the newest survive.
    let event = subscription.recv().await.expect("event");
    assert_eq!(event.ticket_id, tickets[3].id);
}
