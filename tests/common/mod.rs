// Shared fixtures. Not every test binary uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::{collections::HashMap, sync::Arc, sync::Mutex};
use support_desk::{
    AccessGuard, AppConfig, AppState, ChangeFeed, MockStorageService, RouteGuardPolicy,
    auth::{MockAuthService, SignedInUser, StaticAuthConnector},
    models::{
        Attachment, CreateTicketRequest, DashboardStats, Profile, Ticket, TicketMessage,
        TicketScope, TicketStatus,
    },
    repository::{NewAttachment, ProfileLookupError, Repository},
    storage::StorageState,
};
use uuid::Uuid;

// --- In-memory Repository ---

#[derive(Default)]
pub struct MockRepo {
    pub profiles: Mutex<HashMap<Uuid, Profile>>,
    pub profile_error: Option<ProfileLookupError>,
    pub tickets: Mutex<Vec<Ticket>>,
    pub messages: Mutex<Vec<TicketMessage>>,
    pub attachments: Mutex<Vec<Attachment>>,
    pub stats: DashboardStats,
}

impl MockRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(self, profile: Profile) -> Self {
        self.profiles.lock().unwrap().insert(profile.id, profile);
        self
    }

    pub fn with_ticket(self, ticket: Ticket) -> Self {
        self.tickets.lock().unwrap().push(ticket);
        self
    }

    pub fn failing_profiles(mut self, error: ProfileLookupError) -> Self {
        self.profile_error = Some(error);
        self
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn fetch_profile(&self, id: Uuid) -> Result<Profile, ProfileLookupError> {
        if let Some(error) = &self.profile_error {
            return Err(error.clone());
        }
        self.profiles
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(ProfileLookupError::NotFound(id))
    }

    async fn list_profiles(&self, organization_id: Uuid) -> Vec<Profile> {
        self.profiles
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.organization_id == Some(organization_id))
            .cloned()
            .collect()
    }

    async fn list_tickets(&self, scope: TicketScope) -> Vec<Ticket> {
        self.tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| scope.contains(t))
            .cloned()
            .collect()
    }

    async fn get_ticket(&self, id: Uuid) -> Option<Ticket> {
        self.tickets.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }

    async fn create_ticket(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        req: CreateTicketRequest,
    ) -> Option<Ticket> {
        let ticket = Ticket {
            id: Uuid::new_v4(),
            organization_id,
            customer_id,
            subject: req.subject,
            description: req.description,
            priority: req.priority,
            ..ticket(organization_id, customer_id, None)
        };
        self.tickets.lock().unwrap().push(ticket.clone());
        Some(ticket)
    }

    async fn update_ticket_status(&self, id: Uuid, status: TicketStatus) -> Option<Ticket> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets.iter_mut().find(|t| t.id == id)?;
        ticket.status = status;
        Some(ticket.clone())
    }

    async fn assign_ticket(&self, id: Uuid, agent_id: Uuid) -> Option<Ticket> {
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets.iter_mut().find(|t| t.id == id)?;
        ticket.assigned_agent_id = Some(agent_id);
        Some(ticket.clone())
    }

    async fn list_messages(&self, ticket_id: Uuid) -> Vec<TicketMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.ticket_id == ticket_id)
            .cloned()
            .collect()
    }

    async fn add_message(
        &self,
        ticket_id: Uuid,
        author_id: Uuid,
        body: String,
    ) -> Option<TicketMessage> {
        let author_email = self
            .profiles
            .lock()
            .unwrap()
            .get(&author_id)
            .map(|p| p.email.clone());
        let message = TicketMessage {
            id: Uuid::new_v4(),
            ticket_id,
            author_id,
            body,
            created_at: Utc::now(),
            author_email,
        };
        self.messages.lock().unwrap().push(message.clone());
        Some(message)
    }

    async fn record_attachment(&self, attachment: NewAttachment) -> Option<Attachment> {
        let recorded = Attachment {
            id: Uuid::new_v4(),
            ticket_id: attachment.ticket_id,
            uploaded_by: attachment.uploaded_by,
            object_key: attachment.object_key,
            filename: attachment.filename,
            content_type: attachment.content_type,
            size_bytes: attachment.size_bytes,
            created_at: Utc::now(),
        };
        self.attachments.lock().unwrap().push(recorded.clone());
        Some(recorded)
    }

    async fn get_stats(&self, _organization_id: Uuid) -> DashboardStats {
        self.stats.clone()
    }
}

// --- Fixtures ---

pub const ORG: Uuid = Uuid::from_u128(0x0a);
pub const OTHER_ORG: Uuid = Uuid::from_u128(0x0b);

pub fn profile(id: Uuid, role: &str, organization_id: Option<Uuid>) -> Profile {
    Profile {
        id,
        email: format!("{}@example.com", role),
        role: role.to_string(),
        organization_id,
        full_name: None,
    }
}

pub fn signed_in(id: Uuid) -> SignedInUser {
    SignedInUser {
        id,
        email: Some(format!("user-{}@example.com", id.simple())),
    }
}

pub fn ticket(organization_id: Uuid, customer_id: Uuid, agent: Option<Uuid>) -> Ticket {
    Ticket {
        id: Uuid::new_v4(),
        organization_id,
        customer_id,
        assigned_agent_id: agent,
        subject: "Printer on fire".to_string(),
        description: "It is very much on fire.".to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
        ..Ticket::default()
    }
}

/// AppState wired to mocks; every request shares the one `MockAuthService`.
pub fn app_state(repo: MockRepo, auth: MockAuthService) -> AppState {
    app_state_with_storage(repo, auth, Arc::new(MockStorageService::new()))
}

pub fn app_state_with_storage(
    repo: MockRepo,
    auth: MockAuthService,
    storage: StorageState,
) -> AppState {
    AppState {
        repo: Arc::new(repo),
        storage,
        auth: Arc::new(StaticAuthConnector(Arc::new(auth))),
        guard: AccessGuard::new(RouteGuardPolicy::default()),
        feed: ChangeFeed::default(),
        config: AppConfig::default(),
    }
}
