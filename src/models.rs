use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{guard::GuardState, policy::RouteGuardPolicy, session::LoadingState};

/// ParseEnumError
///
/// Raised when a text column or payload carries a value outside one of the closed enums below.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind}: {value:?}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

// --- Identity & Roles ---

/// Role
///
/// The closed set of roles a profile can hold. Assigned once when the profile row is created
/// (outside this service) and treated as immutable for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum Role {
    HeadAdmin,
    Admin,
    Agent,
    Customer,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::HeadAdmin, Role::Admin, Role::Agent, Role::Customer];

    /// Wire name, as stored in `public.profiles.role`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::HeadAdmin => "head-admin",
            Role::Admin => "admin",
            Role::Agent => "agent",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Older profile rows were written with an underscore.
        match s.trim().to_ascii_lowercase().as_str() {
            "head-admin" | "head_admin" => Ok(Role::HeadAdmin),
            "admin" => Ok(Role::Admin),
            "agent" => Ok(Role::Agent),
            "customer" => Ok(Role::Customer),
            _ => Err(ParseEnumError::new("role", s)),
        }
    }
}

/// Identity
///
/// The resolved, authenticated user as seen by the rest of the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    /// Tenant the profile belongs to. Absent for profiles not yet attached to an organization.
    pub organization_id: Option<Uuid>,
}

/// Profile
///
/// Raw row from `public.profiles`. The role stays a string here; it is only narrowed into
/// [`Role`] when an [`Identity`] is built, so an unexpected value never fails the row decode.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub organization_id: Option<Uuid>,
    pub full_name: Option<String>,
}

// --- Tickets ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum TicketStatus {
    #[default]
    Open,
    Pending,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Pending => "pending",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TicketStatus::Open),
            "pending" => Ok(TicketStatus::Pending),
            "resolved" => Ok(TicketStatus::Resolved),
            "closed" => Ok(TicketStatus::Closed),
            _ => Err(ParseEnumError::new("ticket status", s)),
        }
    }
}

impl TryFrom<String> for TicketStatus {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum TicketPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Normal => "normal",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }
}

impl FromStr for TicketPriority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(TicketPriority::Low),
            "normal" => Ok(TicketPriority::Normal),
            "high" => Ok(TicketPriority::High),
            "urgent" => Ok(TicketPriority::Urgent),
            _ => Err(ParseEnumError::new("ticket priority", s)),
        }
    }
}

impl TryFrom<String> for TicketPriority {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Ticket
///
/// A support ticket from `public.tickets`, scoped to one organization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Ticket {
    pub id: Uuid,
    pub organization_id: Uuid,
    // The customer who opened the ticket.
    pub customer_id: Uuid,
    pub assigned_agent_id: Option<Uuid>,
    pub subject: String,
    pub description: String,
    #[sqlx(try_from = "String")]
    pub status: TicketStatus,
    #[sqlx(try_from = "String")]
    pub priority: TicketPriority,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// TicketMessage
///
/// One entry in a ticket's conversation thread, joined with the author's email.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[sqlx(default)]
    pub author_email: Option<String>,
}

/// Attachment
///
/// Metadata for a file uploaded against a ticket. The bytes live in object storage under `object_key`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Attachment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub uploaded_by: Uuid,
    pub object_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// TicketScope
///
/// Which slice of the ticket table an identity may read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketScope {
    /// Every ticket of one organization (admins).
    Organization(Uuid),
    /// Tickets assigned to one agent.
    Agent(Uuid),
    /// Tickets opened by one customer.
    Customer(Uuid),
}

impl TicketScope {
    /// Picks the scope through the policy's role-satisfaction table, so ticket visibility
    /// agrees with the admin routes. Returns `None` when an admin has no organization, or
    /// when the role satisfies none of admin, agent or customer.
    pub fn for_identity(identity: &Identity, policy: &RouteGuardPolicy) -> Option<Self> {
        if policy.satisfies(Role::Admin, identity.role) {
            identity.organization_id.map(TicketScope::Organization)
        } else if policy.satisfies(Role::Agent, identity.role) {
            Some(TicketScope::Agent(identity.id))
        } else if policy.satisfies(Role::Customer, identity.role) {
            Some(TicketScope::Customer(identity.id))
        } else {
            None
        }
    }

    pub fn contains(&self, ticket: &Ticket) -> bool {
        match *self {
            TicketScope::Organization(org) => ticket.organization_id == org,
            TicketScope::Agent(agent) => ticket.assigned_agent_id == Some(agent),
            TicketScope::Customer(customer) => ticket.customer_id == customer,
        }
    }
}

// --- Request Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: String,
    #[serde(default)]
    pub priority: TicketPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateMessageRequest {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateStatusRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AssignTicketRequest {
    pub agent_id: Uuid,
}

/// AttachmentUploadRequest
///
/// Asks for a presigned upload slot. Size and MIME type are checked before any URL is signed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AttachmentUploadRequest {
    #[schema(example = "screenshot.png")]
    pub filename: String,
    #[schema(example = "image/png")]
    pub file_type: String,
    pub size_bytes: i64,
}

// --- Responses ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub identity: Identity,
    /// Bearer token the SPA sends back on later requests.
    pub access_token: Option<String>,
    /// Where the SPA should navigate after a login without a redirect target.
    pub landing: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionView {
    pub status: LoadingState,
    pub identity: Option<Identity>,
}

/// NavigationResponse
///
/// Guard decision for a single route, in the shape the SPA router consumes.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NavigationResponse {
    pub state: GuardState,
    pub redirect_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AttachmentUploadResponse {
    pub upload_url: String,
    pub resource_key: String,
    pub attachment: Attachment,
}

/// DashboardStats
///
/// Per-organization counters for the admin dashboard (GET /admin/stats).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct DashboardStats {
    pub open_tickets: i64,
    pub pending_tickets: i64,
    pub resolved_tickets: i64,
    pub agents: i64,
}
