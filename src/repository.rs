use crate::models::{
    Attachment, CreateTicketRequest, DashboardStats, Profile, Ticket, TicketMessage, TicketScope,
    TicketStatus,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// ProfileLookupError
///
/// Why a profile row could not be produced for an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileLookupError {
    #[error("no profile row for user {0}")]
    NotFound(Uuid),
    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// NewAttachment
///
/// Metadata recorded once a presigned upload slot has been issued.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub ticket_id: Uuid,
    pub uploaded_by: Uuid,
    pub object_key: String,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
}

/// Repository Trait
///
/// Persistence contract for profiles and the ticket domain. Handlers and the session store
/// only see this trait, so tests can swap in an in-memory mock.
///
/// Apart from `fetch_profile`, read failures are logged and surface as empty results or
/// `None`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn fetch_profile(&self, id: Uuid) -> Result<Profile, ProfileLookupError>;
    async fn list_profiles(&self, organization_id: Uuid) -> Vec<Profile>;

    // --- Tickets ---
    async fn list_tickets(&self, scope: TicketScope) -> Vec<Ticket>;
    async fn get_ticket(&self, id: Uuid) -> Option<Ticket>;
    async fn create_ticket(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        req: CreateTicketRequest,
    ) -> Option<Ticket>;
    async fn update_ticket_status(&self, id: Uuid, status: TicketStatus) -> Option<Ticket>;
    async fn assign_ticket(&self, id: Uuid, agent_id: Uuid) -> Option<Ticket>;

    // --- Conversation ---
    async fn list_messages(&self, ticket_id: Uuid) -> Vec<TicketMessage>;
    async fn add_message(&self, ticket_id: Uuid, author_id: Uuid, body: String)
    -> Option<TicketMessage>;
    async fn record_attachment(&self, attachment: NewAttachment) -> Option<Attachment>;

    // --- Admin ---
    async fn get_stats(&self, organization_id: Uuid) -> DashboardStats;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const TICKET_COLUMNS: &str = "id, organization_id, customer_id, assigned_agent_id, subject, \
     description, status, priority, created_at, updated_at";

/// PostgresRepository
///
/// `Repository` backed by the Supabase Postgres database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// fetch_profile
    ///
    /// Reads the role and tenant for an authenticated user from `public.profiles`.
    async fn fetch_profile(&self, id: Uuid) -> Result<Profile, ProfileLookupError> {
        sqlx::query_as::<_, Profile>(
            "SELECT id, email, role, organization_id, full_name FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ProfileLookupError::Unavailable(e.to_string()))?
        .ok_or(ProfileLookupError::NotFound(id))
    }

    async fn list_profiles(&self, organization_id: Uuid) -> Vec<Profile> {
        sqlx::query_as::<_, Profile>(
            "SELECT id, email, role, organization_id, full_name FROM profiles \
             WHERE organization_id = $1 ORDER BY email ASC",
        )
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_profiles error: {:?}", e);
            vec![]
        })
    }

    /// list_tickets
    ///
    /// The scope decides the filter column; newest activity first.
    async fn list_tickets(&self, scope: TicketScope) -> Vec<Ticket> {
        let (column, value) = match scope {
            TicketScope::Organization(id) => ("organization_id", id),
            TicketScope::Agent(id) => ("assigned_agent_id", id),
            TicketScope::Customer(id) => ("customer_id", id),
        };
        let query = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE {column} = $1 ORDER BY updated_at DESC"
        );

        sqlx::query_as::<_, Ticket>(&query)
            .bind(value)
            .fetch_all(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("list_tickets error: {:?}", e);
                vec![]
            })
    }

    async fn get_ticket(&self, id: Uuid) -> Option<Ticket> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_ticket error: {:?}", e);
                None
            })
    }

    /// create_ticket
    ///
    /// New tickets always start `open` and unassigned.
    async fn create_ticket(
        &self,
        organization_id: Uuid,
        customer_id: Uuid,
        req: CreateTicketRequest,
    ) -> Option<Ticket> {
        let query = format!(
            "INSERT INTO tickets (id, organization_id, customer_id, subject, description, status, \
             priority, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 'open', $6, NOW(), NOW()) RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(Uuid::new_v4())
            .bind(organization_id)
            .bind(customer_id)
            .bind(req.subject)
            .bind(req.description)
            .bind(req.priority.as_str())
            .fetch_one(&self.pool)
            .await
            .inspect_err(|e| tracing::error!("create_ticket error: {:?}", e))
            .ok()
    }

    async fn update_ticket_status(&self, id: Uuid, status: TicketStatus) -> Option<Ticket> {
        let query = format!(
            "UPDATE tickets SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("update_ticket_status error: {:?}", e);
                None
            })
    }

    async fn assign_ticket(&self, id: Uuid, agent_id: Uuid) -> Option<Ticket> {
        let query = format!(
            "UPDATE tickets SET assigned_agent_id = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, Ticket>(&query)
            .bind(id)
            .bind(agent_id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("assign_ticket error: {:?}", e);
                None
            })
    }

    /// list_messages
    ///
    /// Oldest first, each joined with the author's email.
    async fn list_messages(&self, ticket_id: Uuid) -> Vec<TicketMessage> {
        sqlx::query_as::<_, TicketMessage>(
            r#"
            SELECT m.id, m.ticket_id, m.author_id, m.body, m.created_at, p.email AS author_email
            FROM ticket_messages m
            JOIN profiles p ON m.author_id = p.id
            WHERE m.ticket_id = $1
            ORDER BY m.created_at ASC
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_messages error: {:?}", e);
            vec![]
        })
    }

    /// add_message
    ///
    /// Inserts the message and bumps the ticket's `updated_at` in one statement.
    async fn add_message(
        &self,
        ticket_id: Uuid,
        author_id: Uuid,
        body: String,
    ) -> Option<TicketMessage> {
        sqlx::query_as::<_, TicketMessage>(
            r#"
            WITH inserted AS (
                INSERT INTO ticket_messages (id, ticket_id, author_id, body, created_at)
                VALUES ($1, $2, $3, $4, NOW())
                RETURNING id, ticket_id, author_id, body, created_at
            ), touched AS (
                UPDATE tickets SET updated_at = NOW() WHERE id = $2
            )
            SELECT i.id, i.ticket_id, i.author_id, i.body, i.created_at, p.email AS author_email
            FROM inserted i JOIN profiles p ON i.author_id = p.id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(ticket_id)
        .bind(author_id)
        .bind(body)
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("add_message error: {:?}", e))
        .ok()
    }

    async fn record_attachment(&self, attachment: NewAttachment) -> Option<Attachment> {
        sqlx::query_as::<_, Attachment>(
            r#"
            INSERT INTO ticket_attachments
                (id, ticket_id, uploaded_by, object_key, filename, content_type, size_bytes, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING id, ticket_id, uploaded_by, object_key, filename, content_type, size_bytes, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(attachment.ticket_id)
        .bind(attachment.uploaded_by)
        .bind(attachment.object_key)
        .bind(attachment.filename)
        .bind(attachment.content_type)
        .bind(attachment.size_bytes)
        .fetch_one(&self.pool)
        .await
        .inspect_err(|e| tracing::error!("record_attachment error: {:?}", e))
        .ok()
    }

    /// get_stats
    ///
    /// All dashboard counters for one organization in a single round trip.
    async fn get_stats(&self, organization_id: Uuid) -> DashboardStats {
        let row: Result<(i64, i64, i64, i64), _> = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM tickets WHERE organization_id = $1 AND status = 'open'),
                (SELECT COUNT(*) FROM tickets WHERE organization_id = $1 AND status = 'pending'),
                (SELECT COUNT(*) FROM tickets WHERE organization_id = $1 AND status = 'resolved'),
                (SELECT COUNT(*) FROM profiles WHERE organization_id = $1 AND role = 'agent')
            "#,
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await;

        match row {
            Ok((open_tickets, pending_tickets, resolved_tickets, agents)) => DashboardStats {
                open_tickets,
                pending_tickets,
                resolved_tickets,
                agents,
            },
            Err(e) => {
                tracing::error!("get_stats error: {:?}", e);
                DashboardStats::default()
            }
        }
    }
}
