use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::prelude::{Ticket, TicketMessage};
use crate::entities::ticket::{IssueType, TicketPriority, TicketStatus};
use crate::entities::ticket_message::MessageSender;
use crate::entities::{ticket, ticket_message};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Capacity of the per-ticket fanout. A slow SSE consumer that lags behind
/// this many messages skips ahead rather than stalling writers.
const CHANNEL_CAPACITY: usize = 64;

const REPLY_TIMEOUT: Duration = Duration::from_secs(20);

/// The automatic first response on a new ticket, and which model wrote it.
#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub body: String,
    pub model: String,
}

/// Produces the automatic first response on a new ticket.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn first_reply(&self, subject: &str, body: &str)
        -> Result<GeneratedReply, ServiceError>;
}

/// Support tickets with live message streams.
///
/// Messages fan out through a per-ticket broadcast channel so open SSE
/// connections see agent and assistant replies as they land. Channels are
/// created lazily and dropped when the ticket closes.
#[derive(Clone)]
pub struct SupportService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    channels: Arc<DashMap<Uuid, broadcast::Sender<MessageView>>>,
    reply: Option<Arc<dyn ReplyGenerator>>,
}

impl SupportService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        reply: Option<Arc<dyn ReplyGenerator>>,
    ) -> Self {
        Self {
            db,
            event_sender,
            channels: Arc::new(DashMap::new()),
            reply,
        }
    }

    /// Opens a ticket with the customer's first message.
    ///
    /// When a reply generator is configured, the assistant's response is
    /// produced on a detached task after this call returns; clients pick it
    /// up over the ticket stream or on the next fetch.
    #[instrument(skip(self, input), fields(user_id = %user_id))]
    pub async fn open_ticket(
        &self,
        user_id: Uuid,
        input: OpenTicketInput,
    ) -> Result<TicketView, ServiceError> {
        input.validate()?;

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let ticket = ticket::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_number: Set(generate_ticket_number()),
            user_id: Set(user_id),
            subject: Set(input.subject.clone()),
            issue_type: Set(input.issue_type),
            status: Set(TicketStatus::Open),
            priority: Set(input.priority),
            order_id: Set(input.order_id),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let ticket = ticket.insert(&txn).await?;

        let first = ticket_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_id: Set(ticket.id),
            sender: Set(MessageSender::User),
            body: Set(input.body.clone()),
            ai_meta: Set(None),
            created_at: Set(now),
        };
        let first = first.insert(&txn).await?;
        txn.commit().await?;

        self.broadcast(ticket.id, MessageView::from(first.clone()));
        self.event_sender.send(Event::TicketOpened {
            ticket_id: ticket.id,
            user_id,
        });
        self.spawn_autoreply(&ticket, input.body);

        info!(ticket_number = %ticket.ticket_number, "ticket opened");
        Ok(TicketView::assemble(ticket, vec![first]))
    }

    /// The user's tickets, newest first.
    pub async fn list_tickets(
        &self,
        user_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<TicketSummary>, u64), ServiceError> {
        let paginator = Ticket::find()
            .filter(ticket::Column::UserId.eq(user_id))
            .order_by_desc(ticket::Column::UpdatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let tickets = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((tickets.into_iter().map(TicketSummary::from).collect(), total))
    }

    /// One ticket with its full conversation.
    pub async fn get_ticket(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<TicketView, ServiceError> {
        let ticket = self.owned(user_id, ticket_id).await?;
        let messages = self.messages_of(ticket.id).await?;
        Ok(TicketView::assemble(ticket, messages))
    }

    /// Appends a customer message. Reopens a ticket that was waiting on the
    /// customer or marked resolved; a closed ticket stays closed and rejects
    /// the message.
    #[instrument(skip(self, body))]
    pub async fn post_message(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
        body: String,
    ) -> Result<MessageView, ServiceError> {
        let ticket = self.owned(user_id, ticket_id).await?;
        self.append_message(ticket, MessageSender::User, &body, None)
            .await
    }

    /// Agent reply; moves the ticket to awaiting-customer.
    #[instrument(skip(self, body))]
    pub async fn admin_reply(
        &self,
        ticket_id: Uuid,
        body: String,
    ) -> Result<MessageView, ServiceError> {
        let ticket = self.any(ticket_id).await?;
        let user_id = ticket.user_id;
        let view = self
            .append_message(ticket, MessageSender::Admin, &body, None)
            .await?;
        self.event_sender.send(Event::TicketReplied { ticket_id, user_id });
        Ok(view)
    }

    /// Marks the ticket resolved. The next customer message reopens it;
    /// resolving twice is a no-op, a closed ticket cannot be resolved.
    #[instrument(skip(self))]
    pub async fn admin_resolve_ticket(&self, ticket_id: Uuid) -> Result<TicketView, ServiceError> {
        let ticket = self.any(ticket_id).await?;
        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::Conflict("ticket is closed".to_string()));
        }

        let ticket = if ticket.status == TicketStatus::Resolved {
            ticket
        } else {
            let mut active: ticket::ActiveModel = ticket.into();
            active.status = Set(TicketStatus::Resolved);
            active.updated_at = Set(Utc::now());
            let ticket = active.update(&*self.db).await?;
            info!(ticket_number = %ticket.ticket_number, "ticket resolved");
            ticket
        };

        let messages = self.messages_of(ticket.id).await?;
        Ok(TicketView::assemble(ticket, messages))
    }

    /// Closes the ticket and tears down its live stream. Closing twice is a
    /// no-op.
    #[instrument(skip(self))]
    pub async fn close_ticket(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<TicketView, ServiceError> {
        let ticket = self.owned(user_id, ticket_id).await?;
        self.close(ticket).await
    }

    pub async fn admin_close_ticket(&self, ticket_id: Uuid) -> Result<TicketView, ServiceError> {
        let ticket = self.any(ticket_id).await?;
        self.close(ticket).await
    }

    /// Admin listing across all users, optionally narrowed to one status.
    pub async fn admin_list_tickets(
        &self,
        status: Option<TicketStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<TicketSummary>, u64), ServiceError> {
        let mut select = Ticket::find();
        if let Some(status) = status {
            select = select.filter(ticket::Column::Status.eq(status));
        }
        let paginator = select
            .order_by_desc(ticket::Column::UpdatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let tickets = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((tickets.into_iter().map(TicketSummary::from).collect(), total))
    }

    pub async fn admin_get_ticket(&self, ticket_id: Uuid) -> Result<TicketView, ServiceError> {
        let ticket = self.any(ticket_id).await?;
        let messages = self.messages_of(ticket.id).await?;
        Ok(TicketView::assemble(ticket, messages))
    }

    /// Live feed of new messages on the ticket, for the SSE endpoint.
    pub async fn subscribe(
        &self,
        user_id: Uuid,
        ticket_id: Uuid,
    ) -> Result<broadcast::Receiver<MessageView>, ServiceError> {
        self.owned(user_id, ticket_id).await?;
        Ok(self.channel(ticket_id).subscribe())
    }

    async fn close(&self, ticket: ticket::Model) -> Result<TicketView, ServiceError> {
        let ticket = if ticket.status == TicketStatus::Closed {
            ticket
        } else {
            let mut active: ticket::ActiveModel = ticket.into();
            active.status = Set(TicketStatus::Closed);
            active.updated_at = Set(Utc::now());
            let ticket = active.update(&*self.db).await?;
            self.channels.remove(&ticket.id);
            info!(ticket_number = %ticket.ticket_number, "ticket closed");
            ticket
        };

        let messages = self.messages_of(ticket.id).await?;
        Ok(TicketView::assemble(ticket, messages))
    }

    /// Stores a message, applies the sender's status rule and fans it out.
    ///
    /// A customer message puts the ticket back to `open`, an agent message
    /// to `pending`; the automatic reply never changes status, a human still
    /// has to look.
    async fn append_message(
        &self,
        ticket: ticket::Model,
        sender: MessageSender,
        body: &str,
        ai_meta: Option<serde_json::Value>,
    ) -> Result<MessageView, ServiceError> {
        if ticket.status == TicketStatus::Closed {
            return Err(ServiceError::Conflict("ticket is closed".to_string()));
        }
        if body.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "message body cannot be empty".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let now = Utc::now();
        let message = ticket_message::ActiveModel {
            id: Set(Uuid::new_v4()),
            ticket_id: Set(ticket.id),
            sender: Set(sender),
            body: Set(body.to_string()),
            ai_meta: Set(ai_meta),
            created_at: Set(now),
        };
        let message = message.insert(&txn).await?;

        let ticket_id = ticket.id;
        let new_status = match sender {
            MessageSender::User => Some(TicketStatus::Open),
            MessageSender::Admin => Some(TicketStatus::Pending),
            MessageSender::Ai => None,
        };
        let mut active: ticket::ActiveModel = ticket.into();
        if let Some(status) = new_status {
            active.status = Set(status);
        }
        active.updated_at = Set(now);
        active.update(&txn).await?;
        txn.commit().await?;

        let view = MessageView::from(message);
        self.broadcast(ticket_id, view.clone());
        Ok(view)
    }

    fn spawn_autoreply(&self, ticket: &ticket::Model, body: String) {
        let Some(generator) = self.reply.clone() else {
            return;
        };
        let service = self.clone();
        let ticket_id = ticket.id;
        let subject = ticket.subject.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let reply = match generator.first_reply(&subject, &body).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(ticket_id = %ticket_id, error = %e, "auto-reply generation failed");
                    return;
                }
            };
            let meta = serde_json::json!({
                "model": reply.model,
                "latency_ms": started.elapsed().as_millis() as u64,
            });
            let ticket = match service.any(ticket_id).await {
                Ok(ticket) => ticket,
                Err(e) => {
                    warn!(ticket_id = %ticket_id, error = %e, "auto-reply target vanished");
                    return;
                }
            };
            if let Err(e) = service
                .append_message(ticket, MessageSender::Ai, &reply.body, Some(meta))
                .await
            {
                warn!(ticket_id = %ticket_id, error = %e, "failed to store auto-reply");
            }
        });
    }

    fn channel(&self, ticket_id: Uuid) -> broadcast::Sender<MessageView> {
        self.channels
            .entry(ticket_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    fn broadcast(&self, ticket_id: Uuid, view: MessageView) {
        if let Some(sender) = self.channels.get(&ticket_id) {
            // No receivers is fine; nobody is watching this ticket.
            let _ = sender.send(view);
        }
    }

    async fn owned(&self, user_id: Uuid, ticket_id: Uuid) -> Result<ticket::Model, ServiceError> {
        Ticket::find_by_id(ticket_id)
            .filter(ticket::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("ticket {ticket_id}")))
    }

    async fn any(&self, ticket_id: Uuid) -> Result<ticket::Model, ServiceError> {
        Ticket::find_by_id(ticket_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("ticket {ticket_id}")))
    }

    async fn messages_of(
        &self,
        ticket_id: Uuid,
    ) -> Result<Vec<ticket_message::Model>, ServiceError> {
        Ok(TicketMessage::find()
            .filter(ticket_message::Column::TicketId.eq(ticket_id))
            .order_by_asc(ticket_message::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}

fn generate_ticket_number() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("SH-{}-{:04}", Utc::now().timestamp_millis(), suffix)
}

/// Keyword-matched canned responses; the fallback when no completion
/// service is configured.
pub struct CannedReplyGenerator;

#[async_trait]
impl ReplyGenerator for CannedReplyGenerator {
    async fn first_reply(
        &self,
        subject: &str,
        body: &str,
    ) -> Result<GeneratedReply, ServiceError> {
        let text = format!("{subject} {body}").to_lowercase();
        let reply = if text.contains("refund") {
            "Thanks for reaching out. Refunds are credited to your store wallet within \
             24 hours of approval. An agent will review your request shortly."
        } else if text.contains("payment") || text.contains("charged") {
            "Thanks for reaching out. If a payment was deducted but your order shows \
             unpaid, it usually reconciles within 30 minutes. An agent will confirm \
             the status of your payment shortly."
        } else if text.contains("order") || text.contains("deliver") {
            "Thanks for reaching out. You can follow your order's progress from the \
             Orders page. An agent will check the latest status and get back to you."
        } else {
            "Thanks for reaching out. An agent will get back to you shortly."
        };
        Ok(GeneratedReply {
            body: reply.to_string(),
            model: "canned".to_string(),
        })
    }
}

/// Asks an external completion service for the first reply.
pub struct HttpReplyGenerator {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl HttpReplyGenerator {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(REPLY_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("http client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    reply: String,
    #[serde(default)]
    model: Option<String>,
}

#[async_trait]
impl ReplyGenerator for HttpReplyGenerator {
    async fn first_reply(
        &self,
        subject: &str,
        body: &str,
    ) -> Result<GeneratedReply, ServiceError> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "subject": subject, "message": body }))
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("reply service: {e}")))?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "reply service returned {}",
                response.status()
            )));
        }
        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("reply service body: {e}")))?;

        Ok(GeneratedReply {
            body: completion.reply,
            model: completion.model.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct OpenTicketInput {
    #[validate(length(min = 3, max = 200))]
    #[schema(example = "Where is my order?")]
    pub subject: String,
    #[validate(length(min = 1, max = 4000))]
    #[schema(example = "Order ORD-1717920000000-A7K2 has not moved in three days.")]
    pub body: String,
    #[serde(default)]
    pub issue_type: IssueType,
    #[serde(default)]
    pub priority: TicketPriority,
    /// Optional link to the order the ticket is about.
    pub order_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct PostMessageInput {
    #[validate(length(min = 1, max = 4000))]
    pub body: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MessageView {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub sender: MessageSender,
    pub body: String,
    /// Generation details for automatic replies, absent otherwise.
    #[schema(value_type = Option<Object>)]
    pub ai_meta: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<ticket_message::Model> for MessageView {
    fn from(m: ticket_message::Model) -> Self {
        Self {
            id: m.id,
            ticket_id: m.ticket_id,
            sender: m.sender,
            body: m.body,
            ai_meta: m.ai_meta,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TicketSummary {
    pub id: Uuid,
    #[schema(example = "SH-1717920000000-0042")]
    pub ticket_number: String,
    pub subject: String,
    pub issue_type: IssueType,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ticket::Model> for TicketSummary {
    fn from(t: ticket::Model) -> Self {
        Self {
            id: t.id,
            ticket_number: t.ticket_number,
            subject: t.subject,
            issue_type: t.issue_type,
            status: t.status,
            priority: t.priority,
            order_id: t.order_id,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TicketView {
    pub id: Uuid,
    #[schema(example = "SH-1717920000000-0042")]
    pub ticket_number: String,
    pub subject: String,
    pub issue_type: IssueType,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<MessageView>,
}

impl TicketView {
    fn assemble(ticket: ticket::Model, messages: Vec<ticket_message::Model>) -> Self {
        Self {
            id: ticket.id,
            ticket_number: ticket.ticket_number,
            subject: ticket.subject,
            issue_type: ticket.issue_type,
            status: ticket.status,
            priority: ticket.priority,
            order_id: ticket.order_id,
            created_at: ticket.created_at,
            updated_at: ticket.updated_at,
            messages: messages.into_iter().map(MessageView::from).collect(),
        }
    }
}
