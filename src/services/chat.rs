//! Conversational chat turns: token-budget gating, context assembly, and persistence (§4.7, §6.1).

use crate::models::{ChatMessage, ChatRequest, ChatResponse, Conversation, Message, Tier};
use crate::services::context_manager::{self, ContextManager};
use crate::services::llm_orchestrator::LlmOrchestrator;
use crate::services::model_selector::Endpoint;
use crate::services::tier_resolver::TierResolver;
use crate::services::token_counter;
use crate::utils::error::BlockedPayload;
use crate::utils::{AppError, AppResult};
use chrono::Utc;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

pub struct ChatEngine {
    db: SqlitePool,
    orchestrator: Arc<LlmOrchestrator>,
    tiers: Arc<TierResolver>,
    context: Arc<ContextManager>,
}

impl ChatEngine {
    pub fn new(
        db: SqlitePool,
        orchestrator: Arc<LlmOrchestrator>,
        tiers: Arc<TierResolver>,
        context: Arc<ContextManager>,
    ) -> Self {
        Self { db, orchestrator, tiers, context }
    }

    pub async fn chat(&self, request: ChatRequest) -> AppResult<ChatResponse> {
        let user_id = request.user_id.clone();
        let tier = match &user_id {
            Some(id) => self.tiers.tier(id).await,
            None => Tier::Free,
        };

        let conversation = self.resolve_conversation(&request).await?;
        let stored = self.load_messages(&conversation.id).await?;
        let existing: Vec<ChatMessage> = stored.iter().map(ChatMessage::from).collect();

        let status = context_manager::status(&existing, tier.is_premium());
        if !status.can_continue {
            return Err(AppError::Blocked(BlockedPayload {
                status: "blocked",
                can_continue: false,
                context_status: serde_json::to_value(&status)?,
                user_tier: tier.as_str().to_string(),
            }));
        }

        let user_message = ChatMessage::new("user", &request.query);
        self.insert_message(&conversation.id, &user_message, None).await?;

        let mut windowed = existing;
        windowed.push(user_message.clone());

        let mut context_messages = if tier.is_premium() {
            self.context.compress_medical(&windowed, Some(&self.orchestrator)).await
        } else {
            self.context.free_tier_context(&windowed, Some(&self.orchestrator)).await
        };

        if let Some(id) = &user_id {
            let history = self.context.aggregate_user_context(id, &request.query, Some(&self.orchestrator)).await.unwrap_or_default();
            if !history.is_empty() {
                context_messages.insert(0, ChatMessage::new("system", format!("Relevant medical history: {history}")));
            }
        }

        let llm_messages: Vec<serde_json::Value> =
            context_messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect();

        let result = self
            .orchestrator
            .call_with_fallback(&llm_messages, tier, Endpoint::Chat, false, 0.4, 1500)
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        let assistant_message = ChatMessage::new("assistant", &result.content);
        self.insert_message(&conversation.id, &assistant_message, Some(&result.model)).await?;

        let now = Utc::now();
        sqlx::query("UPDATE conversations SET last_message_at = ? WHERE id = ?")
            .bind(now)
            .bind(&conversation.id)
            .execute(&self.db)
            .await?;

        let title = if !conversation.title_locked && !conversation.auto_title_generated {
            let mut for_title = windowed.clone();
            for_title.push(assistant_message.clone());
            let generated = self.context.generate_title(&for_title, Some(&self.orchestrator)).await;
            sqlx::query("UPDATE conversations SET title = ?, auto_title_generated = 1 WHERE id = ?")
                .bind(&generated)
                .bind(&conversation.id)
                .execute(&self.db)
                .await?;
            generated
        } else {
            conversation.title.clone()
        };

        Ok(ChatResponse {
            conversation_id: conversation.id,
            message: result.content,
            model_used: result.model,
            conversation_title: title,
            context_status: status.status,
            usage: Some(serde_json::to_value(&result.usage)?),
        })
    }

    async fn resolve_conversation(&self, request: &ChatRequest) -> AppResult<Conversation> {
        if let Some(id) = &request.conversation_id {
            let existing: Option<Conversation> =
                sqlx::query_as("SELECT * FROM conversations WHERE id = ?").bind(id).fetch_optional(&self.db).await?;
            if let Some(conversation) = existing {
                return Ok(conversation);
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let conversation = Conversation {
            id: id.clone(),
            user_id: request.user_id.clone().unwrap_or_else(|| "anonymous".to_string()),
            title: "Health Discussion".to_string(),
            title_locked: false,
            auto_title_generated: false,
            created_at: now,
            last_message_at: now,
        };

        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, title_locked, auto_title_generated, created_at, last_message_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(conversation.title_locked)
        .bind(conversation.auto_title_generated)
        .bind(conversation.created_at)
        .bind(conversation.last_message_at)
        .execute(&self.db)
        .await?;

        Ok(conversation)
    }

    async fn load_messages(&self, conversation_id: &str) -> AppResult<Vec<Message>> {
        Ok(sqlx::query_as("SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC")
            .bind(conversation_id)
            .fetch_all(&self.db)
            .await?)
    }

    async fn insert_message(&self, conversation_id: &str, message: &ChatMessage, model_used: Option<&str>) -> AppResult<()> {
        let token_count = token_counter::count(&message.content) as i64;
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, token_count, created_at, model_used)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(conversation_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(token_count)
        .bind(Utc::now())
        .bind(model_used)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model_selector::ModelSelector;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn engine(db: SqlitePool) -> ChatEngine {
        let orchestrator = Arc::new(LlmOrchestrator::new(ModelSelector::default(), None, None, None));
        let tiers = Arc::new(TierResolver::new(db.clone(), std::time::Duration::from_secs(300)));
        let context = Arc::new(ContextManager::new(db.clone()));
        ChatEngine::new(db, orchestrator, tiers, context)
    }

    #[tokio::test]
    async fn free_tier_chat_is_blocked_once_stored_history_hits_the_hard_limit() {
        let db = test_db().await;
        let conversation_id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO conversations (id, user_id, title, title_locked, auto_title_generated, created_at, last_message_at)
             VALUES (?, 'u1', 'Health Discussion', 0, 0, ?, ?)",
        )
        .bind(&conversation_id)
        .bind(now)
        .bind(now)
        .execute(&db)
        .await
        .unwrap();

        let huge = "word ".repeat(77_000);
        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, token_count, created_at) VALUES (?, ?, 'user', ?, 100100, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&conversation_id)
        .bind(&huge)
        .bind(now)
        .execute(&db)
        .await
        .unwrap();

        let before: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(&conversation_id)
            .fetch_one(&db)
            .await
            .unwrap();

        let chat = engine(db.clone());
        let result = chat
            .chat(ChatRequest {
                query: "hello".to_string(),
                user_id: Some("u1".to_string()),
                conversation_id: Some(conversation_id.clone()),
            })
            .await;

        assert!(matches!(result, Err(AppError::Blocked(_))));

        let after: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
            .bind(&conversation_id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(before, after, "a blocked turn must not append the new user message");
    }

    #[tokio::test]
    async fn new_conversation_is_created_when_no_conversation_id_is_given() {
        let db = test_db().await;
        let chat = engine(db.clone());
        let request = ChatRequest { query: "question".to_string(), user_id: None, conversation_id: None };
        let conversation = chat.resolve_conversation(&request).await.unwrap();
        assert_eq!(conversation.user_id, "anonymous");
        assert_eq!(conversation.title, "Health Discussion");
    }
}
