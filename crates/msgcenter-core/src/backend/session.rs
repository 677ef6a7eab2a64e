//! Session-storage implementation of the mail backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BackendError, BackendOperation, BackendResult, FailureInjector, MailBackend};
use crate::config::{Config, SimulationConfig};
use crate::model::{
    Conversation, ConversationId, DEFAULT_PREVIEW_LENGTH, Message, MessageId, Participant,
};
use crate::storage::SessionStorage;

/// Storage key of the conversation list record.
pub const CONVERSATIONS_KEY: &str = "msgcenter.conversations";

/// Storage key of the draft map record.
pub const DRAFTS_KEY: &str = "msgcenter.drafts";

type Drafts = HashMap<ConversationId, String>;

/// Mail backend over [`SessionStorage`] with simulated latency and failures.
///
/// Nothing happens at construction; call [`SessionBackend::initialize`] once at
/// startup to seed empty storage.
#[derive(Debug)]
pub struct SessionBackend {
    storage: SessionStorage,
    identity: Participant,
    latency: Duration,
    failures: FailureInjector,
    /// Serializes read-modify-write cycles on the two records.
    write_lock: Mutex<()>,
    next_message_id: AtomicU64,
}

impl SessionBackend {
    /// Creates a backend over existing storage.
    #[must_use]
    pub fn new(storage: SessionStorage, identity: Participant) -> Self {
        Self {
            storage,
            identity,
            latency: Duration::ZERO,
            failures: FailureInjector::disabled(),
            write_lock: Mutex::new(()),
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Creates a backend over fresh in-memory storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be opened.
    pub async fn in_memory(identity: Participant) -> crate::Result<Self> {
        Ok(Self::new(SessionStorage::in_memory().await?, identity))
    }

    /// Creates a backend configured from `config`.
    #[must_use]
    pub fn from_config(storage: SessionStorage, config: &Config) -> Self {
        Self::new(storage, config.identity.clone()).with_simulation(&config.simulation)
    }

    /// Applies latency and failure injection settings.
    #[must_use]
    pub fn with_simulation(mut self, simulation: &SimulationConfig) -> Self {
        self.latency = simulation.latency();
        self.failures = FailureInjector::from_config(simulation);
        self
    }

    /// Sets the simulated per-call latency.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replaces the failure injector.
    #[must_use]
    pub fn with_failures(mut self, failures: FailureInjector) -> Self {
        self.failures = failures;
        self
    }

    /// Returns the failure injector, e.g. to flip its toggle at runtime.
    #[must_use]
    pub const fn failures(&self) -> &FailureInjector {
        &self.failures
    }

    /// Returns the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Writes `seed` to storage unless records already exist.
    ///
    /// Existing data is never overwritten, so calling this again (or after a
    /// reload with surviving storage) is harmless. Returns whether the
    /// conversation record was seeded.
    ///
    /// # Errors
    ///
    /// Returns an error if storage access fails.
    pub async fn initialize(&self, seed: &[Conversation]) -> crate::Result<bool> {
        let _guard = self.write_lock.lock().await;

        let seeded = if self.storage.contains(CONVERSATIONS_KEY).await? {
            debug!("Conversation record present, skipping seed");
            false
        } else {
            self.storage.set_json(CONVERSATIONS_KEY, seed).await?;
            info!(count = seed.len(), "Seeded conversations");
            true
        };

        if !self.storage.contains(DRAFTS_KEY).await? {
            self.storage.set_json(DRAFTS_KEY, &Drafts::new()).await?;
        }

        Ok(seeded)
    }

    /// Clears both records. The next [`SessionBackend::initialize`] seeds again.
    ///
    /// # Errors
    ///
    /// Returns an error if storage access fails.
    pub async fn teardown(&self) -> crate::Result<()> {
        let _guard = self.write_lock.lock().await;
        self.storage.clear().await?;
        info!("Session storage cleared");
        Ok(())
    }

    /// Latency, then the failure roll.
    async fn simulate(&self, operation: BackendOperation) -> BackendResult<()> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failures.should_fail(operation) {
            warn!(%operation, "Injected backend failure");
            return Err(BackendError::Injected { operation });
        }
        Ok(())
    }

    async fn load_conversations(&self) -> BackendResult<Vec<Conversation>> {
        Ok(self
            .storage
            .get_json::<Vec<Conversation>>(CONVERSATIONS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn save_conversations(&self, conversations: &[Conversation]) -> BackendResult<()> {
        self.storage.set_json(CONVERSATIONS_KEY, conversations).await?;
        Ok(())
    }

    async fn load_drafts(&self) -> BackendResult<Drafts> {
        Ok(self
            .storage
            .get_json::<Drafts>(DRAFTS_KEY)
            .await?
            .unwrap_or_default())
    }

    async fn clear_draft(&self, id: &ConversationId) -> BackendResult<()> {
        let mut drafts = self.load_drafts().await?;
        if drafts.remove(id).is_some() {
            self.storage.set_json(DRAFTS_KEY, &drafts).await?;
        }
        Ok(())
    }

    /// Applies `change` to one conversation and writes the list back.
    async fn update_conversation(
        &self,
        id: &ConversationId,
        change: impl FnOnce(&mut Conversation),
    ) -> BackendResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut conversations = self.load_conversations().await?;
        let conversation = conversations
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| BackendError::NotFound(id.clone()))?;
        change(conversation);
        self.save_conversations(&conversations).await
    }

    fn next_message_id(&self) -> MessageId {
        let seq = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        MessageId::new(format!("msg-{}-{seq}", Utc::now().timestamp_millis()))
    }
}

impl MailBackend for SessionBackend {
    async fn list_conversations(&self) -> BackendResult<Vec<Conversation>> {
        self.simulate(BackendOperation::ListConversations).await?;
        let mut conversations = self.load_conversations().await?;
        conversations.sort_by(|a, b| b.last_message_time.cmp(&a.last_message_time));
        Ok(conversations)
    }

    async fn get_thread(&self, id: &ConversationId) -> BackendResult<Conversation> {
        self.simulate(BackendOperation::GetThread).await?;
        self.load_conversations()
            .await?
            .into_iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| BackendError::NotFound(id.clone()))
    }

    async fn send(&self, conversation_id: &ConversationId, html: &str) -> BackendResult<Message> {
        self.simulate(BackendOperation::Send).await?;

        let _guard = self.write_lock.lock().await;
        let mut conversations = self.load_conversations().await?;
        let position = conversations
            .iter()
            .position(|c| &c.id == conversation_id)
            .ok_or_else(|| BackendError::NotFound(conversation_id.clone()))?;

        let mut conversation = conversations.remove(position);
        let message = Message {
            id: self.next_message_id(),
            conversation_id: conversation_id.clone(),
            sender: self.identity.clone(),
            recipients: conversation.reply_recipients(&self.identity),
            timestamp: Utc::now(),
            body_html: html.to_string(),
            attachments: Vec::new(),
        };
        conversation.push_message(message.clone(), DEFAULT_PREVIEW_LENGTH);
        conversation.is_read = true;
        conversations.insert(0, conversation);
        self.save_conversations(&conversations).await?;

        // The conversation is already written; a stale draft is harmless.
        if let Err(e) = self.clear_draft(conversation_id).await {
            warn!(conversation = %conversation_id, error = %e, "Draft cleanup failed");
        }

        info!(conversation = %conversation_id, message = %message.id, "Message stored");
        Ok(message)
    }

    async fn delete_conversation(&self, id: &ConversationId) -> BackendResult<()> {
        self.simulate(BackendOperation::DeleteConversation).await?;

        let _guard = self.write_lock.lock().await;
        let mut conversations = self.load_conversations().await?;
        let before = conversations.len();
        conversations.retain(|c| &c.id != id);
        if conversations.len() == before {
            return Err(BackendError::NotFound(id.clone()));
        }
        self.save_conversations(&conversations).await?;

        // The conversation is already written; a stale draft is harmless.
        if let Err(e) = self.clear_draft(id).await {
            warn!(conversation = %id, error = %e, "Draft cleanup failed");
        }

        info!(conversation = %id, "Conversation deleted");
        Ok(())
    }

    async fn toggle_starred(&self, id: &ConversationId) -> BackendResult<()> {
        self.simulate(BackendOperation::ToggleStarred).await?;
        self.update_conversation(id, |c| c.is_starred = !c.is_starred)
            .await
    }

    async fn mark_as_read(&self, id: &ConversationId, read: bool) -> BackendResult<()> {
        self.simulate(BackendOperation::MarkAsRead).await?;
        self.update_conversation(id, |c| c.is_read = read).await
    }

    async fn get_draft(&self, id: &ConversationId) -> BackendResult<Option<String>> {
        self.simulate(BackendOperation::GetDraft).await?;
        Ok(self.load_drafts().await?.remove(id))
    }

    async fn update_draft(&self, id: &ConversationId, html: &str) -> BackendResult<()> {
        self.simulate(BackendOperation::UpdateDraft).await?;

        let _guard = self.write_lock.lock().await;
        let mut drafts = self.load_drafts().await?;
        if html.is_empty() {
            drafts.remove(id);
        } else {
            drafts.insert(id.clone(), html.to_string());
        }
        self.storage.set_json(DRAFTS_KEY, &drafts).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::seed_conversations;

    async fn seeded() -> SessionBackend {
        let backend = SessionBackend::in_memory(Participant::new("Me", "me@example.com"))
            .await
            .unwrap();
        backend.initialize(&seed_conversations()).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_initialize_seeds_only_once() {
        let backend = SessionBackend::in_memory(Participant::default()).await.unwrap();
        assert!(backend.initialize(&seed_conversations()).await.unwrap());

        backend
            .delete_conversation(&ConversationId::new("3"))
            .await
            .unwrap();

        // Second init must not resurrect the deleted conversation.
        assert!(!backend.initialize(&seed_conversations()).await.unwrap());
        assert_eq!(backend.list_conversations().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_teardown_then_reseed() {
        let backend = seeded().await;
        backend.teardown().await.unwrap();
        assert!(backend.list_conversations().await.unwrap().is_empty());
        assert!(backend.initialize(&seed_conversations()).await.unwrap());
        assert_eq!(backend.list_conversations().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_send_appends_and_moves_to_front() {
        let backend = seeded().await;
        let id = ConversationId::new("2");
        backend.update_draft(&id, "<p>half</p>").await.unwrap();

        let message = backend.send(&id, "<p>On it</p>").await.unwrap();
        assert!(!message.id.is_temporary());
        assert_eq!(message.sender.email, "me@example.com");
        assert_eq!(message.recipients, vec!["oskar@rustfest.example".to_string()]);

        let list = backend.list_conversations().await.unwrap();
        assert_eq!(list[0].id, id);
        assert_eq!(list[0].preview, "On it");
        assert_eq!(list[0].messages.last().unwrap().id, message.id);
        assert_eq!(backend.get_draft(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_flags_persist() {
        let backend = seeded().await;
        let id = ConversationId::new("1");

        backend.toggle_starred(&id).await.unwrap();
        backend.mark_as_read(&id, true).await.unwrap();

        let thread = backend.get_thread(&id).await.unwrap();
        assert!(thread.is_starred);
        assert!(thread.is_read);
    }

    #[tokio::test]
    async fn test_missing_conversation() {
        let backend = seeded().await;
        let missing = ConversationId::new("404");
        assert!(matches!(
            backend.get_thread(&missing).await,
            Err(BackendError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete_conversation(&missing).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_storage_untouched() {
        let backend = seeded()
            .await
            .with_failures(FailureInjector::failing(BackendOperation::DeleteConversation));
        let id = ConversationId::new("1");

        assert!(matches!(
            backend.delete_conversation(&id).await,
            Err(BackendError::Injected {
                operation: BackendOperation::DeleteConversation
            })
        ));
        assert!(backend.get_thread(&id).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_survives_unreadable_drafts() {
        let backend = seeded().await;
        let id = ConversationId::new("2");
        backend.storage().set_item(DRAFTS_KEY, "not json").await.unwrap();

        let message = backend.send(&id, "<p>On it</p>").await.unwrap();
        let thread = backend.get_thread(&id).await.unwrap();
        assert_eq!(thread.messages.last().unwrap().id, message.id);

        backend.delete_conversation(&id).await.unwrap();
        assert!(matches!(
            backend.get_thread(&id).await,
            Err(BackendError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_drafts_round_trip() {
        let backend = seeded().await;
        let id = ConversationId::new("1");
        assert_eq!(backend.get_draft(&id).await.unwrap(), None);

        backend.update_draft(&id, "<p>wip</p>").await.unwrap();
        assert_eq!(
            backend.get_draft(&id).await.unwrap(),
            Some("<p>wip</p>".to_string())
        );

        backend.update_draft(&id, "").await.unwrap();
        assert_eq!(backend.get_draft(&id).await.unwrap(), None);
    }
}
