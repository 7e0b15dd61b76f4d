// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordered message handlers run after a message has been classified.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use vigil_core::{SenderTag, StoredMessage, VigilError};
use vigil_storage::Database;
use vigil_storage::queries::messages;

use crate::incidents::IncidentHandler;

/// A step that reacts to a classified top-level message.
///
/// Handlers must be idempotent: a job that is retried runs the whole chain
/// again.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Whether the handler also runs for historical messages.
    fn enabled_for_backfill(&self) -> bool {
        true
    }

    async fn on_message(&self, message: &StoredMessage, is_backfill: bool)
    -> Result<(), VigilError>;
}

/// Handlers in execution order.
///
/// The first failing handler stops the chain and fails the classification
/// job, which the queue retries from the top of the chain.
#[derive(Default, Clone)]
pub struct HandlerChain {
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in chain: sender tagging, then incident tracking.
    pub fn builtin(db: Database) -> Self {
        Self::new()
            .with(Arc::new(SenderTagger::new(db.clone())))
            .with(Arc::new(IncidentHandler::new(db)))
    }

    pub fn with(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every applicable handler, stopping at the first error.
    pub async fn run(&self, message: &StoredMessage, is_backfill: bool) -> Result<(), VigilError> {
        for handler in &self.handlers {
            if is_backfill && !handler.enabled_for_backfill() {
                debug!(handler = handler.name(), "handler skipped for backfill");
                continue;
            }
            if let Err(e) = handler.on_message(message, is_backfill).await {
                warn!(
                    handler = handler.name(),
                    channel_id = %message.channel_id,
                    ts = %message.ts,
                    error = %e,
                    "message handler failed"
                );
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Records whether a message was sent by a bot or a person.
pub struct SenderTagger {
    db: Database,
}

impl SenderTagger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn tag_for(message: &StoredMessage) -> Option<SenderTag> {
        let msg = message.attrs.message();
        if msg.is_bot() {
            let name = msg
                .bot_username
                .clone()
                .or_else(|| msg.bot_id.clone())?;
            Some(SenderTag::Bot { name })
        } else {
            msg.user.clone().map(|id| SenderTag::User { id })
        }
    }
}

#[async_trait]
impl MessageHandler for SenderTagger {
    fn name(&self) -> &str {
        "sender_tagger"
    }

    async fn on_message(
        &self,
        message: &StoredMessage,
        _is_backfill: bool,
    ) -> Result<(), VigilError> {
        let Some(tag) = Self::tag_for(message) else {
            debug!(ts = %message.ts, "message has no identifiable sender");
            return Ok(());
        };
        messages::tag_sender(&self.db, &message.channel_id, &message.ts, tag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use vigil_core::{ChatMessage, MessageAttrs, MessageSource, SlackTs};
    use vigil_storage::queries::channels;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        channels::add_channel(&db, "C1").await.unwrap();
        (db, dir)
    }

    fn stored(msg: ChatMessage) -> StoredMessage {
        StoredMessage {
            channel_id: "C1".into(),
            ts: msg.ts.clone(),
            attrs: MessageAttrs::from_message(msg),
            embedding: None,
        }
    }

    struct Counting {
        name: &'static str,
        backfill: bool,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler for Counting {
        fn name(&self) -> &str {
            self.name
        }

        fn enabled_for_backfill(&self) -> bool {
            self.backfill
        }

        async fn on_message(&self, _: &StoredMessage, _: bool) -> Result<(), VigilError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(VigilError::Internal("boom".into()));
            }
            Ok(())
        }
    }

    fn counting(name: &'static str, backfill: bool, fail: bool) -> (Arc<Counting>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(Counting {
            name,
            backfill,
            fail,
            calls: calls.clone(),
        });
        (handler, calls)
    }

    fn message() -> StoredMessage {
        stored(ChatMessage::new(SlackTs::parse("101.0").unwrap(), "U1", "hi"))
    }

    #[tokio::test]
    async fn failing_handler_stops_the_chain() {
        let (first, first_calls) = counting("first", true, true);
        let (second, second_calls) = counting("second", true, false);
        let chain = HandlerChain::new().with(first).with(second);

        assert_eq!(chain.names(), vec!["first", "second"]);
        let err = chain.run(&message(), false).await.unwrap_err();
        assert!(matches!(err, VigilError::Internal(msg) if msg == "boom"));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn passing_chain_runs_every_handler() {
        let (first, first_calls) = counting("first", true, false);
        let (second, second_calls) = counting("second", true, false);
        let chain = HandlerChain::new().with(first).with(second);

        chain.run(&message(), false).await.unwrap();
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backfill_skips_live_only_handlers() {
        let (live_only, live_calls) = counting("live_only", false, false);
        let (always, always_calls) = counting("always", true, false);
        let chain = HandlerChain::new().with(live_only).with(always);

        chain.run(&message(), true).await.unwrap();
        assert_eq!(live_calls.load(Ordering::SeqCst), 0);
        assert_eq!(always_calls.load(Ordering::SeqCst), 1);

        chain.run(&message(), false).await.unwrap();
        assert_eq!(live_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bot_messages_are_tagged_with_the_bot_name() {
        let mut msg = ChatMessage::new(SlackTs::parse("101.0").unwrap(), "U1", "down");
        msg.user = None;
        msg.bot_id = Some("B01".into());
        msg.bot_username = Some("alertmanager".into());
        assert_eq!(
            SenderTagger::tag_for(&stored(msg)),
            Some(SenderTag::Bot {
                name: "alertmanager".into()
            })
        );

        let person = ChatMessage::new(SlackTs::parse("102.0").unwrap(), "U7", "looking");
        assert_eq!(
            SenderTagger::tag_for(&stored(person)),
            Some(SenderTag::User { id: "U7".into() })
        );
    }

    #[tokio::test]
    async fn sender_tag_is_persisted() {
        let (db, _dir) = setup_db().await;
        let msg = ChatMessage::new(SlackTs::parse("101.0").unwrap(), "U7", "looking");
        messages::add_message(&db, "C1", &msg, MessageSource::Live)
            .await
            .unwrap();
        let before = messages::get_message(&db, "C1", &msg.ts).await.unwrap().unwrap();

        SenderTagger::new(db.clone())
            .on_message(&before, false)
            .await
            .unwrap();

        let after = messages::get_message(&db, "C1", &msg.ts).await.unwrap().unwrap();
        assert_eq!(
            after.attrs.v1().sender,
            Some(SenderTag::User { id: "U7".into() })
        );
        db.close().await.unwrap();
    }
}
