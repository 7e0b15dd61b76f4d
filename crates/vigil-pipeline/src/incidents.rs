// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incident state machine driven by classifier output.
//!
//! `open_incident` and `close_incident` messages move an incident key
//! `(channel, service, alert)` from no incident to open to closed. Closed is
//! terminal; a later open for the same key starts a new incident.
//!
//! A close pairs with the most recently opened incident for its key. Two
//! overlapping incidents with the same key can therefore be mis-paired.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use vigil_core::incident::{CloseOutcome, OpenOutcome};
use vigil_core::{Action, IncidentAction, StoredMessage, VigilError};
use vigil_storage::Database;
use vigil_storage::queries::incidents::{self, IncidentKey};

use crate::handlers::MessageHandler;

/// What a message did to the incident table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// The message carried no incident action.
    Ignored,
    Opened(OpenOutcome),
    Closed(CloseOutcome),
    /// A close arrived with no open incident before it.
    Unmatched,
}

/// Applies open and close transitions for classified messages.
pub struct IncidentHandler {
    db: Database,
}

impl IncidentHandler {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Apply the transition a classified message asks for.
    ///
    /// A close with nothing to close is not an error: it is logged at `warn`
    /// and reported as [`TransitionResult::Unmatched`].
    pub async fn apply(&self, message: &StoredMessage) -> Result<TransitionResult, VigilError> {
        let Some(action) = message.attrs.v1().incident_action.as_ref() else {
            return Ok(TransitionResult::Ignored);
        };
        let key = incident_key(&message.channel_id, action);

        match action.action {
            Action::None => Ok(TransitionResult::Ignored),
            Action::OpenIncident => {
                let outcome =
                    incidents::open_incident(&self.db, &key, &message.ts, action.priority).await?;
                match outcome {
                    OpenOutcome::Created(id) => info!(
                        incident_id = id,
                        channel_id = %key.channel_id,
                        service = %key.service,
                        alert = %key.alert,
                        "incident opened"
                    ),
                    OpenOutcome::AlreadyOpen(id) => {
                        debug!(incident_id = id, "incident open already recorded")
                    }
                }
                Ok(TransitionResult::Opened(outcome))
            }
            Action::CloseIncident => {
                match incidents::close_incident(&self.db, &key, &message.ts).await {
                    Ok(outcome) => {
                        if let CloseOutcome::Closed {
                            incident_id,
                            duration_us,
                        } = outcome
                        {
                            info!(
                                incident_id,
                                duration_us,
                                channel_id = %key.channel_id,
                                service = %key.service,
                                alert = %key.alert,
                                "incident closed"
                            );
                        }
                        Ok(TransitionResult::Closed(outcome))
                    }
                    Err(VigilError::NoOpenIncident { .. }) => {
                        warn!(
                            channel_id = %key.channel_id,
                            service = %key.service,
                            alert = %key.alert,
                            ts = %message.ts,
                            "close without a matching open incident"
                        );
                        Ok(TransitionResult::Unmatched)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }
}

fn incident_key(channel_id: &str, action: &IncidentAction) -> IncidentKey {
    IncidentKey::new(channel_id, action.service.trim(), action.alert.trim())
}

#[async_trait]
impl MessageHandler for IncidentHandler {
    fn name(&self) -> &str {
        "incidents"
    }

    async fn on_message(
        &self,
        message: &StoredMessage,
        _is_backfill: bool,
    ) -> Result<(), VigilError> {
        self.apply(message).await.map(|_| ())
    }
}
