// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifier output and incident records.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::SlackTs;

/// What the classifier decided a message means for incident tracking.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    None,
    OpenIncident,
    CloseIncident,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum IncidentPriority {
    High,
    Low,
}

/// Structured result of classifying one message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentAction {
    pub action: Action,
    #[serde(default)]
    pub alert: String,
    #[serde(default)]
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<IncidentPriority>,
    /// Expected duration hint. Accepts integer nanoseconds or a
    /// human-readable string such as `"1h30m"`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_hint"
    )]
    pub duration: Option<Duration>,
}

impl IncidentAction {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn open(service: impl Into<String>, alert: impl Into<String>) -> Self {
        Self {
            action: Action::OpenIncident,
            service: service.into(),
            alert: alert.into(),
            ..Self::default()
        }
    }

    pub fn close(service: impl Into<String>, alert: impl Into<String>) -> Self {
        Self {
            action: Action::CloseIncident,
            service: service.into(),
            alert: alert.into(),
            ..Self::default()
        }
    }

    pub fn is_none(&self) -> bool {
        self.action == Action::None
    }
}

mod duration_hint {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Nanos(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        match Option::<Raw>::deserialize(d)? {
            None => Ok(None),
            Some(Raw::Nanos(0)) => Ok(None),
            Some(Raw::Nanos(n)) => Ok(Some(Duration::from_nanos(n))),
            Some(Raw::Text(t)) if t.trim().is_empty() => Ok(None),
            Some(Raw::Text(t)) => humantime::parse_duration(t.trim())
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Which transition produced an incident tag on a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Open,
    Close,
}

/// Audit tag linking a message to the incident it opened or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTag {
    pub incident_id: i64,
    pub action: Transition,
}

/// A stored incident.
#[derive(Debug, Clone, PartialEq)]
pub struct Incident {
    pub id: i64,
    pub channel_id: String,
    pub service: String,
    pub alert: String,
    pub priority: Option<IncidentPriority>,
    pub open_ts: SlackTs,
    pub close_ts: Option<SlackTs>,
    /// `close_ts - open_ts` in microseconds, set when the incident closes.
    pub duration_us: Option<i64>,
}

impl Incident {
    pub fn is_open(&self) -> bool {
        self.close_ts.is_none()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration_us
            .and_then(|us| u64::try_from(us).ok())
            .map(Duration::from_micros)
    }
}

/// Result of an open transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Created(i64),
    /// The same (channel, service, alert, open ts) was already recorded.
    AlreadyOpen(i64),
}

impl OpenOutcome {
    pub fn incident_id(&self) -> i64 {
        match self {
            Self::Created(id) | Self::AlreadyOpen(id) => *id,
        }
    }
}

/// Result of a close transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed { incident_id: i64, duration_us: i64 },
    /// This exact close event was already applied.
    AlreadyClosed { incident_id: i64, duration_us: i64 },
}

impl CloseOutcome {
    pub fn incident_id(&self) -> i64 {
        match self {
            Self::Closed { incident_id, .. } | Self::AlreadyClosed { incident_id, .. } => {
                *incident_id
            }
        }
    }

    pub fn duration_us(&self) -> i64 {
        match self {
            Self::Closed { duration_us, .. } | Self::AlreadyClosed { duration_us, .. } => {
                *duration_us
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classifier_output() {
        let json = r#"{"action":"open_incident","alert":"down","service":"X","priority":"HIGH"}"#;
        let action: IncidentAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.action, Action::OpenIncident);
        assert_eq!(action.service, "X");
        assert_eq!(action.alert, "down");
        assert_eq!(action.priority, Some(IncidentPriority::High));
        assert_eq!(action.duration, None);
    }

    #[test]
    fn none_action_needs_no_other_fields() {
        let action: IncidentAction = serde_json::from_str(r#"{"action":"none"}"#).unwrap();
        assert!(action.is_none());
    }

    #[test]
    fn duration_accepts_nanos_and_text() {
        let nanos: IncidentAction =
            serde_json::from_str(r#"{"action":"none","duration":90000000000}"#).unwrap();
        assert_eq!(nanos.duration, Some(Duration::from_secs(90)));

        let text: IncidentAction =
            serde_json::from_str(r#"{"action":"none","duration":"1h 30m"}"#).unwrap();
        assert_eq!(text.duration, Some(Duration::from_secs(5400)));

        let zero: IncidentAction =
            serde_json::from_str(r#"{"action":"none","duration":0}"#).unwrap();
        assert_eq!(zero.duration, None);
    }

    #[test]
    fn unknown_action_is_rejected() {
        assert!(serde_json::from_str::<IncidentAction>(r#"{"action":"reopen"}"#).is_err());
    }

    #[test]
    fn incident_duration_from_micros() {
        let incident = Incident {
            id: 1,
            channel_id: "C1".into(),
            service: "X".into(),
            alert: "down".into(),
            priority: None,
            open_ts: SlackTs::parse("100.0").unwrap(),
            close_ts: Some(SlackTs::parse("160.5").unwrap()),
            duration_us: Some(60_500_000),
        };
        assert!(!incident.is_open());
        assert_eq!(incident.duration(), Some(Duration::from_millis(60_500)));
    }
}
