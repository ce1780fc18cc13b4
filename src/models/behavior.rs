use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

/// Kind of interaction a user had with a catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    View,
    Like,
    Attend,
    Purchase,
    Save,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::View,
        ActionType::Like,
        ActionType::Attend,
        ActionType::Purchase,
        ActionType::Save,
    ];

    /// Actions used as co-occurrence signal for collaborative filtering
    pub const HIGH_VALUE: [ActionType; 3] =
        [ActionType::Purchase, ActionType::Attend, ActionType::Like];

    /// Actions that place the user at an event's location
    pub const PRESENCE: [ActionType; 2] = [ActionType::Purchase, ActionType::Attend];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::View => "view",
            ActionType::Like => "like",
            ActionType::Attend => "attend",
            ActionType::Purchase => "purchase",
            ActionType::Save => "save",
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "view" => Ok(ActionType::View),
            "like" => Ok(ActionType::Like),
            "attend" => Ok(ActionType::Attend),
            "purchase" => Ok(ActionType::Purchase),
            "save" => Ok(ActionType::Save),
            other => Err(format!("unknown action_type '{}'", other)),
        }
    }
}

/// A single logged user action. Never mutated once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BehaviorEvent {
    pub id: Uuid,
    pub user_id: String,
    pub target_id: String,
    pub action_type: ActionType,
    pub metadata: serde_json::Value,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Validated event ready to be appended to the behavior store
#[derive(Debug, Clone, PartialEq)]
pub struct NewBehaviorEvent {
    pub user_id: String,
    pub target_id: String,
    pub action_type: ActionType,
    pub metadata: serde_json::Value,
    pub session_id: Option<String>,
}

impl NewBehaviorEvent {
    pub fn new(user_id: impl Into<String>, target_id: impl Into<String>, action: ActionType) -> Self {
        Self {
            user_id: user_id.into(),
            target_id: target_id.into(),
            action_type: action,
            metadata: serde_json::Value::Null,
            session_id: None,
        }
    }
}

/// Sort order for behavior queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BehaviorOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filter passed to [`crate::db::BehaviorStore::query_events`]
#[derive(Debug, Clone, Default)]
pub struct BehaviorQuery {
    pub user_id: Option<String>,
    pub user_ids: Vec<String>,
    pub target_ids: Vec<String>,
    pub actions: Vec<ActionType>,
    pub exclude_user: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub order: BehaviorOrder,
}

impl BehaviorQuery {
    pub fn for_user(user_id: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            ..Default::default()
        }
    }

    pub fn for_users(user_ids: Vec<String>) -> Self {
        Self {
            user_ids,
            ..Default::default()
        }
    }

    pub fn actions(mut self, actions: &[ActionType]) -> Self {
        self.actions = actions.to_vec();
        self
    }

    pub fn order(mut self, order: BehaviorOrder) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether an event satisfies every populated filter
    pub fn matches(&self, event: &BehaviorEvent) -> bool {
        if let Some(user_id) = &self.user_id {
            if &event.user_id != user_id {
                return false;
            }
        }
        if !self.user_ids.is_empty() && !self.user_ids.contains(&event.user_id) {
            return false;
        }
        if let Some(excluded) = &self.exclude_user {
            if &event.user_id == excluded {
                return false;
            }
        }
        if !self.target_ids.is_empty() && !self.target_ids.contains(&event.target_id) {
            return false;
        }
        if !self.actions.is_empty() && !self.actions.contains(&event.action_type) {
            return false;
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}
