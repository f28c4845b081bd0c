//! Action types the CRM knows how to dispatch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::DispatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    SendSms,
    AddTag,
    RemoveTag,
    UpdateField,
    CreateTask,
    CallWebhook,
    CustomCode,
    CreateDeal,
    UpdateDeal,
}

impl ActionType {
    pub const ALL: [ActionType; 10] = [
        Self::SendEmail,
        Self::SendSms,
        Self::AddTag,
        Self::RemoveTag,
        Self::UpdateField,
        Self::CreateTask,
        Self::CallWebhook,
        Self::CustomCode,
        Self::CreateDeal,
        Self::UpdateDeal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail   => "send_email",
            Self::SendSms     => "send_sms",
            Self::AddTag      => "add_tag",
            Self::RemoveTag   => "remove_tag",
            Self::UpdateField => "update_field",
            Self::CreateTask  => "create_task",
            Self::CallWebhook => "call_webhook",
            Self::CustomCode  => "custom_code",
            Self::CreateDeal  => "create_deal",
            Self::UpdateDeal  => "update_deal",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical spelling of an action type. The editor emits both `send_email`
/// and `send-email`; every lookup goes through this.
pub fn normalize(action_type: &str) -> String {
    action_type.trim().replace('-', "_")
}

impl FromStr for ActionType {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| DispatchError::UnknownAction(s.to_owned()))
    }
}
