// common/src/messages.rs
use actix::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::intercept::InterceptConfiguration;

/// Control message sent by the trusted main frame.
///
/// Wire format is the JSON the bootstrap posts, e.g.
/// `{"type":"SET_ACTIVE_APP","appName":"adguard-home","needsRewrite":true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Message)]
#[rtype(result = "ControlAck")]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    #[serde(rename_all = "camelCase")]
    SetActiveApp {
        app_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        needs_rewrite: Option<bool>,
    },
    SetIntercepts {
        config: Option<InterceptConfiguration>,
    },
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::SetActiveApp { .. } => "SET_ACTIVE_APP",
            ControlMessage::SetIntercepts { .. } => "SET_INTERCEPTS",
        }
    }
}

/// Reply sent once a control message has been applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlAck {
    /// Always `"ACK"`
    #[serde(rename = "type")]
    pub kind: String,
    /// The message type that was applied
    pub request: String,
    pub app_name: Option<String>,
    pub needs_rewrite: bool,
}

impl ControlAck {
    pub fn new(request: &str, app_name: Option<String>, needs_rewrite: bool) -> Self {
        Self {
            kind: "ACK".to_string(),
            request: request.to_string(),
            app_name,
            needs_rewrite,
        }
    }
}
