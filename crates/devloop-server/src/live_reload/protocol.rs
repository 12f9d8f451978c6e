//! Control channel messages.
//!
//! Both directions are JSON objects tagged by an `action` field.

use serde::{Deserialize, Serialize};

use super::session::BrowserEntry;

/// Command sent from the server to browsers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub(crate) enum ServerCommand {
    /// Reload the current page.
    Reload,
    /// Navigate to `url`.
    Navigate { url: String },
    /// Updated list of remote browsers, for the boss.
    Browsers {
        #[serde(rename = "browserList")]
        browser_list: Vec<BrowserEntry>,
    },
    /// Attach the remote console for `jsid`.
    JsConsole { jsid: String },
}

impl ServerCommand {
    /// Serialize to a text frame.
    pub(crate) fn to_frame(&self) -> String {
        // Plain structs of strings; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Message received from a browser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ClientMessage {
    /// Browser announces its id.
    Register { jsid: String },
    /// Ask `jsid` to attach its remote console.
    JsConsole { jsid: String },
    /// Well-formed message with an unrecognised action.
    Unknown { action: String },
}

/// Malformed control message.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ProtocolError {
    #[error("Invalid control message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Control message `{action}` is missing `jsid`")]
    MissingJsid { action: String },
}

#[derive(Deserialize)]
struct RawMessage {
    action: String,
    #[serde(default)]
    jsid: Option<String>,
}

impl ClientMessage {
    /// Parse a text frame.
    pub(crate) fn parse(text: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(text)?;
        let jsid = |action: &str| {
            raw.jsid.clone().ok_or_else(|| ProtocolError::MissingJsid {
                action: action.to_owned(),
            })
        };

        match raw.action.as_str() {
            "register" => Ok(Self::Register {
                jsid: jsid("register")?,
            }),
            "jsConsole" => Ok(Self::JsConsole {
                jsid: jsid("jsConsole")?,
            }),
            _ => Ok(Self::Unknown { action: raw.action }),
        }
    }
}
