use serde::{Deserialize, Deserializer, Serialize};

/// Envelope the card gateway wraps both API responses and status webhooks in.
/// `content` is an object or an array of objects depending on the call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardEnvelope {
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardContent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(rename = "idOrderExt", default, deserialize_with = "lenient_string")]
    pub id_order_ext: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: Option<String>,
}

/// What a gateway status string means for local settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardSignal {
    Paid,
    Failed,
    Other,
}

impl CardSignal {
    pub fn from_status(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "captured" | "paid" | "completed" | "success" | "succeeded" => CardSignal::Paid,
            "failed" | "declined" | "canceled" | "cancelled" | "error" | "expired" => {
                CardSignal::Failed
            }
            _ => CardSignal::Other,
        }
    }
}

impl CardEnvelope {
    /// First content item, whether `content` is a single object or an array.
    pub fn first_content(&self) -> Option<CardContent> {
        match &self.content {
            serde_json::Value::Array(items) => items
                .first()
                .and_then(|item| CardContent::deserialize(item).ok()),
            item @ serde_json::Value::Object(_) => CardContent::deserialize(item).ok(),
            _ => None,
        }
    }
}

impl CardContent {
    /// Trimmed external order reference, if present.
    pub fn external_reference(&self) -> Option<&str> {
        self.id_order_ext
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }

    /// Gateway status lower-cased for storage and matching.
    pub fn normalized_status(&self) -> String {
        self.status
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }
}

// The gateway is inconsistent about quoting ids, so numbers are accepted too.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
