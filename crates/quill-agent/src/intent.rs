//! Keyword-based intent classification.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Categorical intent of the user's latest message.
///
/// Classification always resolves to exactly one value; there is no error
/// state. Anything unrecognized is [`Intent::General`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// The user is asking for help or support.
    HelpRequest,
    /// The user is asking about an order.
    OrderInquiry,
    /// Everything else.
    #[default]
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::HelpRequest => "help_request",
            Intent::OrderInquiry => "order_inquiry",
            Intent::General => "general",
        }
    }
}

/// Ordered trigger lists; the first matching category wins.
const TRIGGERS: &[(Intent, &[&str])] = &[
    (Intent::HelpRequest, &["help", "помощь"]),
    (Intent::OrderInquiry, &["order", "заказ"]),
];

const PREVIEW_LEN: usize = 50;

/// Classifies the text of the routing message into an [`Intent`].
///
/// Deterministic substring matching, side-effect free, infallible.
pub fn classify(text: &str) -> Intent {
    let intent = TRIGGERS
        .iter()
        .find(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(intent, _)| *intent)
        .unwrap_or_default();

    debug!(
        input_len = text.len(),
        preview = %preview(text),
        intent = intent.as_str(),
        "classified intent"
    );

    intent
}

/// Length-capped preview of classifier input, safe for span attributes.
pub(crate) fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_LEN).collect()
}
