//! Response strategy lookup.

use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// Sampling parameters passed through to the model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature in `[0, 1]`.
    pub temperature: f32,
}

/// Immutable response strategy: a system prompt plus sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Strategy {
    pub system_prompt: &'static str,
    pub parameters: SamplingParams,
}

const HELP: Strategy = Strategy {
    system_prompt: "You are a technical support assistant. Answer concisely and specifically.",
    parameters: SamplingParams { temperature: 0.3 },
};

const ORDER: Strategy = Strategy {
    system_prompt: "You are an order assistant. Help with order information.",
    parameters: SamplingParams { temperature: 0.5 },
};

const GENERAL: Strategy = Strategy {
    system_prompt: "You are a friendly assistant. Communicate casually.",
    parameters: SamplingParams { temperature: 0.7 },
};

impl Strategy {
    /// Returns the strategy for an intent.
    ///
    /// Total: every intent maps to a strategy, and [`Strategy::default`]
    /// backs anything not explicitly listed.
    pub fn for_intent(intent: Intent) -> Strategy {
        match intent {
            Intent::HelpRequest => HELP,
            Intent::OrderInquiry => ORDER,
            Intent::General => GENERAL,
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        GENERAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_total() {
        for intent in [Intent::HelpRequest, Intent::OrderInquiry, Intent::General] {
            let s = Strategy::for_intent(intent);
            assert!(!s.system_prompt.is_empty());
            assert!((0.0..=1.0).contains(&s.parameters.temperature));
        }
    }

    #[test]
    fn test_help_strategy_prompt() {
        let s = Strategy::for_intent(Intent::HelpRequest);
        assert!(s.system_prompt.contains("support"));
        assert_eq!(s.parameters.temperature, 0.3);
    }

    #[test]
    fn test_default_matches_general() {
        assert_eq!(Strategy::default(), Strategy::for_intent(Intent::General));
    }
}
