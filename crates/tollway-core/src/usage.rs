use serde::{Deserialize, Serialize};

use crate::de::null_as_default;

/// Token usage statistics attached to a relayed request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    #[serde(default, deserialize_with = "null_as_default")]
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_tokens: u32,
}

impl Usage {
    /// Build a record whose total is the sum of its parts
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Usage for a request that only consumed prompt tokens
    pub const fn prompt_only(prompt_tokens: u32) -> Self {
        Self::new(prompt_tokens, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sums_total() {
        let usage = Usage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn missing_fields_deserialize_as_zero() {
        let usage: Usage = serde_json::from_str(r#"{"total_tokens":5}"#).unwrap();
        assert_eq!(usage, Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 5,
        });
    }

    #[test]
    fn null_fields_deserialize_as_zero() {
        let usage: Usage =
            serde_json::from_str(r#"{"prompt_tokens":null,"completion_tokens":3,"total_tokens":null}"#).unwrap();
        assert_eq!(usage.completion_tokens, 3);
        assert_eq!(usage.prompt_tokens, 0);
        assert_eq!(usage.total_tokens, 0);
    }
}
