//! Usage reconciliation when the upstream under-reports

use tollway_core::Usage;

use crate::error::RelayError;
use crate::tokenizer::count_text_tokens;

/// Completion tokens charged per structured tool call
///
/// The name and argument text of a call undercounts what the upstream bills
/// for the surrounding structure.
pub const TOOL_CALL_TOKEN_COST: u32 = 7;

/// Whether upstream-reported usage can be trusted as-is
pub const fn is_valid(usage: &Usage) -> bool {
    (usage.prompt_tokens != 0 && usage.completion_tokens != 0) || usage.total_tokens != 0
}

/// Usage for generated `text` on top of an already-counted prompt
pub fn response_text_to_usage(text: &str, model: &str, prompt_tokens: u32) -> Usage {
    Usage::new(prompt_tokens, count_text_tokens(text, model))
}

/// Usage for a stream whose upstream never reported any
pub fn reconcile_stream(text: &str, model: &str, prompt_tokens: u32, tool_calls: usize) -> Usage {
    let base = response_text_to_usage(text, model, prompt_tokens);
    let surcharge = u32::try_from(tool_calls)
        .unwrap_or(u32::MAX)
        .saturating_mul(TOOL_CALL_TOKEN_COST);

    Usage::new(base.prompt_tokens, base.completion_tokens.saturating_add(surcharge))
}

/// Whether buffered usage must be recomputed from the response content
pub fn needs_recount(reported: Option<&Usage>) -> bool {
    reported.is_none_or(|u| u.total_tokens == 0 || (u.prompt_tokens == 0 && u.completion_tokens == 0))
}

/// Final usage for a buffered response
///
/// Reported usage is kept when complete. Otherwise completion tokens are
/// counted from each choice's text and the pre-counted prompt is used.
///
/// # Errors
///
/// Returns [`RelayError::ZeroUsage`] when the recount still finds nothing to bill.
pub fn reconcile_buffered(
    reported: Option<Usage>,
    choice_texts: &[String],
    model: &str,
    prompt_tokens: u32,
) -> Result<Usage, RelayError> {
    if let Some(usage) = reported.filter(|u| !needs_recount(Some(u))) {
        return Ok(usage);
    }

    let completion_tokens = choice_texts
        .iter()
        .map(|text| count_text_tokens(text, model))
        .fold(0_u32, u32::saturating_add);

    if completion_tokens == 0 {
        tracing::warn!(model, "completion tokens still zero after recount");
        return Err(RelayError::ZeroUsage);
    }

    Ok(Usage::new(prompt_tokens, completion_tokens))
}
