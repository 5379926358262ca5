//! Field-order-preserving edits to buffered upstream responses
//!
//! Some upstream clients compare response bodies field by field, so edits
//! never round-trip through an unordered map: the object is split into raw
//! key/value pairs, the targeted entries are changed, and the pairs are
//! written back in their original order.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::value::RawValue;

/// Model whose prompt token count is overwritten with the gateway's own
const PROMPT_OVERRIDE_MODEL: &str = "gpt-4o-2024-08-06";
/// Substring marking the family whose filter diagnostics are stripped
const STRIP_FILTER_FAMILY: &str = "o1";

/// Errors from decoding or re-encoding a patched body
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    /// The body is not a JSON object
    #[error("unmarshal_response_body_to_map_failed: {0}")]
    NotAnObject(#[source] serde_json::Error),

    /// `choices` is present but not an array of objects
    #[error("unmarshal_choices_failed: {0}")]
    Choices(#[source] serde_json::Error),

    /// `usage` is present but not an object
    #[error("unmarshal_usage_failed: {0}")]
    Usage(#[source] serde_json::Error),

    /// An edited value could not be written back
    #[error("marshal_patched_body_failed: {0}")]
    Encode(#[source] serde_json::Error),
}

/// JSON object as an ordered list of keys and unparsed values
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct OrderedObject(IndexMap<String, Box<RawValue>>);

impl OrderedObject {
    /// Split a JSON object into its raw fields
    ///
    /// # Errors
    ///
    /// Returns an error when `json` is not a JSON object
    pub fn parse(json: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(json)
    }

    /// Raw value stored under `key`
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key).map(AsRef::as_ref)
    }

    /// Remove `key`, keeping the order of everything else
    pub fn remove(&mut self, key: &str) -> Option<Box<RawValue>> {
        self.0.shift_remove(key)
    }

    /// Store a raw value; an existing key keeps its position
    pub fn insert(&mut self, key: impl Into<String>, value: Box<RawValue>) {
        self.0.insert(key.into(), value);
    }

    /// Keys in serialization order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Write the fields back as a JSON object, in order
    ///
    /// # Errors
    ///
    /// Returns an error if a key cannot be encoded
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut out = String::from("{");
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(&serde_json::to_string(key)?);
            out.push(':');
            out.push_str(value.get());
        }
        out.push('}');
        Ok(out)
    }

    fn to_raw(&self) -> Result<Box<RawValue>, serde_json::Error> {
        RawValue::from_string(self.to_json()?)
    }
}

/// Edit applied to a buffered response for a given upstream model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchRule {
    /// Drop `choices[].content_filter_results` and `prompt_filter_results`
    StripFilterResults,
    /// Replace `usage.prompt_tokens` with the gateway-counted value
    OverridePromptTokens(u32),
}

impl PatchRule {
    /// Rule for `model`, if any applies
    pub fn for_model(model: &str, prompt_tokens: u32) -> Option<Self> {
        if model.contains(STRIP_FILTER_FAMILY) {
            Some(Self::StripFilterResults)
        } else if model == PROMPT_OVERRIDE_MODEL {
            Some(Self::OverridePromptTokens(prompt_tokens))
        } else {
            None
        }
    }

    /// Apply the rule to a JSON object body
    ///
    /// # Errors
    ///
    /// Returns an error when the body or a targeted field has the wrong shape
    pub fn apply(self, body: &[u8]) -> Result<Vec<u8>, PatchError> {
        let mut object = OrderedObject::parse(body).map_err(PatchError::NotAnObject)?;

        match self {
            Self::StripFilterResults => strip_filter_results(&mut object)?,
            Self::OverridePromptTokens(prompt_tokens) => override_prompt_tokens(&mut object, prompt_tokens)?,
        }

        object.to_json().map(String::into_bytes).map_err(PatchError::Encode)
    }
}

/// Patch a buffered response body for `model`
///
/// Bodies for models without a rule come back borrowed and byte-identical.
///
/// # Errors
///
/// Returns an error when a matching rule cannot be applied
pub fn apply_patch<'a>(body: &'a [u8], model: &str, prompt_tokens: u32) -> Result<Cow<'a, [u8]>, PatchError> {
    let Some(rule) = PatchRule::for_model(model, prompt_tokens) else {
        return Ok(Cow::Borrowed(body));
    };

    let patched = rule.apply(body)?;

    match rule {
        PatchRule::StripFilterResults => {
            tracing::info!(model, "stripped content filter results from response");
        }
        PatchRule::OverridePromptTokens(prompt_tokens) => {
            tracing::info!(model, prompt_tokens, "overrode upstream prompt_tokens");
        }
    }

    Ok(Cow::Owned(patched))
}

fn strip_filter_results(object: &mut OrderedObject) -> Result<(), PatchError> {
    if let Some(raw) = object.get("choices") {
        let choices: Option<Vec<OrderedObject>> = serde_json::from_str(raw.get()).map_err(PatchError::Choices)?;

        if let Some(mut choices) = choices {
            let mut encoded = Vec::with_capacity(choices.len());
            for choice in &mut choices {
                choice.remove("content_filter_results");
                encoded.push(choice.to_json().map_err(PatchError::Encode)?);
            }

            let array = RawValue::from_string(format!("[{}]", encoded.join(","))).map_err(PatchError::Encode)?;
            object.insert("choices", array);
        }
    }

    object.remove("prompt_filter_results");
    Ok(())
}

fn override_prompt_tokens(object: &mut OrderedObject, prompt_tokens: u32) -> Result<(), PatchError> {
    let Some(raw) = object.get("usage") else {
        return Ok(());
    };

    let usage: Option<OrderedObject> = serde_json::from_str(raw.get()).map_err(PatchError::Usage)?;
    let Some(mut usage) = usage else {
        return Ok(());
    };

    let value = RawValue::from_string(prompt_tokens.to_string()).map_err(PatchError::Encode)?;
    usage.insert("prompt_tokens", value);

    object.insert("usage", usage.to_raw().map_err(PatchError::Encode)?);
    Ok(())
}
