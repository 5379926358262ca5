//! Token counting keyed by model family

use std::sync::LazyLock;

use tiktoken_rs::CoreBPE;

/// Model name prefixes that use the `o200k_base` vocabulary
const O200K_PREFIXES: &[&str] = &["gpt-4o", "chatgpt-4o", "gpt-4.1", "gpt-4.5", "gpt-5", "o1", "o3", "o4"];

static O200K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| {
    tiktoken_rs::o200k_base()
        .inspect_err(|e| tracing::warn!(error = %e, "failed to load o200k_base tokenizer"))
        .ok()
});

static CL100K: LazyLock<Option<CoreBPE>> = LazyLock::new(|| {
    tiktoken_rs::cl100k_base()
        .inspect_err(|e| tracing::warn!(error = %e, "failed to load cl100k_base tokenizer"))
        .ok()
});

/// BPE vocabulary a model family is billed against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    O200kBase,
    Cl100kBase,
}

impl Encoding {
    /// Pick the vocabulary for a model name
    ///
    /// A `vendor/` prefix is ignored. Unknown families use `cl100k_base`.
    pub fn for_model(model: &str) -> Self {
        let name = model.rsplit('/').next().unwrap_or(model).to_ascii_lowercase();

        if O200K_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
            Self::O200kBase
        } else {
            Self::Cl100kBase
        }
    }

    fn bpe(self) -> Option<&'static CoreBPE> {
        match self {
            Self::O200kBase => O200K.as_ref(),
            Self::Cl100kBase => CL100K.as_ref(),
        }
    }
}

/// Count the tokens `text` costs under `model`'s tokenizer
///
/// Falls back to one token per four characters if the vocabulary failed to load.
pub fn count_text_tokens(text: &str, model: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let count = Encoding::for_model(model).bpe().map_or_else(
        || text.chars().count().div_ceil(4),
        |bpe| bpe.encode_with_special_tokens(text).len(),
    );

    u32::try_from(count).unwrap_or(u32::MAX)
}
