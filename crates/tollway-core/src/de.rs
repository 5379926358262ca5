use serde::{Deserialize, Deserializer};

/// Deserialize a field, reading an explicit `null` as the type's default
///
/// Pair with `#[serde(default)]` so an absent field is tolerated too.
///
/// # Errors
///
/// Returns the underlying error when the value is present but malformed
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
