use serde_json::Value;

use crate::fetch::Fetcher;

impl Fetcher {
    /// Replace remote `image_url` parts in message content with data URLs
    ///
    /// Only array content is touched. URLs on the direct-fetch list are left
    /// for the upstream to download, as is any image that fails to fetch.
    /// Returns how many parts were inlined.
    pub async fn inline_remote_images(&self, content: &mut Value) -> usize {
        if !self.config().base64_enabled {
            return 0;
        }

        let Some(parts) = content.as_array_mut() else {
            return 0;
        };

        let mut inlined = 0;

        for part in parts {
            if part.get("type").and_then(Value::as_str) != Some("image_url") {
                continue;
            }

            let Some(slot) = part.pointer_mut("/image_url/url") else {
                continue;
            };
            let Some(url) = slot.as_str().filter(|url| self.should_inline(url)) else {
                continue;
            };

            match self.fetch_image_base64(url).await {
                Ok((mime, data)) => {
                    *slot = Value::String(format!("data:{mime};base64,{data}"));
                    inlined += 1;
                }
                Err(e) => tracing::warn!(error = %e, url, "failed to inline remote image"),
            }
        }

        inlined
    }

    fn should_inline(&self, url: &str) -> bool {
        (url.starts_with("http://") || url.starts_with("https://")) && !self.config().is_direct_fetch_domain(url)
    }
}
