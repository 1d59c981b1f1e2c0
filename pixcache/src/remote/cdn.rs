//! CDN URL construction.
//!
//! The CDN account and variant naming live outside the cache; all the cache
//! needs is a pure `(id, variant) -> url` mapping.

use super::RemoteError;

/// Placeholder replaced with the CDN image id.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Placeholder replaced with the variant name.
pub const VARIANT_PLACEHOLDER: &str = "{variant}";

/// Builds delivery URLs for CDN-hosted images.
pub trait CdnUrlResolver: Send + Sync {
    /// URL for `cdn_id` at `variant`. Never performs I/O.
    fn url_for(&self, cdn_id: &str, variant: &str) -> String;
}

/// Resolver driven by a URL template such as
/// `https://imagedelivery.net/<account>/{id}/{variant}`.
#[derive(Debug, Clone)]
pub struct TemplateCdnResolver {
    template: String,
}

impl TemplateCdnResolver {
    /// Create a resolver. The template must contain `{id}`.
    ///
    /// A template without `{variant}` serves every variant from the same URL.
    pub fn new(template: impl Into<String>) -> Result<Self, RemoteError> {
        let template = template.into();
        if !template.contains(ID_PLACEHOLDER) {
            return Err(RemoteError::InvalidTemplate(template));
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

impl CdnUrlResolver for TemplateCdnResolver {
    fn url_for(&self, cdn_id: &str, variant: &str) -> String {
        self.template
            .replace(ID_PLACEHOLDER, cdn_id)
            .replace(VARIANT_PLACEHOLDER, variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_substitution() {
        let resolver =
            TemplateCdnResolver::new("https://imagedelivery.net/acct/{id}/{variant}").unwrap();

        assert_eq!(
            resolver.url_for("abc", "medium"),
            "https://imagedelivery.net/acct/abc/medium"
        );
    }

    #[test]
    fn test_template_without_variant() {
        let resolver = TemplateCdnResolver::new("https://cdn.test/{id}.jpg").unwrap();

        assert_eq!(resolver.url_for("abc", "thumbnail"), "https://cdn.test/abc.jpg");
    }

    #[test]
    fn test_template_requires_id() {
        assert!(matches!(
            TemplateCdnResolver::new("https://cdn.test/{variant}"),
            Err(RemoteError::InvalidTemplate(_))
        ));
    }
}
