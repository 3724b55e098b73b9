//! Source URL template with a single `{0}` substitution point.

use std::fmt;

const PLACEHOLDER: &str = "{0}";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("URL template has no {{0}} placeholder: {0}")]
    MissingPlaceholder(String),
    #[error("URL template has more than one {{0}} placeholder: {0}")]
    MultiplePlaceholders(String),
    #[error("URL template does not render to a valid http(s) URL: {0}")]
    InvalidUrl(String),
}

/// A URL with exactly one `{0}` where the relative file path goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    prefix: String,
    suffix: String,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let template = template.trim();
        let mut parts = template.split(PLACEHOLDER);
        let prefix = parts.next().unwrap_or_default();
        let Some(suffix) = parts.next() else {
            return Err(TemplateError::MissingPlaceholder(template.to_string()));
        };
        if parts.next().is_some() {
            return Err(TemplateError::MultiplePlaceholders(template.to_string()));
        }
        let parsed = Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        };

        match url::Url::parse(&parsed.render("check/file.bin")) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(parsed),
            _ => Err(TemplateError::InvalidUrl(template.to_string())),
        }
    }

    /// Accept either a ready template or a presigned URL whose `*` marks the
    /// file path (the form sent in the download email).
    pub fn from_presigned(url: &str) -> Result<Self, TemplateError> {
        if url.contains(PLACEHOLDER) {
            return Self::parse(url);
        }
        Self::parse(&url.replace('*', PLACEHOLDER))
    }

    pub fn render(&self, relative_path: &str) -> String {
        format!("{}{}{}", self.prefix, relative_path, self.suffix)
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, PLACEHOLDER, self.suffix)
    }
}
