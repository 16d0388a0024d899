//! Catalog authentication.

use reqwest::RequestBuilder;

/// Credentials attached to catalog requests.
///
/// The [`Debug`] impl redacts the token.
#[derive(Clone)]
pub enum CatalogCredentials {
    /// Static bearer token.
    Bearer { token: String },
    /// No authentication header.
    Anonymous,
}

impl std::fmt::Debug for CatalogCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// Applies credentials to outgoing requests.
#[derive(Debug, Clone)]
pub struct CatalogAuth {
    credentials: CatalogCredentials,
}

impl CatalogAuth {
    #[must_use]
    pub fn new(credentials: CatalogCredentials) -> Self {
        Self { credentials }
    }

    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(CatalogCredentials::Bearer {
            token: token.into(),
        })
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(CatalogCredentials::Anonymous)
    }

    /// Add the authorization header, if any.
    #[must_use]
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            CatalogCredentials::Bearer { token } => builder.bearer_auth(token),
            CatalogCredentials::Anonymous => builder,
        }
    }
}
