use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::{AppError, AppResult};

/// Header carrying the authenticated user id, set by the upstream gateway
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

impl Caller {
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Fails unless the caller is acting on their own data
    pub fn ensure_is(&self, user_id: &str) -> AppResult<()> {
        if self.0 == user_id {
            Ok(())
        } else {
            tracing::warn!(caller = %self.0, user_id = %user_id, "Identity mismatch");
            Err(AppError::Authorization(
                "cannot act on behalf of another user".to_string(),
            ))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| Caller(id.to_string()))
            .ok_or_else(|| AppError::Unauthenticated(format!("missing {} header", USER_ID_HEADER)))
    }
}
