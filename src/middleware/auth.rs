use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{AuthError, AuthUser};
use crate::response::{json_error, AppError};
use crate::services::{ServiceError, ServiceResult};
use crate::state::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = crate::auth::extract_token(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "missing authentication token")
            .into_response();
    };

    let secret = state.config().jwt_secret.as_deref();
    match crate::auth::verify_request_token(state.db(), secret, &token).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(AuthError::MissingSecret) => {
            tracing::error!("JWT_SECRET is not configured; rejecting authenticated request");
            AppError::service_unavailable("authentication is not configured").into_response()
        }
        Err(AuthError::Database(err)) => {
            tracing::error!(error = %err, "user lookup failed during authentication");
            AppError::service_unavailable("authentication backend unavailable").into_response()
        }
        Err(_) => json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "authentication failed")
            .into_response(),
    }
}

/// Manager-only guard, applied inside handlers that already passed `require_auth`.
pub fn ensure_manager(user: &AuthUser) -> ServiceResult<()> {
    if user.is_manager() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("manager role required".to_string()))
    }
}

/// Managers may read anyone; learners only themselves.
pub fn ensure_manager_or_self(user: &AuthUser, target_user_id: &str) -> ServiceResult<()> {
    if user.is_manager() || user.id == target_user_id {
        Ok(())
    } else {
        Err(ServiceError::Forbidden("not allowed to view this learner".to_string()))
    }
}
