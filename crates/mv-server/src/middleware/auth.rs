//! Bearer token authentication.
//!
//! Resolves `Authorization: Bearer <token>` against unexpired rows in
//! `auth_tokens` and injects the owning [`UserId`] into request extensions.

use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use mv_core::UserId;
use mv_db::pool::DbPool;

use crate::context::AppContext;
use crate::error::AppError;

/// Pull the token out of an `Authorization` header value.
pub fn bearer_token(authorization: &str) -> Option<&str> {
    let token = authorization.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

/// Look a token up in the database. Returns `None` for unknown or expired tokens.
pub fn validate_token(db: &DbPool, token: &str) -> mv_core::Result<Option<UserId>> {
    let conn = mv_db::pool::get_conn(db)?;
    let now = Utc::now().to_rfc3339();
    let found = mv_db::queries::auth::get_valid_token(&conn, token, &now)?;
    Ok(found.map(|t| t.user_id))
}

/// Authentication middleware. Applied to protected routes only.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return Err(unauthorized("missing bearer token"));
    };

    let db = ctx.db.clone();
    let resolved = tokio::task::spawn_blocking(move || validate_token(&db, &token))
        .await
        .map_err(|e| {
            AppError::new(mv_core::Error::Internal(format!("spawn_blocking join error: {e}")))
                .into_response()
        })?
        .map_err(|e| AppError::new(e).into_response())?;

    match resolved {
        Some(user_id) => {
            request.extensions_mut().insert(user_id);
            Ok(next.run(request).await)
        }
        None => Err(unauthorized("invalid or expired token")),
    }
}

fn unauthorized(message: &str) -> Response {
    AppError::new(mv_core::Error::Unauthorized(message.into())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Bearer   "), None);
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn tokens_resolve_until_expiry() {
        let pool = mv_db::pool::init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let user = mv_db::queries::users::create_user(&conn, "dj", "member").unwrap();

        let future = (Utc::now() + Duration::hours(1)).to_rfc3339();
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        mv_db::queries::auth::create_token(&conn, user.id, "live", &future).unwrap();
        mv_db::queries::auth::create_token(&conn, user.id, "stale", &past).unwrap();
        drop(conn);

        assert_eq!(validate_token(&pool, "live").unwrap(), Some(user.id));
        assert_eq!(validate_token(&pool, "stale").unwrap(), None);
        assert_eq!(validate_token(&pool, "nope").unwrap(), None);
    }
}
