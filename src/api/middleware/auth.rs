use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use super::session::{SESSION_KEY_ROLE, SESSION_KEY_USER_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tourist,
    HotelOwner,
    Guide,
    Admin,
}

/// Authentication error responses
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    Forbidden,
    SessionError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            AuthError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required. Please log in.",
            )
                .into_response(),
            AuthError::Forbidden => {
                (StatusCode::FORBIDDEN, "Admin access required.").into_response()
            }
            AuthError::SessionError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Session error occurred.").into_response()
            }
        }
    }
}

/// Middleware that requires the user to be authenticated
pub async fn require_auth(
    session: Session,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user_id: Option<Uuid> = session
        .get(SESSION_KEY_USER_ID)
        .await
        .map_err(|_| AuthError::SessionError)?;

    if user_id.is_none() {
        return Err(AuthError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.role != Role::Admin {
            tracing::warn!(user_id = %self.user_id, role = ?self.role, "Admin route refused");
            return Err(AuthError::Forbidden);
        }
        Ok(())
    }
}

/// Extracts the authenticated user from the session. A missing role is
/// treated as a tourist.
pub async fn get_authenticated_user(session: &Session) -> Result<AuthenticatedUser, AuthError> {
    let user_id: Uuid = session
        .get(SESSION_KEY_USER_ID)
        .await
        .map_err(|_| AuthError::SessionError)?
        .ok_or(AuthError::Unauthorized)?;

    let role: Role = session
        .get(SESSION_KEY_ROLE)
        .await
        .map_err(|_| AuthError::SessionError)?
        .unwrap_or(Role::Tourist);

    Ok(AuthenticatedUser { user_id, role })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::HotelOwner).unwrap(), r#""hotel_owner""#);
        let role: Role = serde_json::from_str(r#""admin""#).unwrap();
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn test_require_admin() {
        let admin = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let guide = AuthenticatedUser {
            user_id: Uuid::new_v4(),
            role: Role::Guide,
        };

        assert!(admin.require_admin().is_ok());
        assert!(matches!(guide.require_admin(), Err(AuthError::Forbidden)));
    }
}
