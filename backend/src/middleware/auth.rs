//! Authentication middleware
//!
//! JWT authentication and permission checks. The token carries the tenant the
//! user acts for; handlers turn it into a [`crate::tenant::TenantScope`].

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific permission
    pub fn has_permission(&self, resource: &str, action: &str) -> bool {
        let permission = format!("{}:{}", resource, action);
        self.permissions.iter().any(|p| *p == permission || *p == format!("{}:*", resource))
    }

    /// Check if user has any of the specified permissions
    pub fn has_any_permission(&self, perms: &[(&str, &str)]) -> bool {
        perms.iter().any(|(r, a)| self.has_permission(r, a))
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub tenant_id: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Sign the claims with HS256
    pub fn encode(&self, secret: &str) -> AppResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        AppError::InvalidToken
    })
}

fn unauthorized(message: &str, message_es: &str) -> AppError {
    AppError::Unauthorized {
        message: message.to_string(),
        message_es: message_es.to_string(),
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &request) {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

fn authenticate(state: &AppState, request: &Request) -> AppResult<AuthUser> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| {
            unauthorized(
                "Missing or invalid Authorization header",
                "Falta el encabezado de autorización",
            )
        })?;

    let claims = decode_jwt(token, &state.config.jwt.secret)?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| unauthorized("Invalid user ID in token", "ID de usuario no válido"))?;
    let tenant_id = Uuid::parse_str(&claims.tenant_id)
        .map_err(|_| unauthorized("Invalid tenant ID in token", "ID de empresa no válido"))?;

    Ok(AuthUser {
        user_id,
        tenant_id,
        permissions: claims.permissions,
    })
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| unauthorized("Authentication required", "Debe iniciar sesión"))
    }
}

/// Permission guard for use in handlers
pub fn check_permission(user: &AuthUser, resource: &str, action: &str) -> AppResult<()> {
    if user.has_permission(resource, action) {
        Ok(())
    } else {
        tracing::debug!(
            user_id = %user.user_id,
            "Permission denied: requires {}:{}",
            resource,
            action
        );
        Err(AppError::InsufficientPermissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(permissions: &[&str]) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_exact_permission() {
        let u = user(&["transfers:dispatch"]);
        assert!(check_permission(&u, "transfers", "dispatch").is_ok());
        assert!(check_permission(&u, "transfers", "receive").is_err());
    }

    #[test]
    fn test_wildcard_permission() {
        let u = user(&["transfers:*"]);
        assert!(u.has_permission("transfers", "cancel"));
        assert!(!u.has_permission("stock", "adjust"));
        assert!(u.has_any_permission(&[("stock", "adjust"), ("transfers", "read")]));
    }

    #[test]
    fn test_token_roundtrip() {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            tenant_id: Uuid::new_v4().to_string(),
            permissions: vec!["transfers:read".to_string()],
            exp: now + 3600,
            iat: now,
        };
        let token = claims.encode("test-secret").unwrap();

        let decoded = decode_jwt(&token, "test-secret").unwrap();
        assert_eq!(decoded.tenant_id, claims.tenant_id);
        assert!(matches!(decode_jwt(&token, "other-secret"), Err(AppError::InvalidToken)));
    }
}
