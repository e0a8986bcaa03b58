use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::utils::error::AppError;

/// Set by the authenticating gateway in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub const ADMIN_ROLE: &str = "admin";

/// The caller, as asserted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub role: Option<String>,
}

impl AuthenticatedUser {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let user_id = header_str(headers, USER_ID_HEADER)
            .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))?;

        Ok(Self {
            user_id: user_id.to_string(),
            role: header_str(headers, USER_ROLE_HEADER).map(str::to_string),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE))
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Administrator access required".to_string(),
            ))
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

/// An [`AuthenticatedUser`] holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_headers(&parts.headers)?;
        user.require_admin()?;
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_missing_user_is_unauthenticated() {
        let err = AuthenticatedUser::from_headers(&headers(&[])).unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));

        let err = AuthenticatedUser::from_headers(&headers(&[(USER_ID_HEADER, "  ")])).unwrap_err();
        assert!(matches!(err, AppError::AuthError(_)));
    }

    #[test]
    fn test_user_and_role_are_read() {
        let user = AuthenticatedUser::from_headers(&headers(&[
            (USER_ID_HEADER, "user-42"),
            (USER_ROLE_HEADER, "Admin"),
        ]))
        .unwrap();
        assert_eq!(user.user_id, "user-42");
        assert!(user.is_admin());
        assert!(user.require_admin().is_ok());
    }

    #[test]
    fn test_non_admin_is_forbidden() {
        let user =
            AuthenticatedUser::from_headers(&headers(&[(USER_ID_HEADER, "user-42")])).unwrap();
        assert!(matches!(user.require_admin(), Err(AppError::Forbidden(_))));
    }
}
