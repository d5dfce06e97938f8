use crate::error::AppError;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Teacher,
    Admin,
    HeadAdmin,
}

impl Role {
    pub fn can_manage_timetable(&self) -> bool {
        matches!(self, Role::Admin | Role::HeadAdmin)
    }

    /// Reads the caller's role from the request headers.
    pub fn from_headers(headers: &HeaderMap) -> Result<Role, AppError> {
        let raw = headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", ROLE_HEADER)))?;
        raw.parse()
    }

    /// Fails unless the role may change timetables.
    pub fn require_manager(headers: &HeaderMap) -> Result<Role, AppError> {
        let role = Role::from_headers(headers)?;
        if role.can_manage_timetable() {
            Ok(role)
        } else {
            Err(AppError::Forbidden(format!(
                "role {:?} may not modify timetables",
                role
            )))
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            "head_admin" | "headadmin" => Ok(Role::HeadAdmin),
            other => Err(AppError::Unauthorized(format!("unknown role '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn only_admins_manage_timetables() {
        let mut headers = HeaderMap::new();
        headers.insert(ROLE_HEADER, HeaderValue::from_static("head-admin"));
        assert_eq!(Role::require_manager(&headers).unwrap(), Role::HeadAdmin);

        headers.insert(ROLE_HEADER, HeaderValue::from_static("teacher"));
        assert!(matches!(
            Role::require_manager(&headers),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn missing_or_unknown_role_is_unauthorized() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            Role::from_headers(&headers),
            Err(AppError::Unauthorized(_))
        ));
        headers.insert(ROLE_HEADER, HeaderValue::from_static("janitor"));
        assert!(matches!(
            Role::from_headers(&headers),
            Err(AppError::Unauthorized(_))
        ));
    }
}
