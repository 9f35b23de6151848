//! HTTP 请求处理器模块

pub mod announcement;
pub mod auth;
pub mod computer;
pub mod feedback;
pub mod lab;
pub mod reservation;
pub mod resource;
pub mod sitin;
pub mod stats;
pub mod student;

use crate::auth::Claims;
use crate::error::{PortalError, Result};

/// 校验调用者是管理员
pub(crate) fn require_admin(claims: &Claims) -> Result<()> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(PortalError::Forbidden("该操作仅限管理员".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;

    fn claims_with_role(role: UserRole) -> Claims {
        Claims {
            sub: "1".to_string(),
            username: "u".to_string(),
            id_number: "2021-0001".to_string(),
            role,
            iat: 0,
            exp: i64::MAX,
            iss: "lab-portal-service".to_string(),
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&claims_with_role(UserRole::Admin)).is_ok());
        assert!(require_admin(&claims_with_role(UserRole::Student)).is_err());
    }
}
