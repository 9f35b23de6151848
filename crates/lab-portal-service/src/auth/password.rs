//! 密码处理
//!
//! 提供密码哈希和验证功能

use bcrypt::{DEFAULT_COST, hash, verify};

use crate::error::PortalError;

/// 对密码进行哈希处理
///
/// 使用 bcrypt 算法生成密码哈希
pub fn hash_password(password: &str) -> Result<String, PortalError> {
    hash(password, DEFAULT_COST).map_err(|e| PortalError::Internal(format!("密码哈希失败: {}", e)))
}

/// 验证密码
///
/// 比较明文密码与存储的哈希值
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PortalError> {
    verify(password, hash).map_err(|e| PortalError::Internal(format!("密码验证失败: {}", e)))
}
