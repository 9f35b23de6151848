//! 门户服务错误类型定义
//!
//! 包含所有 lab-portal-service 特有的错误类型

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// 门户服务错误类型
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    // 认证错误
    #[error("未授权: {0}")]
    Unauthorized(String),
    #[error("禁止访问: {0}")]
    Forbidden(String),
    #[error("学号或密码错误")]
    InvalidCredentials,
    #[error("账号已被停用")]
    UserDisabled,

    // 验证错误
    #[error("参数验证失败: {0}")]
    Validation(String),

    // 资源不存在
    #[error("用户不存在: {0}")]
    UserNotFound(i64),
    #[error("学号未注册: {0}")]
    IdNumberNotFound(String),
    #[error("实验室不存在: {0}")]
    LabNotFound(i64),
    #[error("设备不存在: {0}")]
    ComputerNotFound(i64),
    #[error("上机记录不存在: {0}")]
    SitinNotFound(i64),
    #[error("预约不存在: {0}")]
    ReservationNotFound(i64),
    #[error("公告不存在: {0}")]
    AnnouncementNotFound(i64),
    #[error("资源不存在: {0}")]
    ResourceNotFound(i64),

    // 业务错误
    #[error("上机额度已用完")]
    NoCreditsLeft,
    #[error("学生已有进行中的上机记录")]
    AlreadySittingIn,
    #[error("设备不可用: {0}")]
    ComputerUnavailable(String),
    #[error("所选时段与已有预约冲突")]
    ReservationConflict,
    #[error("所选时段不在实验室开放时间内")]
    OutsideLabSchedule,
    #[error("预约状态不允许该操作: 当前 {0}")]
    InvalidReservationState(String),
    #[error("上机记录已签退")]
    SitinAlreadyClosed,
    #[error("该上机记录已发放过奖励")]
    AlreadyRewarded,
    #[error("学号或用户名已注册: {0}")]
    DuplicateUser(String),
    #[error("实验室下仍有设备，无法删除")]
    LabHasComputers,

    // 系统错误
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("内部错误: {0}")]
    Internal(String),
}

impl PortalError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 认证错误
            Self::Unauthorized(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::UserDisabled => StatusCode::FORBIDDEN,

            Self::Validation(_) => StatusCode::BAD_REQUEST,

            Self::UserNotFound(_)
            | Self::IdNumberNotFound(_)
            | Self::LabNotFound(_)
            | Self::ComputerNotFound(_)
            | Self::SitinNotFound(_)
            | Self::ReservationNotFound(_)
            | Self::AnnouncementNotFound(_)
            | Self::ResourceNotFound(_) => StatusCode::NOT_FOUND,

            // 业务冲突类：请求合法但与当前状态冲突
            Self::NoCreditsLeft
            | Self::AlreadySittingIn
            | Self::ComputerUnavailable(_)
            | Self::ReservationConflict
            | Self::OutsideLabSchedule
            | Self::InvalidReservationState(_)
            | Self::SitinAlreadyClosed
            | Self::AlreadyRewarded
            | Self::DuplicateUser(_)
            | Self::LabHasComputers => StatusCode::CONFLICT,

            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::UserDisabled => "USER_DISABLED",

            Self::Validation(_) => "VALIDATION_ERROR",

            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::IdNumberNotFound(_) => "ID_NUMBER_NOT_FOUND",
            Self::LabNotFound(_) => "LAB_NOT_FOUND",
            Self::ComputerNotFound(_) => "COMPUTER_NOT_FOUND",
            Self::SitinNotFound(_) => "SITIN_NOT_FOUND",
            Self::ReservationNotFound(_) => "RESERVATION_NOT_FOUND",
            Self::AnnouncementNotFound(_) => "ANNOUNCEMENT_NOT_FOUND",
            Self::ResourceNotFound(_) => "RESOURCE_NOT_FOUND",

            Self::NoCreditsLeft => "NO_CREDITS_LEFT",
            Self::AlreadySittingIn => "ALREADY_SITTING_IN",
            Self::ComputerUnavailable(_) => "COMPUTER_UNAVAILABLE",
            Self::ReservationConflict => "RESERVATION_CONFLICT",
            Self::OutsideLabSchedule => "OUTSIDE_LAB_SCHEDULE",
            Self::InvalidReservationState(_) => "INVALID_RESERVATION_STATE",
            Self::SitinAlreadyClosed => "SITIN_ALREADY_CLOSED",
            Self::AlreadyRewarded => "ALREADY_REWARDED",
            Self::DuplicateUser(_) => "DUPLICATE_USER",
            Self::LabHasComputers => "LAB_HAS_COMPUTERS",

            Self::Database(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志，防止信息泄露
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for PortalError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 从 JSON 序列化错误转换
impl From<serde_json::Error> for PortalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON 处理错误: {}", err))
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, PortalError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    // ---- 辅助函数 ----

    /// 构造所有错误变体及其期望的 (StatusCode, error_code) 映射。
    /// 使用表驱动方式避免逐个变体写重复断言，同时保证新增变体时只需在一处维护。
    fn all_error_variants() -> Vec<(PortalError, StatusCode, &'static str)> {
        vec![
            // 认证 & 权限类
            (PortalError::Unauthorized("token expired".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (PortalError::Forbidden("admin only".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (PortalError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            (PortalError::UserDisabled, StatusCode::FORBIDDEN, "USER_DISABLED"),
            // 参数校验
            (PortalError::Validation("purpose is required".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            // 资源不存在类：前端依赖 404 做条件跳转
            (PortalError::UserNotFound(10), StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            (PortalError::IdNumberNotFound("2021-0001".into()), StatusCode::NOT_FOUND, "ID_NUMBER_NOT_FOUND"),
            (PortalError::LabNotFound(20), StatusCode::NOT_FOUND, "LAB_NOT_FOUND"),
            (PortalError::ComputerNotFound(30), StatusCode::NOT_FOUND, "COMPUTER_NOT_FOUND"),
            (PortalError::SitinNotFound(40), StatusCode::NOT_FOUND, "SITIN_NOT_FOUND"),
            (PortalError::ReservationNotFound(50), StatusCode::NOT_FOUND, "RESERVATION_NOT_FOUND"),
            (PortalError::AnnouncementNotFound(60), StatusCode::NOT_FOUND, "ANNOUNCEMENT_NOT_FOUND"),
            (PortalError::ResourceNotFound(70), StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),
            // 业务冲突类：409 表示请求合法但与当前状态冲突
            (PortalError::NoCreditsLeft, StatusCode::CONFLICT, "NO_CREDITS_LEFT"),
            (PortalError::AlreadySittingIn, StatusCode::CONFLICT, "ALREADY_SITTING_IN"),
            (PortalError::ComputerUnavailable("使用中".into()), StatusCode::CONFLICT, "COMPUTER_UNAVAILABLE"),
            (PortalError::ReservationConflict, StatusCode::CONFLICT, "RESERVATION_CONFLICT"),
            (PortalError::OutsideLabSchedule, StatusCode::CONFLICT, "OUTSIDE_LAB_SCHEDULE"),
            (PortalError::InvalidReservationState("REJECTED".into()), StatusCode::CONFLICT, "INVALID_RESERVATION_STATE"),
            (PortalError::SitinAlreadyClosed, StatusCode::CONFLICT, "SITIN_ALREADY_CLOSED"),
            (PortalError::AlreadyRewarded, StatusCode::CONFLICT, "ALREADY_REWARDED"),
            (PortalError::DuplicateUser("2021-0001".into()), StatusCode::CONFLICT, "DUPLICATE_USER"),
            (PortalError::LabHasComputers, StatusCode::CONFLICT, "LAB_HAS_COMPUTERS"),
            // 系统级错误：统一 500，防止内部实现细节泄露
            (PortalError::Internal("unexpected state".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ]
    }

    /// 每个错误变体都映射到正确的 HTTP 状态码。
    #[test]
    fn test_all_variants_status_code() {
        for (error, expected_status, label) in all_error_variants() {
            assert_eq!(
                error.status_code(),
                expected_status,
                "状态码不匹配: variant={label}"
            );
        }
    }

    /// 错误码是 API 契约的一部分，客户端用它做条件分支。
    #[test]
    fn test_all_variants_error_code() {
        for (error, _status, expected_code) in all_error_variants() {
            assert_eq!(
                error.error_code(),
                expected_code,
                "错误码不匹配: expected={expected_code}"
            );
        }
    }

    /// Display 输出直接作为 API 响应的 message 字段返回给用户，
    /// 必须包含关键上下文（如 ID、学号），否则用户无法定位问题。
    #[test]
    fn test_display_contains_context_for_parameterized_variants() {
        assert!(PortalError::Unauthorized("expired".into()).to_string().contains("expired"));
        assert!(PortalError::IdNumberNotFound("2021-0001".into()).to_string().contains("2021-0001"));
        assert!(PortalError::Validation("rating invalid".into()).to_string().contains("rating invalid"));
        assert!(PortalError::ComputerUnavailable("检修中".into()).to_string().contains("检修中"));
        assert!(PortalError::InvalidReservationState("REJECTED".into()).to_string().contains("REJECTED"));

        assert!(PortalError::LabNotFound(42).to_string().contains("42"));
        assert!(PortalError::ComputerNotFound(7).to_string().contains("7"));
        assert!(PortalError::ReservationNotFound(11).to_string().contains("11"));
        assert!(PortalError::SitinNotFound(22).to_string().contains("22"));
    }

    /// IntoResponse 是错误到 HTTP 响应的最终出口。
    /// 必须验证：状态码正确、响应体结构完整（success/code/message/data 四字段）。
    #[tokio::test]
    async fn test_into_response_body_structure() {
        let test_cases: Vec<(PortalError, StatusCode, &str)> = vec![
            (PortalError::InvalidCredentials, StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            (PortalError::LabNotFound(3), StatusCode::NOT_FOUND, "LAB_NOT_FOUND"),
            (PortalError::NoCreditsLeft, StatusCode::CONFLICT, "NO_CREDITS_LEFT"),
            (PortalError::OutsideLabSchedule, StatusCode::CONFLICT, "OUTSIDE_LAB_SCHEDULE"),
            (PortalError::Internal("crash".into()), StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        ];

        for (error, expected_status, expected_code) in test_cases {
            let label = format!("{:?}", error);
            let response = error.into_response();

            assert_eq!(
                response.status(),
                expected_status,
                "响应状态码不匹配: {label}"
            );

            let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .expect("读取响应体失败");
            let body: serde_json::Value =
                serde_json::from_slice(&body_bytes).expect("响应体不是合法 JSON");

            assert_eq!(body["success"], json!(false), "success 字段应为 false: {label}");
            assert_eq!(body["code"], json!(expected_code), "code 字段不匹配: {label}");
            assert!(!body["message"].as_str().unwrap_or("").is_empty(), "message 不应为空: {label}");
            assert!(body["data"].is_null(), "data 字段应为 null: {label}");
        }
    }

    /// 系统级错误（Database/Internal）的响应消息不应泄露内部细节，
    /// 只返回通用提示。
    #[tokio::test]
    async fn test_system_errors_hide_internal_details() {
        let response =
            PortalError::Internal("stack overflow at module X".into()).into_response();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("读取响应体失败");
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        let message = body["message"].as_str().unwrap();

        assert!(
            !message.contains("stack overflow"),
            "系统错误消息泄露了内部细节: {message}"
        );
        assert!(message.contains("服务内部错误"));
    }

    /// validator 是请求参数校验的统一入口，转换必须把字段级错误信息带入 PortalError。
    #[test]
    fn test_from_validation_errors() {
        use validator::{ValidationError, ValidationErrors};

        let mut errors = ValidationErrors::new();
        let mut field_error = ValidationError::new("range");
        field_error.message = Some("评分必须在 1-5 之间".into());
        errors.add("rating", field_error);

        let portal_error: PortalError = errors.into();
        match &portal_error {
            PortalError::Validation(msg) => {
                assert!(msg.contains("rating"), "转换后应保留字段名: {msg}");
            }
            other => panic!("期望 Validation 变体，实际: {:?}", other),
        }

        assert_eq!(portal_error.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(portal_error.error_code(), "VALIDATION_ERROR");
    }

    /// sqlx::Error 通过 #[from] 自动派生 From，验证转换后类型和状态码正确
    #[test]
    fn test_from_sqlx_error() {
        let portal_err = PortalError::from(sqlx::Error::RowNotFound);
        assert!(matches!(portal_err, PortalError::Database(_)));
        assert_eq!(portal_err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(portal_err.error_code(), "DATABASE_ERROR");
    }

    /// 确保表驱动用例覆盖了除 Database 外的全部变体
    /// （Database 依赖 sqlx::Error，单独在 test_from_sqlx_error 中验证）。
    #[test]
    fn test_all_variants_covered_in_table() {
        assert_eq!(
            all_error_variants().len(),
            24,
            "表驱动用例数量与变体总数不一致，可能新增了变体但未更新测试"
        );
    }
}
