//! 门户服务请求 DTO 定义
//!
//! 所有 REST API 的请求参数和请求体结构

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::models::{ComputerStatus, LabStatus, ReservationStatus, SitinStatus};

/// 学生注册请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 20, message = "学号长度必须在1-20个字符之间"))]
    pub id_number: String,
    #[validate(length(min = 1, max = 50, message = "用户名长度必须在1-50个字符之间"))]
    pub username: String,
    #[validate(length(min = 6, max = 100, message = "密码长度必须在6-100个字符之间"))]
    pub password: String,
    #[validate(length(min = 1, max = 50, message = "名字长度必须在1-50个字符之间"))]
    pub first_name: String,
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "姓氏长度必须在1-50个字符之间"))]
    pub last_name: String,
    #[validate(email(message = "邮箱格式无效"))]
    pub email: Option<String>,
    pub course: Option<String>,
    #[validate(range(min = 1, max = 6, message = "年级必须在1-6之间"))]
    pub year_level: Option<i16>,
}

/// 更新学生资料请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    #[validate(length(min = 1, max = 50, message = "名字长度必须在1-50个字符之间"))]
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    #[validate(length(min = 1, max = 50, message = "姓氏长度必须在1-50个字符之间"))]
    pub last_name: Option<String>,
    #[validate(email(message = "邮箱格式无效"))]
    pub email: Option<String>,
    pub course: Option<String>,
    #[validate(range(min = 1, max = 6, message = "年级必须在1-6之间"))]
    pub year_level: Option<i16>,
}

/// 创建实验室请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLabRequest {
    #[validate(length(min = 1, max = 50, message = "实验室名称长度必须在1-50个字符之间"))]
    pub name: String,
    pub location: Option<String>,
    #[validate(range(min = 0, max = 500, message = "容量必须在0-500之间"))]
    pub capacity: Option<i32>,
}

/// 更新实验室请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLabRequest {
    #[validate(length(min = 1, max = 50, message = "实验室名称长度必须在1-50个字符之间"))]
    pub name: Option<String>,
    pub location: Option<String>,
    #[validate(range(min = 0, max = 500, message = "容量必须在0-500之间"))]
    pub capacity: Option<i32>,
    pub status: Option<LabStatus>,
}

/// 开放时段条目
///
/// weekday: 0=周一 .. 6=周日
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleWindowRequest {
    #[validate(range(min = 0, max = 6, message = "星期必须在0-6之间"))]
    pub weekday: i16,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

/// 替换实验室开放时段请求
///
/// 整组替换：旧时段在同一事务中删除后写入新时段
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSchedulesRequest {
    #[validate(nested)]
    pub windows: Vec<ScheduleWindowRequest>,
}

/// 创建设备请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateComputerRequest {
    pub lab_id: i64,
    #[validate(length(min = 1, max = 50, message = "设备编号长度必须在1-50个字符之间"))]
    pub label: String,
}

/// 更新设备请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComputerRequest {
    #[validate(length(min = 1, max = 50, message = "设备编号长度必须在1-50个字符之间"))]
    pub label: Option<String>,
}

/// 更新设备状态请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComputerStatusRequest {
    pub status: ComputerStatus,
}

/// 上机签到请求（管理员录入走读学生）
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSitinRequest {
    #[validate(length(min = 1, max = 20, message = "学号长度必须在1-20个字符之间"))]
    pub id_number: String,
    pub computer_id: i64,
    #[validate(length(min = 1, max = 100, message = "用途不能为空且不超过100字符"))]
    pub purpose: String,
}

/// 创建预约请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub computer_id: i64,
    #[validate(length(min = 1, max = 100, message = "用途不能为空且不超过100字符"))]
    pub purpose: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// 预约审批请求（批准/驳回时附带备注）
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecideReservationRequest {
    #[validate(length(max = 500, message = "备注不超过500字符"))]
    pub remark: Option<String>,
}

/// 创建公告请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnouncementRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度必须在1-200个字符之间"))]
    pub title: String,
    #[validate(length(min = 1, message = "内容不能为空"))]
    pub content: String,
}

/// 更新公告请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnouncementRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度必须在1-200个字符之间"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "内容不能为空"))]
    pub content: Option<String>,
}

/// 提交反馈请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedbackRequest {
    pub lab_id: i64,
    pub sitin_id: Option<i64>,
    #[validate(range(min = 1, max = 5, message = "评分必须在1-5之间"))]
    pub rating: i16,
    #[validate(length(min = 1, max = 1000, message = "反馈内容不能为空且不超过1000字符"))]
    pub message: String,
}

/// 创建资源请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateResourceRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度必须在1-200个字符之间"))]
    pub title: String,
    #[validate(length(max = 1000, message = "描述不超过1000字符"))]
    pub description: Option<String>,
    #[validate(url(message = "资源链接必须是有效的URL"))]
    pub link: String,
}

/// 更新资源请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResourceRequest {
    #[validate(length(min = 1, max = 200, message = "标题长度必须在1-200个字符之间"))]
    pub title: Option<String>,
    #[validate(length(max = 1000, message = "描述不超过1000字符"))]
    pub description: Option<String>,
    #[validate(url(message = "资源链接必须是有效的URL"))]
    pub link: Option<String>,
    pub enabled: Option<bool>,
}

/// 分页查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    20
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            page_size: default_page_size(),
        }
    }
}

impl PaginationParams {
    /// 计算数据库查询的 offset
    ///
    /// 必须基于钳制后的 limit 计算，否则超限的 pageSize 会导致翻页跳过数据
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }

    /// 获取限制条数（1-100）
    pub fn limit(&self) -> i64 {
        self.page_size.clamp(1, 100)
    }
}

/// 学生列表查询过滤
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    /// 匹配学号/用户名/姓名/专业
    pub keyword: Option<String>,
}

/// 上机记录查询过滤
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitinFilter {
    pub user_id: Option<i64>,
    pub lab_id: Option<i64>,
    pub status: Option<SitinStatus>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// 预约查询过滤
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationFilter {
    pub user_id: Option<i64>,
    pub lab_id: Option<i64>,
    pub status: Option<ReservationStatus>,
}

/// 反馈查询过滤
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackFilter {
    pub user_id: Option<i64>,
    pub lab_id: Option<i64>,
    pub min_rating: Option<i16>,
}

/// 统计日期范围参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// 排行榜查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardParams {
    #[serde(default = "default_leaderboard_limit")]
    pub limit: i64,
}

fn default_leaderboard_limit() -> i64 {
    10
}

impl Default for LeaderboardParams {
    fn default() -> Self {
        Self {
            limit: default_leaderboard_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_pagination_params_default() {
        let params = PaginationParams::default();
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, 20);
    }

    #[test]
    fn test_pagination_offset() {
        let params = PaginationParams {
            page: 3,
            page_size: 10,
        };
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_pagination_offset_edge_cases() {
        let params = PaginationParams {
            page: 0,
            page_size: 10,
        };
        // page 为 0 时，offset 应该为 0
        assert_eq!(params.offset(), 0);

        let params = PaginationParams {
            page: 1,
            page_size: 200,
        };
        // page_size 超过100时应被限制
        assert_eq!(params.limit(), 100);
    }

    #[test]
    fn test_pagination_offset_follows_clamped_limit() {
        // pageSize 超限时 offset 按钳制后的 limit 计算，翻页不跳过数据
        let params = PaginationParams {
            page: 2,
            page_size: 1000,
        };
        assert_eq!(params.limit(), 100);
        assert_eq!(params.offset(), 100);
    }

    #[test]
    fn test_pagination_negative_page_size_never_negative_offset() {
        // 负的 pageSize 不能产生负 OFFSET，否则 SQL 执行直接报错
        let params = PaginationParams {
            page: 2,
            page_size: -5,
        };
        assert_eq!(params.limit(), 1);
        assert_eq!(params.offset(), 1);

        let params = PaginationParams {
            page: -3,
            page_size: -5,
        };
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn test_register_request_validation() {
        let valid = RegisterRequest {
            id_number: "2021-0001".to_string(),
            username: "jdoe".to_string(),
            password: "secret123".to_string(),
            first_name: "Juan".to_string(),
            middle_name: None,
            last_name: "Dela Cruz".to_string(),
            email: Some("jdoe@example.edu".to_string()),
            course: Some("BSCS".to_string()),
            year_level: Some(3),
        };
        assert!(valid.validate().is_ok());

        // 密码过短
        let invalid = RegisterRequest {
            password: "123".to_string(),
            ..valid_register()
        };
        assert!(invalid.validate().is_err());

        // 邮箱格式错误
        let invalid = RegisterRequest {
            email: Some("not-an-email".to_string()),
            ..valid_register()
        };
        assert!(invalid.validate().is_err());
    }

    fn valid_register() -> RegisterRequest {
        RegisterRequest {
            id_number: "2021-0001".to_string(),
            username: "jdoe".to_string(),
            password: "secret123".to_string(),
            first_name: "Juan".to_string(),
            middle_name: None,
            last_name: "Dela Cruz".to_string(),
            email: None,
            course: None,
            year_level: None,
        }
    }

    #[test]
    fn test_create_sitin_request_validation() {
        let valid = CreateSitinRequest {
            id_number: "2021-0001".to_string(),
            computer_id: 1,
            purpose: "Java Programming".to_string(),
        };
        assert!(valid.validate().is_ok());

        // 空用途
        let invalid = CreateSitinRequest {
            id_number: "2021-0001".to_string(),
            computer_id: 1,
            purpose: "".to_string(),
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_feedback_rating_range() {
        let valid = CreateFeedbackRequest {
            lab_id: 1,
            sitin_id: None,
            rating: 5,
            message: "很好".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = CreateFeedbackRequest {
            lab_id: 1,
            sitin_id: None,
            rating: 6,
            message: "评分超限".to_string(),
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_resource_link_must_be_url() {
        let invalid = CreateResourceRequest {
            title: "C 语言讲义".to_string(),
            description: None,
            link: "not-a-url".to_string(),
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_schedule_window_weekday_range() {
        let invalid = ScheduleWindowRequest {
            weekday: 7,
            open_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            close_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        };
        assert!(invalid.validate().is_err());
    }
}
