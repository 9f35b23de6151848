//! 门户服务响应 DTO 定义
//!
//! 所有 REST API 的响应体结构

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ComputerStatus, CreditChangeType, LabStatus, ReservationStatus, SitinStatus, UserRole,
    UserStatus,
};

/// 分页响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

impl<T> PageResponse<T> {
    /// 创建分页响应
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let total_pages = if page_size > 0 {
            (total + page_size - 1) / page_size
        } else {
            0
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    /// 无数据时序列化为 null，保持响应结构一致
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（无数据）
    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: None,
        }
    }

}

/// 学生响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentDto {
    pub id: i64,
    pub id_number: String,
    pub username: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub email: Option<String>,
    pub course: Option<String>,
    pub year_level: Option<i16>,
    pub role: UserRole,
    pub session_credits: i32,
    pub points: i32,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 实验室响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabDto {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub capacity: i32,
    pub status: LabStatus,
    pub computer_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 开放时段响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleWindowDto {
    pub id: i64,
    pub lab_id: i64,
    pub weekday: i16,
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
}

/// 设备响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputerDto {
    pub id: i64,
    pub lab_id: i64,
    pub lab_name: String,
    pub label: String,
    pub status: ComputerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 上机记录响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SitinDto {
    pub id: i64,
    pub user_id: i64,
    pub id_number: String,
    pub student_name: String,
    pub lab_id: i64,
    pub lab_name: String,
    pub computer_id: i64,
    pub computer_label: String,
    pub purpose: String,
    pub login_at: DateTime<Utc>,
    pub logout_at: Option<DateTime<Utc>>,
    pub status: SitinStatus,
    pub rewarded: bool,
}

/// 预约响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDto {
    pub id: i64,
    pub user_id: i64,
    pub id_number: String,
    pub student_name: String,
    pub lab_id: i64,
    pub lab_name: String,
    pub computer_id: i64,
    pub computer_label: String,
    pub purpose: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: ReservationStatus,
    pub remark: Option<String>,
    pub decided_by: Option<i64>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// 额度流水响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntryDto {
    pub id: i64,
    pub user_id: i64,
    pub change_type: CreditChangeType,
    pub delta: i32,
    pub sitin_id: Option<i64>,
    pub reservation_id: Option<i64>,
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 公告响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncementDto {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub posted_by: i64,
    pub poster_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 反馈响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDto {
    pub id: i64,
    pub user_id: i64,
    pub id_number: String,
    pub student_name: String,
    pub sitin_id: Option<i64>,
    pub lab_id: i64,
    pub lab_name: String,
    pub rating: i16,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// 资源响应 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDto {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub link: String,
    pub enabled: bool,
    pub uploaded_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 统计概览
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub total_students: i64,
    pub active_students: i64,
    pub total_sitins: i64,
    pub active_sitins: i64,
    pub today_sitins: i64,
    pub pending_reservations: i64,
    pub total_reservations: i64,
}

/// 排行榜条目 DTO
///
/// 按积分排名，包含累计上机次数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryDto {
    pub user_id: i64,
    pub id_number: String,
    pub student_name: String,
    pub course: Option<String>,
    pub points: i32,
    pub sitin_count: i64,
}

/// 上机用途分布 DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeDistributionDto {
    pub purpose: String,
    pub count: i64,
    pub percentage: f64,
}

/// 每日上机数据点
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySitinPoint {
    pub date: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_response_new() {
        let items = vec![1, 2, 3];
        let response = PageResponse::new(items, 100, 2, 10);

        assert_eq!(response.total, 100);
        assert_eq!(response.page, 2);
        assert_eq!(response.page_size, 10);
        assert_eq!(response.total_pages, 10);
        assert_eq!(response.items.len(), 3);
    }

    #[test]
    fn test_page_response_total_pages_calculation() {
        // 恰好整除
        let response = PageResponse::<i32>::new(vec![], 100, 1, 10);
        assert_eq!(response.total_pages, 10);

        // 有余数
        let response = PageResponse::<i32>::new(vec![], 101, 1, 10);
        assert_eq!(response.total_pages, 11);

        // 空数据
        let response = PageResponse::<i32>::new(vec![], 0, 1, 10);
        assert_eq!(response.total_pages, 0);
    }

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.code, "SUCCESS");
        assert_eq!(response.data, Some("test data"));
    }

    #[test]
    fn test_api_response_serialization() {
        let response = ApiResponse::success(DailySitinPoint {
            date: "2025-01-15".to_string(),
            count: 7,
        });
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"count\":7"));
    }

    #[test]
    fn test_api_response_empty_keeps_null_data() {
        let response = ApiResponse::<()>::success_empty();
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"data\":null"));
    }

    #[test]
    fn test_dto_camel_case_fields() {
        let entry = LeaderboardEntryDto {
            user_id: 1,
            id_number: "2021-0001".to_string(),
            student_name: "Juan Dela Cruz".to_string(),
            course: Some("BSCS".to_string()),
            points: 9,
            sitin_count: 14,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"idNumber\""));
        assert!(json.contains("\"sitinCount\""));
        assert!(!json.contains("\"sitin_count\""));
    }
}
