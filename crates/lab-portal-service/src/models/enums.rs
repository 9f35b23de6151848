//! 门户服务枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 用户角色
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum UserRole {
    /// 学生 - 可预约、提交反馈
    #[default]
    Student,
    /// 管理员 - 管理实验室、设备和上机记录
    Admin,
}

/// 用户状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum UserStatus {
    /// 正常 - 可登录和使用系统
    #[default]
    Active,
    /// 停用 - 禁止登录
    Disabled,
}

/// 实验室状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum LabStatus {
    /// 开放 - 接受上机和预约
    #[default]
    Open,
    /// 关闭 - 维护或停用
    Closed,
}

/// 设备状态
///
/// 设备为 in_use 当且仅当存在引用它的进行中上机记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ComputerStatus {
    /// 空闲 - 可上机或被预约
    #[default]
    Available,
    /// 使用中 - 有进行中的上机记录
    InUse,
    /// 检修中 - 不可用
    Maintenance,
}

/// 上机记录状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum SitinStatus {
    /// 进行中 - 已签到未签退
    #[default]
    Active,
    /// 已结束 - 已签退
    Closed,
}

/// 预约状态
///
/// 状态机：pending → approved | rejected | cancelled；
/// approved → completed | cancelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
pub enum ReservationStatus {
    /// 待审批
    #[default]
    Pending,
    /// 已批准
    Approved,
    /// 已驳回
    Rejected,
    /// 已取消（学生主动取消）
    Cancelled,
    /// 已完成（结束时间已过，由 Worker 扫描置位）
    Completed,
}

impl ReservationStatus {
    /// 判断是否允许转移到目标状态
    pub fn can_transition_to(&self, target: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, target),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Approved, Completed)
                | (Approved, Cancelled)
        )
    }
}

/// 上机额度变动类型
///
/// 记录 session_ledger 中每一次额度变动的来源，用于追溯和审计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum CreditChangeType {
    /// 上机签到（-1）
    Sitin,
    /// 预约提交（-1）
    ReservationRequest,
    /// 预约驳回/取消退还（+1）
    ReservationRefund,
    /// 积分兑换奖励（+1）
    Reward,
    /// 管理员重置（差额）
    Reset,
}

impl CreditChangeType {
    /// 返回该变动类型的数量符号
    /// 正数表示增加，负数表示减少，Reset 由差额决定返回 0
    pub fn sign(&self) -> i32 {
        match self {
            Self::ReservationRefund | Self::Reward => 1,
            Self::Sitin | Self::ReservationRequest => -1,
            Self::Reset => 0,
        }
    }
}
