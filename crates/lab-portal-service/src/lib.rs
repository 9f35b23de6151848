//! 实验室上机/预约管理服务
//!
//! 面向高校开放实验室的门户后端，提供 REST API。
//!
//! ## 核心功能
//!
//! - **账号管理**：学生注册、登录，管理员维护学生资料
//! - **实验室与设备**：实验室、开放时段和设备的配置管理
//! - **上机管理**：走读学生签到/签退，额度扣减与流水记录
//! - **预约管理**：学生提交预约，管理员审批，到期自动完结
//! - **积分奖励**：按上机记录发放积分，积分累计兑换上机额度
//! - **门户内容**：公告、反馈和学习资源
//! - **统计报表**：概览、排行榜、用途分布和每日趋势
//!
//! ## 模块结构
//!
//! - `dto`: 请求和响应的数据传输对象
//! - `models`: 枚举和状态机定义
//! - `schedule`: 开放时段校验逻辑
//! - `error`: 错误类型定义
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `middleware`: JWT 认证中间件
//! - `worker`: 预约完结后台任务
//! - `state`: 应用状态
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据访问：sqlx (PostgreSQL)
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod auth;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod schedule;
pub mod state;
pub mod worker;

// 重新导出核心类型
pub use dto::{
    ApiResponse, CreateReservationRequest, CreateSitinRequest, LabDto, PageResponse,
    PaginationParams, ReservationDto, SitinDto, StatsOverview, StudentDto,
};
pub use error::{PortalError, Result};
pub use models::{
    ComputerStatus, CreditChangeType, LabStatus, ReservationStatus, SitinStatus, UserRole,
    UserStatus,
};
