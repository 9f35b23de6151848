//! 门户服务 DTO 模块
//!
//! 包含所有请求和响应的数据传输对象

pub mod request;
pub mod response;

// 重新导出常用类型
pub use request::{
    CreateAnnouncementRequest, CreateComputerRequest, CreateFeedbackRequest, CreateLabRequest,
    CreateReservationRequest, CreateResourceRequest, CreateSitinRequest, DateRangeParams,
    DecideReservationRequest, FeedbackFilter, LeaderboardParams, PaginationParams,
    RegisterRequest, ReplaceSchedulesRequest, ReservationFilter, ScheduleWindowRequest,
    SitinFilter, StudentFilter, UpdateAnnouncementRequest, UpdateComputerRequest,
    UpdateComputerStatusRequest, UpdateLabRequest, UpdateResourceRequest, UpdateStudentRequest,
};

pub use response::{
    AnnouncementDto, ApiResponse, ComputerDto, DailySitinPoint, FeedbackDto, LabDto,
    LeaderboardEntryDto, LedgerEntryDto, PageResponse,
    PurposeDistributionDto, ReservationDto, ResourceDto, ScheduleWindowDto, SitinDto,
    StatsOverview, StudentDto,
};
