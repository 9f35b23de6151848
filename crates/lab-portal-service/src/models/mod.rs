//! 门户服务实体模型

mod enums;

pub use enums::{
    ComputerStatus, CreditChangeType, LabStatus, ReservationStatus, SitinStatus, UserRole,
    UserStatus,
};
