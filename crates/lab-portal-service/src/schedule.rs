//! 实验室开放时段校验
//!
//! 预约时段必须完整落在当天某一个开放窗口内。
//! 时间窗口按半开区间 [open, close) 处理，预约结束时间允许等于关闭时间。

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc};

use crate::error::PortalError;

/// 开放窗口（内部表示）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Window {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        Self { open, close }
    }

    /// 窗口是否完整覆盖 [start, end)
    pub fn covers(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.open && end <= self.close
    }
}

/// 返回时间戳对应的星期索引（0=周一 .. 6=周日）
pub fn weekday_index(at: DateTime<Utc>) -> i16 {
    at.weekday().num_days_from_monday() as i16
}

/// 校验预约时间范围本身的合法性
///
/// 要求：开始早于结束、同一自然日、不早于当前时刻
pub fn validate_time_range(
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), PortalError> {
    if starts_at >= ends_at {
        return Err(PortalError::Validation(
            "开始时间必须早于结束时间".to_string(),
        ));
    }
    if starts_at.date_naive() != ends_at.date_naive() {
        return Err(PortalError::Validation(
            "预约必须在同一自然日内".to_string(),
        ));
    }
    if starts_at < now {
        return Err(PortalError::Validation(
            "开始时间不能早于当前时刻".to_string(),
        ));
    }
    Ok(())
}

/// 判断预约时段是否落在某一个开放窗口内
///
/// 跨窗口的时段不允许：例如窗口为 08:00-12:00 和 13:00-17:00 时，
/// 11:00-14:00 的预约不成立。
pub fn fits_schedule(windows: &[Window], starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
    let start = time_of(starts_at);
    let end = time_of(ends_at);
    windows.iter().any(|w| w.covers(start, end))
}

fn time_of(at: DateTime<Utc>) -> NaiveTime {
    NaiveTime::from_hms_opt(at.hour(), at.minute(), at.second())
        .unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_window_covers() {
        let w = Window::new(t(8, 0), t(12, 0));

        assert!(w.covers(t(8, 0), t(12, 0)));
        assert!(w.covers(t(9, 0), t(10, 30)));
        // 越过关闭时间
        assert!(!w.covers(t(11, 0), t(12, 30)));
        // 早于开放时间
        assert!(!w.covers(t(7, 30), t(9, 0)));
    }

    #[test]
    fn test_fits_schedule_single_window_only() {
        // 上午和下午两个窗口，跨午休的时段不成立
        let windows = vec![
            Window::new(t(8, 0), t(12, 0)),
            Window::new(t(13, 0), t(17, 0)),
        ];

        assert!(fits_schedule(&windows, dt(2025, 9, 1, 9, 0), dt(2025, 9, 1, 11, 0)));
        assert!(fits_schedule(&windows, dt(2025, 9, 1, 13, 0), dt(2025, 9, 1, 17, 0)));
        assert!(!fits_schedule(&windows, dt(2025, 9, 1, 11, 0), dt(2025, 9, 1, 14, 0)));
    }

    #[test]
    fn test_fits_schedule_no_windows() {
        // 当天无开放窗口即不开放
        assert!(!fits_schedule(&[], dt(2025, 9, 1, 9, 0), dt(2025, 9, 1, 10, 0)));
    }

    #[test]
    fn test_weekday_index() {
        // 2025-09-01 是周一
        assert_eq!(weekday_index(dt(2025, 9, 1, 8, 0)), 0);
        // 2025-09-07 是周日
        assert_eq!(weekday_index(dt(2025, 9, 7, 8, 0)), 6);
    }

    #[test]
    fn test_validate_time_range() {
        let now = dt(2025, 9, 1, 7, 0);

        assert!(validate_time_range(dt(2025, 9, 1, 9, 0), dt(2025, 9, 1, 11, 0), now).is_ok());

        // 开始不早于结束
        assert!(validate_time_range(dt(2025, 9, 1, 11, 0), dt(2025, 9, 1, 9, 0), now).is_err());
        assert!(validate_time_range(dt(2025, 9, 1, 9, 0), dt(2025, 9, 1, 9, 0), now).is_err());

        // 跨自然日
        assert!(validate_time_range(dt(2025, 9, 1, 23, 0), dt(2025, 9, 2, 1, 0), now).is_err());

        // 早于当前时刻
        assert!(validate_time_range(dt(2025, 9, 1, 6, 0), dt(2025, 9, 1, 8, 0), now).is_err());
    }
}
