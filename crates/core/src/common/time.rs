use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use std::sync::RwLock;

/// # Summary
/// 时间供给器接口，用于隔离物理系统时钟。
/// 增量聚合驱动通过此接口确定 "今天" 所在的未收盘周期。
pub trait TimeProvider: Send + Sync {
    /// 获取当前挂载的时间
    fn now(&self) -> DateTime<Utc>;

    /// 目标市场相对 UTC 的偏移，默认为 UTC
    fn utc_offset(&self) -> FixedOffset {
        Utc.fix()
    }

    /// 获取目标市场的当前本地日历日
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.utc_offset()).date_naive()
    }
}

/// 将小时偏移换算为时区；超出 ±23 小时返回 `None`
pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

/// # Summary
/// 针对生产运行的真实时钟，直接返回操作系统当前时间。
///
/// # Invariants
/// - "今天" 按 `offset` 所在时区的日历日计算，避免东八区凌晨落在 UTC 前一天。
pub struct RealTimeProvider {
    offset: FixedOffset,
}

impl RealTimeProvider {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }
}

/// # Summary
/// 测试与补跑专用的虚拟时钟，允许调用方指定 "今天"。
///
/// # Invariants
/// - 并发安全：内部利用 `RwLock` 提供多线程安全的读写。
pub struct FakeClockProvider {
    current_time: RwLock<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FakeClockProvider {
    /// 使用指定的初始时间创建虚拟时钟
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            current_time: RwLock::new(initial_time),
            offset: Utc.fix(),
        }
    }

    /// 以某个日历日的零点创建虚拟时钟
    pub fn at_date(date: NaiveDate) -> Self {
        Self::new(date.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    /// 指定目标市场时区
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        let mut time = self.current_time.write().unwrap_or_else(|e| e.into_inner());
        *time = new_time;
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.current_time.read().unwrap_or_else(|e| e.into_inner())
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }
}
