// ==========================================
// 会员导入引擎 - 会员类型日期推导引擎
// ==========================================
// 职责: 按会员类型的周期规则补齐缺失的 join/start/end 日期
// 红线: 已提供的日期一律保留，只补缺失值; Engine 不拼 SQL
// ==========================================

use crate::domain::membership::{CalculatedDates, DurationUnit, MembershipType, PeriodType};
use chrono::{Datelike, Days, Months, NaiveDate};

/// 日期按单位偏移（interval 可为负）
///
/// # 返回
/// - None: Lifetime 单位或日期溢出
pub fn shift_date(date: NaiveDate, unit: DurationUnit, interval: i32) -> Option<NaiveDate> {
    let magnitude = interval.unsigned_abs();
    match unit {
        DurationUnit::Day => {
            if interval >= 0 {
                date.checked_add_days(Days::new(magnitude as u64))
            } else {
                date.checked_sub_days(Days::new(magnitude as u64))
            }
        }
        DurationUnit::Month => {
            if interval >= 0 {
                date.checked_add_months(Months::new(magnitude))
            } else {
                date.checked_sub_months(Months::new(magnitude))
            }
        }
        DurationUnit::Year => {
            let months = magnitude.checked_mul(12)?;
            if interval >= 0 {
                date.checked_add_months(Months::new(months))
            } else {
                date.checked_sub_months(Months::new(months))
            }
        }
        DurationUnit::Lifetime => None,
    }
}

// ==========================================
// MembershipDateEngine
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct MembershipDateEngine;

impl MembershipDateEngine {
    pub fn new() -> Self {
        Self
    }

    /// 推导会员日期
    ///
    /// # 规则
    /// - join: 提供值 > start > today
    /// - start: 提供值 > 周期起点（rolling = join; fixed = join 之前最近的固定起始日）
    /// - end: 提供值 > start + 周期 - 1 天（lifetime 无结束日）
    pub fn dates_for_type(
        &self,
        membership_type: &MembershipType,
        join_date: Option<NaiveDate>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> CalculatedDates {
        let join = join_date.or(start_date).unwrap_or(today);

        let start = start_date.or_else(|| Some(self.period_start(membership_type, join)));

        let end = end_date.or_else(|| {
            start.and_then(|s| self.period_end(membership_type, s))
        });

        CalculatedDates {
            join_date: Some(join),
            start_date: start,
            end_date: end,
        }
    }

    /// 周期起点
    fn period_start(&self, membership_type: &MembershipType, join: NaiveDate) -> NaiveDate {
        match membership_type.period_type {
            PeriodType::Rolling => join,
            PeriodType::Fixed => match membership_type.duration_unit {
                DurationUnit::Year => {
                    let mmdd = membership_type.fixed_period_start_day.unwrap_or(101);
                    fixed_anchor_on_or_before(join, mmdd / 100, mmdd % 100).unwrap_or(join)
                }
                DurationUnit::Month => join.with_day(1).unwrap_or(join),
                // 按日/终身的固定周期没有对齐点
                DurationUnit::Day | DurationUnit::Lifetime => join,
            },
        }
    }

    /// 周期结束日（含当天）
    fn period_end(&self, membership_type: &MembershipType, start: NaiveDate) -> Option<NaiveDate> {
        if membership_type.duration_unit == DurationUnit::Lifetime {
            return None;
        }
        let interval = i32::try_from(membership_type.duration_interval.max(1)).ok()?;
        shift_date(start, membership_type.duration_unit, interval)
            .and_then(|next| next.checked_sub_days(Days::new(1)))
    }
}

/// join 当天或之前最近的 MM-DD
fn fixed_anchor_on_or_before(join: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(join.year(), month, day)?;
    if this_year <= join {
        Some(this_year)
    } else {
        NaiveDate::from_ymd_opt(join.year() - 1, month, day)
    }
}
