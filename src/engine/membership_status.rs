// ==========================================
// 会员导入引擎 - 会员状态判定引擎
// ==========================================
// 职责: 按状态规则（起止事件 + 偏移）判定指定日期下的会员状态
// 红线: exclude_admin = true 时管理类状态（is_admin）永不自动命中
// ==========================================

use crate::domain::membership::{
    EventAdjust, MembershipStatusRule, StatusEvent, StatusResult,
};
use crate::engine::membership_dates::shift_date;
use chrono::NaiveDate;
use tracing::trace;

/// 状态判定所需的会员日期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDates {
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl StatusDates {
    fn event(&self, event: StatusEvent) -> Option<NaiveDate> {
        match event {
            StatusEvent::JoinDate => self.join_date,
            StatusEvent::StartDate => self.start_date,
            StatusEvent::EndDate => self.end_date,
        }
    }
}

// ==========================================
// MembershipStatusEngine
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct MembershipStatusEngine;

impl MembershipStatusEngine {
    pub fn new() -> Self {
        Self
    }

    /// 判定状态
    ///
    /// # 规则（按 weight 升序，命中即返回）
    /// 1. 跳过停用状态；exclude_admin 时跳过管理类状态
    /// 2. 起始事件日期缺失 → 跳过
    /// 3. as_of >= 起始事件(+偏移)
    /// 4. 结束事件存在且其日期存在 → as_of <= 结束事件(+偏移)；日期缺失视为无上限
    pub fn status_by_date(
        &self,
        rules: &[MembershipStatusRule],
        dates: StatusDates,
        as_of: NaiveDate,
        exclude_admin: bool,
    ) -> Option<StatusResult> {
        let mut ordered: Vec<&MembershipStatusRule> = rules
            .iter()
            .filter(|r| r.is_active)
            .filter(|r| !(exclude_admin && r.is_admin))
            .collect();
        ordered.sort_by_key(|r| (r.weight, r.id));

        for rule in ordered {
            if self.rule_applies(rule, &dates, as_of) {
                trace!(status_id = rule.id, status = %rule.name, "状态规则命中");
                return Some(rule.to_result());
            }
        }
        None
    }

    fn rule_applies(
        &self,
        rule: &MembershipStatusRule,
        dates: &StatusDates,
        as_of: NaiveDate,
    ) -> bool {
        let begin = match rule
            .start_event
            .and_then(|e| dates.event(e))
            .and_then(|d| adjust(d, rule.start_adjust))
        {
            Some(d) => d,
            None => return false,
        };
        if as_of < begin {
            return false;
        }

        match rule.end_event {
            None => true,
            Some(event) => match dates.event(event) {
                None => true,
                Some(d) => match adjust(d, rule.end_adjust) {
                    Some(finish) => as_of <= finish,
                    None => true,
                },
            },
        }
    }
}

fn adjust(date: NaiveDate, adjust: Option<EventAdjust>) -> Option<NaiveDate> {
    match adjust {
        None => Some(date),
        Some(a) if a.interval == 0 => Some(date),
        Some(a) => shift_date(date, a.unit, a.interval),
    }
}
