// ==========================================
// 会员导入引擎 - 会员日期与状态计算
// ==========================================
// 职责:
// - 日期输入的逐字段优先级（行内值 > 已有记录 > 默认）
// - 委托会员类型日期规则补齐日期、委托状态规则按日期判定状态
// - 行内显式状态与计算状态的对账
// 红线: 非覆盖（is_override = false）时管理类状态永不自动赋值
// ==========================================

use crate::domain::membership::{
    CalculatedDates, ExistingMembership, FormattedMembership, StatusResult,
};
use crate::domain::types::{MembershipStatusId, MembershipTypeId};
use crate::importer::data_cleaner::MembershipRowValues;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::membership_rules_repo::{MembershipStatusRules, MembershipTypeDateRules};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

/// 按顺序取第一个存在的候选值
pub fn first_present<T, I>(candidates: I) -> Option<T>
where
    I: IntoIterator<Item = Option<T>>,
{
    candidates.into_iter().flatten().next()
}

/// 经过优先级解析后的日期输入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInputs {
    pub membership_type_id: Option<MembershipTypeId>,
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub is_override: bool,
}

impl DateInputs {
    pub fn as_dates(&self) -> CalculatedDates {
        CalculatedDates {
            join_date: self.join_date,
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }
}

/// 逐字段优先级
///
/// - start: 行 > 已有 > 无
/// - join:  行 > 已有 > start
/// - end:   行 > 已有 > 无
/// - type:  行 > 已有
/// - override: 行 > 已有 > false
pub fn resolve_date_inputs(
    row: &MembershipRowValues,
    existing: Option<&ExistingMembership>,
) -> DateInputs {
    let start_date = first_present([row.start_date, existing.and_then(|e| e.start_date)]);
    let join_date = first_present([
        row.join_date,
        existing.and_then(|e| e.join_date),
        start_date,
    ]);
    let end_date = first_present([row.end_date, existing.and_then(|e| e.end_date)]);
    let membership_type_id = first_present([
        row.membership_type_id,
        existing.map(|e| e.membership_type_id),
    ]);
    let is_override =
        first_present([row.is_override, existing.map(|e| e.is_override)]).unwrap_or(false);

    DateInputs {
        membership_type_id,
        join_date,
        start_date,
        end_date,
        is_override,
    }
}

/// 显式状态：行内值优先；行内未给出且已有记录处于覆盖状态时沿用已存状态
///
/// 覆盖中的已有会员不重新计算状态，重复导入同一行不会改变记录。
pub fn explicit_status(
    row_status: Option<MembershipStatusId>,
    existing: Option<&ExistingMembership>,
    is_override: bool,
) -> Option<MembershipStatusId> {
    row_status.or_else(|| {
        existing
            .filter(|e| is_override && e.is_override)
            .and_then(|e| e.status_id)
    })
}

/// 规范化日期：显式值优先，其次计算值
pub fn formatted_dates(explicit: CalculatedDates, calculated: CalculatedDates) -> CalculatedDates {
    CalculatedDates {
        join_date: first_present([explicit.join_date, calculated.join_date]),
        start_date: first_present([explicit.start_date, calculated.start_date]),
        end_date: first_present([explicit.end_date, calculated.end_date]),
    }
}

/// 显式状态与计算状态对账
///
/// # 返回
/// - Ok(Some(id)): 采用的状态
/// - Ok(None): 既无显式状态也无计算状态
/// - Err(StatusMismatch): 非覆盖且显式状态与计算结果不一致（或无计算结果）
pub fn reconcile_status(
    explicit: Option<MembershipStatusId>,
    calculated: Option<&StatusResult>,
    is_override: bool,
) -> ImportResult<Option<MembershipStatusId>> {
    match (explicit, calculated) {
        (None, calculated) => Ok(calculated.map(|s| s.id)),
        (Some(explicit), _) if is_override => Ok(Some(explicit)),
        (Some(explicit), None) => Err(ImportError::StatusMismatch {
            explicit: explicit.to_string(),
            calculated: None,
        }),
        (Some(explicit), Some(status)) if status.id != explicit => {
            Err(ImportError::StatusMismatch {
                explicit: explicit.to_string(),
                calculated: Some(status.name.clone()),
            })
        }
        (Some(explicit), Some(_)) => Ok(Some(explicit)),
    }
}

/// 日期与状态计算结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCalculation {
    pub dates: CalculatedDates,
    pub status: Option<StatusResult>,
    pub exclude_admin: bool,
}

// ==========================================
// MembershipStatusCalculator
// ==========================================
pub struct MembershipStatusCalculator {
    date_rules: Arc<dyn MembershipTypeDateRules>,
    status_rules: Arc<dyn MembershipStatusRules>,
}

impl MembershipStatusCalculator {
    pub fn new(
        date_rules: Arc<dyn MembershipTypeDateRules>,
        status_rules: Arc<dyn MembershipStatusRules>,
    ) -> Self {
        Self {
            date_rules,
            status_rules,
        }
    }

    /// 计算规范化日期与状态
    ///
    /// # 参数
    /// - inputs: 已按优先级解析的日期输入
    /// - as_of: 状态参考日期（通常为今天）
    /// - current: 当前已格式化的记录（传给状态规则作上下文）
    pub async fn calculate(
        &self,
        membership_type_id: MembershipTypeId,
        inputs: &DateInputs,
        as_of: NaiveDate,
        current: Option<&FormattedMembership>,
    ) -> ImportResult<StatusCalculation> {
        let exclude_admin = !inputs.is_override;

        let calculated = self
            .date_rules
            .dates_for_type(
                membership_type_id,
                inputs.join_date,
                inputs.start_date,
                inputs.end_date,
            )
            .await?;
        let dates = formatted_dates(inputs.as_dates(), calculated);

        let status = self
            .status_rules
            .status_by_date(
                dates.start_date,
                dates.end_date,
                dates.join_date,
                as_of,
                exclude_admin,
                membership_type_id,
                current,
            )
            .await?;

        debug!(
            membership_type_id,
            join_date = ?dates.join_date,
            start_date = ?dates.start_date,
            end_date = ?dates.end_date,
            status = ?status.as_ref().map(|s| s.name.as_str()),
            "日期与状态计算完成"
        );

        Ok(StatusCalculation {
            dates,
            status,
            exclude_admin,
        })
    }
}
