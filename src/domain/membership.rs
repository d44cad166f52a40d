// ==========================================
// 会员导入引擎 - 会员领域模型
// ==========================================
// 职责: 会员快照、日期/状态推导结果、落库载荷、会员类型与状态规则
// 用途: 导入层读取/写入，引擎层只读
// ==========================================

use crate::domain::types::{
    ContactId, ContactType, MembershipId, MembershipStatusId, MembershipTypeId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

// ==========================================
// ExistingMembership - 已有会员快照
// ==========================================
// 生命周期: 行级只读，仅作为未提供字段的回退来源
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingMembership {
    pub id: MembershipId,
    pub contact_id: ContactId,
    pub membership_type_id: MembershipTypeId,
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status_id: Option<MembershipStatusId>,
    pub is_override: bool,
}

// ==========================================
// CalculatedDates - 会员类型规则推导出的日期
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalculatedDates {
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

// ==========================================
// StatusResult - 按日期推导出的会员状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub id: MembershipStatusId,
    pub name: String,
    pub is_admin: bool,
}

// ==========================================
// ContactRef - 会员归属联系人
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContactRef {
    /// 已存在的联系人
    Existing(ContactId),
    /// 未匹配到联系人时新建（与会员同一事务写入）
    New(NewContact),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContact {
    pub contact_type: ContactType,
    /// 字段名 → 值（嵌套字段已取首个值）
    pub fields: BTreeMap<String, String>,
}

// ==========================================
// FormattedMembership - 完整规范化的落库载荷
// ==========================================
// 红线: 日期已规范化为 NaiveDate（落库格式 YYYY-MM-DD）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedMembership {
    /// Some = 更新已有会员, None = 新建
    pub id: Option<MembershipId>,
    pub contact: ContactRef,
    pub membership_type_id: MembershipTypeId,
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// 落库前必须为 Some（对账后仍无状态的行会被拒绝）
    pub status_id: Option<MembershipStatusId>,
    pub is_override: bool,
    pub exclude_is_admin: bool,
    pub source: Option<String>,
    /// 自定义字段（custom_N → 原始值）
    pub custom: BTreeMap<String, String>,
    /// 不写入"最近访问"列表
    pub skip_recent_view: bool,
}

// ==========================================
// 会员类型规则
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationUnit {
    Day,
    Month,
    Year,
    Lifetime,
}

impl FromStr for DurationUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(DurationUnit::Day),
            "month" => Ok(DurationUnit::Month),
            "year" => Ok(DurationUnit::Year),
            "lifetime" => Ok(DurationUnit::Lifetime),
            other => Err(format!("unknown duration unit: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodType {
    /// 自入会日起滚动计算
    Rolling,
    /// 固定周期（按 fixed_period_start_day 对齐）
    Fixed,
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rolling" => Ok(PeriodType::Rolling),
            "fixed" => Ok(PeriodType::Fixed),
            other => Err(format!("unknown period type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipType {
    pub id: MembershipTypeId,
    pub name: String,
    pub duration_unit: DurationUnit,
    pub duration_interval: u32,
    pub period_type: PeriodType,
    /// 固定周期起始月日，MMDD（如 101 = 1月1日）
    pub fixed_period_start_day: Option<u32>,
}

// ==========================================
// 会员状态规则
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusEvent {
    JoinDate,
    StartDate,
    EndDate,
}

impl FromStr for StatusEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "join_date" => Ok(StatusEvent::JoinDate),
            "start_date" => Ok(StatusEvent::StartDate),
            "end_date" => Ok(StatusEvent::EndDate),
            other => Err(format!("unknown status event: {}", other)),
        }
    }
}

/// 事件日期偏移（如 end_date + 1 month）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAdjust {
    pub unit: DurationUnit,
    pub interval: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipStatusRule {
    pub id: MembershipStatusId,
    pub name: String,
    pub start_event: Option<StatusEvent>,
    pub start_adjust: Option<EventAdjust>,
    pub end_event: Option<StatusEvent>,
    pub end_adjust: Option<EventAdjust>,
    pub is_current_member: bool,
    pub is_admin: bool,
    pub is_active: bool,
    /// 排序权重，越小越优先
    pub weight: i32,
}

impl MembershipStatusRule {
    pub fn to_result(&self) -> StatusResult {
        StatusResult {
            id: self.id,
            name: self.name.clone(),
            is_admin: self.is_admin,
        }
    }
}
