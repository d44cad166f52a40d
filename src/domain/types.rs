// ==========================================
// 会员导入引擎 - 领域类型定义
// ==========================================
// 职责: 导入管道共用的枚举与标识类型
// 红线: 枚举序列化格式统一为全大写（与 import_row_status 表一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type ContactId = i64;
pub type MembershipId = i64;
pub type MembershipTypeId = i64;
pub type MembershipStatusId = i64;

// ==========================================
// EntityLabel - 映射目标实体
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityLabel {
    Membership,
    Contact,
}

impl EntityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityLabel::Membership => "Membership",
            EntityLabel::Contact => "Contact",
        }
    }

    /// 是否为联系人实体（用于字段目录分组）
    pub fn is_contact(&self) -> bool {
        matches!(self, EntityLabel::Contact)
    }
}

impl fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ContactType - 联系人类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ContactType {
    #[default]
    Individual,
    Household,
    Organization,
}

impl ContactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactType::Individual => "Individual",
            ContactType::Household => "Household",
            ContactType::Organization => "Organization",
        }
    }
}

impl fmt::Display for ContactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(ContactType::Individual),
            "household" => Ok(ContactType::Household),
            "organization" => Ok(ContactType::Organization),
            other => Err(format!("unknown contact type: {}", other)),
        }
    }
}

// ==========================================
// ImportStatus - 行级导入结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Imported,
    Error,
    Duplicate,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Imported => "IMPORTED",
            ImportStatus::Error => "ERROR",
            ImportStatus::Duplicate => "DUPLICATE",
        }
    }

    /// 终态且已落库/已判重的行，在断点续跑时跳过
    pub fn is_finished(&self) -> bool {
        matches!(self, ImportStatus::Imported | ImportStatus::Duplicate)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_matches('"') {
            "IMPORTED" => Ok(ImportStatus::Imported),
            "ERROR" => Ok(ImportStatus::Error),
            "DUPLICATE" => Ok(ImportStatus::Duplicate),
            other => Err(format!("unknown import status: {}", other)),
        }
    }
}

// ==========================================
// RowState - 单行状态机
// ==========================================
// Mapped → Validated → Resolved → DatesCalculated → Committed
// 终止失败态: Rejected（校验/业务规则失败）, Skipped（联系人多重匹配）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowState {
    Mapped,
    Validated,
    Resolved,
    DatesCalculated,
    Committed,
    Rejected,
    Skipped,
}

// ==========================================
// OnDuplicate - 已存在会员记录的处理方式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OnDuplicate {
    /// 按 id 更新已有会员
    #[default]
    Update,
    /// 已有会员的行记为 DUPLICATE，不写库
    Skip,
}

impl FromStr for OnDuplicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(OnDuplicate::Update),
            "skip" => Ok(OnDuplicate::Skip),
            other => Err(format!("unknown on_duplicate mode: {}", other)),
        }
    }
}

// ==========================================
// DateFormat - 导入文件中的日期格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DateFormat {
    /// 2024-01-31（同时接受 20240131）
    #[default]
    YearMonthDay,
    /// 01/31/2024
    MonthDayYear,
    /// 31/01/2024
    DayMonthYear,
}

impl DateFormat {
    /// chrono 解析模式，按优先级排列
    pub fn patterns(&self) -> &'static [&'static str] {
        match self {
            DateFormat::YearMonthDay => &["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"],
            DateFormat::MonthDayYear => &["%m/%d/%Y", "%m-%d-%Y"],
            DateFormat::DayMonthYear => &["%d/%m/%Y", "%d-%m-%Y"],
        }
    }
}

impl FromStr for DateFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yyyy-mm-dd" | "yyyymmdd" => Ok(DateFormat::YearMonthDay),
            "mm/dd/yyyy" => Ok(DateFormat::MonthDayYear),
            "dd/mm/yyyy" => Ok(DateFormat::DayMonthYear),
            other => Err(format!("unknown date format: {}", other)),
        }
    }
}

// ==========================================
// FieldDataType - 字段校验类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDataType {
    String,
    Integer,
    Date,
    Boolean,
    Money,
    Email,
}

impl FromStr for FieldDataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "text" | "memo" => Ok(FieldDataType::String),
            "int" | "integer" => Ok(FieldDataType::Integer),
            "date" => Ok(FieldDataType::Date),
            "boolean" => Ok(FieldDataType::Boolean),
            "money" | "float" => Ok(FieldDataType::Money),
            "email" => Ok(FieldDataType::Email),
            other => Err(format!("unknown field data type: {}", other)),
        }
    }
}

// ==========================================
// DedupeRuleMode - 联系人判重规则模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DedupeRuleMode {
    /// 全自动匹配（导入使用）
    Unsupervised,
    /// 人工复核
    Supervised,
}

impl DedupeRuleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DedupeRuleMode::Unsupervised => "Unsupervised",
            DedupeRuleMode::Supervised => "Supervised",
        }
    }
}
