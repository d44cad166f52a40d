// ==========================================
// 会员导入引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod import;
pub mod membership;
pub mod types;

// 重导出核心类型
pub use import::{
    ColumnMapping, FieldValue, ImportField, ImportOptions, ImportOutcome, ImportSummary,
    MappedColumn, MappedRow, RequiredFields,
};
pub use membership::{
    CalculatedDates, ContactRef, DurationUnit, EventAdjust, ExistingMembership,
    FormattedMembership, MembershipStatusRule, MembershipType, NewContact, PeriodType,
    StatusEvent, StatusResult,
};
pub use types::{
    ContactId, ContactType, DateFormat, DedupeRuleMode, EntityLabel, FieldDataType,
    ImportStatus, MembershipId, MembershipStatusId, MembershipTypeId, OnDuplicate, RowState,
};
