// ==========================================
// 会员导入引擎 - 导入协作方 Repository Trait
// ==========================================
// 职责: 定义导入管道依赖的数据访问接口（不包含业务逻辑）
// 红线: Repository 不含业务规则，只做数据 CRUD / 匹配查询
// ==========================================

use crate::domain::import::{FieldValue, ImportField};
use crate::domain::membership::{ExistingMembership, FormattedMembership};
use crate::domain::types::{
    ContactId, ContactType, DedupeRuleMode, ImportStatus, MembershipId,
};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

// ==========================================
// FieldMetadataStore Trait
// ==========================================
// 用途: 读取可导入字段元数据（含自定义字段）
// 实现者: SqliteImportRepository
#[async_trait]
pub trait FieldMetadataStore: Send + Sync {
    /// 读取某联系人类型下的可导入字段
    ///
    /// # 返回
    /// - 会员原生字段 + 联系人匹配字段 + 会员自定义字段
    /// - 不含 "do not import" 哨兵（由 FieldCatalog 补充）
    async fn importable_fields(&self, contact_type: ContactType)
        -> RepositoryResult<Vec<ImportField>>;
}

// ==========================================
// MembershipStore Trait
// ==========================================
// 用途: 会员读写
// 实现者: SqliteImportRepository
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// 按 id 读取会员快照
    ///
    /// # 返回
    /// - Ok(Some): 会员存在
    /// - Ok(None): 会员不存在
    async fn get(&self, id: MembershipId) -> RepositoryResult<Option<ExistingMembership>>;

    /// 新建会员（ContactRef::New 时在同一事务内先建联系人）
    ///
    /// # 返回
    /// - Ok(MembershipId): 新会员 id
    async fn create(&self, record: &FormattedMembership) -> RepositoryResult<MembershipId>;

    /// 更新会员（record.id 必须为 Some）
    async fn update(&self, record: &FormattedMembership) -> RepositoryResult<MembershipId>;
}

// ==========================================
// ContactMatcher Trait
// ==========================================
// 用途: 按判重规则匹配联系人
// 实现者: SqliteImportRepository
#[async_trait]
pub trait ContactMatcher: Send + Sync {
    /// 判重规则字段（有序）
    async fn rule_fields(
        &self,
        contact_type: ContactType,
        mode: DedupeRuleMode,
    ) -> RepositoryResult<Vec<String>>;

    /// 查找与给定联系人字段重复的联系人
    ///
    /// # 返回
    /// - 0 / 1 / 多个联系人 id
    async fn find_duplicates(
        &self,
        contact_fields: &BTreeMap<String, FieldValue>,
        contact_type: ContactType,
        mode: DedupeRuleMode,
    ) -> RepositoryResult<Vec<ContactId>>;
}

// ==========================================
// ContactStore Trait
// ==========================================
// 用途: 联系人存在性与外部标识查询
// 实现者: SqliteImportRepository
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// 按外部标识查找联系人
    async fn find_by_external_identifier(
        &self,
        external_identifier: &str,
    ) -> RepositoryResult<Option<ContactId>>;

    /// 查询联系人是否存在
    ///
    /// # 返回
    /// - Ok(Some(contact_type)): 存在且返回其类型
    /// - Ok(None): 不存在
    async fn contact_type_of(&self, contact_id: ContactId)
        -> RepositoryResult<Option<ContactType>>;
}

// ==========================================
// ImportProgressSink Trait
// ==========================================
// 用途: 行级导入结果的持久化日志（UI 层查询）
// 实现者: SqliteImportRepository
#[async_trait]
pub trait ImportProgressSink: Send + Sync {
    /// 记录行结果（同一 job/行号重复写入时覆盖）
    async fn set_row_status(
        &self,
        job_id: &str,
        row_number: usize,
        status: ImportStatus,
        message: &str,
        created_id: Option<i64>,
    ) -> RepositoryResult<()>;

    /// 已完成（IMPORTED/DUPLICATE）的行号，用于断点续跑
    async fn finished_rows(&self, job_id: &str) -> RepositoryResult<HashSet<usize>>;
}
