// ==========================================
// 会员导入引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod error;
pub mod import_repo;
pub mod import_repo_impl;
pub mod membership_rules_repo;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_repo::{
    ContactMatcher, ContactStore, FieldMetadataStore, ImportProgressSink, MembershipStore,
};
pub use import_repo_impl::{
    contact_matching_fields, membership_native_fields, RowStatusRecord, SqliteImportRepository,
};
pub use membership_rules_repo::{
    MembershipStatusRules, MembershipTypeDateRules, SqliteMembershipRules,
};
