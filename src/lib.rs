// ==========================================
// 会员导入引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 批量会员导入的逐行对账引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 日期/状态规则
pub mod engine;

// 导入层 - 逐行对账管道
pub mod importer;

// 配置层 - 导入参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ContactId, ContactType, DateFormat, ImportStatus, MembershipId, MembershipStatusId,
    MembershipTypeId, OnDuplicate, RowState,
};

// 领域实体
pub use domain::{
    ColumnMapping, ExistingMembership, FormattedMembership, ImportField, ImportOptions,
    ImportOutcome, ImportSummary, MappedColumn, MappedRow, StatusResult,
};

// 导入
pub use importer::{
    ImportCancelHandle, ImportCollaborators, ImportError, ImportResult, MembershipImporter,
    MembershipImporterImpl,
};

// 配置
pub use config::{ConfigManager, ImportConfigReader};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "member-import";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
