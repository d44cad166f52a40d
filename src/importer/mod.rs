// ==========================================
// 会员导入引擎 - 导入层
// ==========================================
// 职责: 原始行 → 会员记录的逐行对账管道
// 支持: CSV, Excel
// ==========================================

// 模块声明
pub mod contact_resolver;
pub mod data_cleaner;
pub mod error;
pub mod field_catalog;
pub mod file_parser;
pub mod membership_importer_impl;
pub mod membership_importer_trait;
pub mod row_mapper;
pub mod status_calculator;
pub mod validator;

// 重导出核心类型
pub use contact_resolver::{
    describe_contact, ContactResolution, ContactResolutionLocks, ContactResolver,
};
pub use data_cleaner::{DataCleaner, MembershipRowValues};
pub use error::{ImportError, ImportResult};
pub use field_catalog::{FieldCache, FieldCatalog};
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use membership_importer_impl::{ImportCollaborators, MembershipImporterImpl};
pub use row_mapper::{remove_empty_values, RowMapper};
pub use status_calculator::{
    explicit_status, first_present, formatted_dates, reconcile_status, resolve_date_inputs,
    DateInputs, MembershipStatusCalculator, StatusCalculation,
};
pub use validator::Validator;

// 重导出 Trait 接口
pub use membership_importer_trait::{
    number_rows, FileParser, ImportCancelHandle, MembershipImporter, NumberedRow,
};
