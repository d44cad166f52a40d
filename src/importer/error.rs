// ==========================================
// 会员导入引擎 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 行级错误的 Display 文本即写入行状态日志的消息
// ==========================================

use crate::domain::types::{ContactId, MembershipId, RowState};
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 行级校验错误 =====
    #[error("Invalid value for field(s) : {}", join_messages(.0))]
    Validation(Vec<String>),

    #[error("Missing required fields: {0}")]
    MissingRequiredFields(String),

    // ===== 行级匹配错误 =====
    #[error("Multiple matching contact records detected for this row. The membership was not imported")]
    AmbiguousMatch { contact_ids: Vec<ContactId> },

    #[error("No matching Contact found for ({description})")]
    ContactNotFound { description: String },

    #[error("Invalid contact ID {contact_id}: {reason}")]
    InvalidContactId { contact_id: String, reason: String },

    #[error("Membership with id {0} does not exist. Record was not imported.")]
    MembershipNotFound(MembershipId),

    #[error("Mismatch of External ID:{external_identifier} and Contact Id:{contact_id}")]
    ContactIdentifierMismatch {
        external_identifier: String,
        contact_id: ContactId,
    },

    // ===== 行级状态错误 =====
    #[error("{}", status_mismatch_message(.explicit, .calculated))]
    StatusMismatch {
        explicit: String,
        calculated: Option<String>,
    },

    #[error("No membership status could be determined for this row. Record was not imported.")]
    MissingStatus,

    // ===== 协作方错误 =====
    #[error(transparent)]
    Collaborator(#[from] RepositoryError),

    /// 行结果未写入行状态日志（批次级错误，不作为行消息）
    #[error("Outcome of row {row_number} could not be recorded: {source}")]
    ProgressNotRecorded {
        row_number: usize,
        #[source]
        source: RepositoryError,
    },

    // ===== 文件相关错误 =====
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file format: {0} (expected .csv/.xlsx/.xls)")]
    UnsupportedFormat(String),

    #[error("File read failed: {0}")]
    FileReadError(String),

    #[error("CSV parse failed: {0}")]
    CsvParseError(String),

    #[error("Excel parse failed: {0}")]
    ExcelParseError(String),

    #[error("Column mapping invalid: {0}")]
    MappingConfigError(String),
}

impl ImportError {
    /// 行级错误对应的终止状态
    pub fn final_state(&self) -> RowState {
        match self {
            ImportError::AmbiguousMatch { .. } => RowState::Skipped,
            _ => RowState::Rejected,
        }
    }
}

fn join_messages(messages: &[String]) -> String {
    messages.join(",")
}

fn status_mismatch_message(explicit: &str, calculated: &Option<String>) -> String {
    match calculated {
        Some(name) => format!(
            "Status in import row ({}) does not match calculated status based on your configured Membership Status Rules ({}). Record was not imported.",
            explicit, name
        ),
        None => format!(
            "Status in import row ({}) does not match calculated status based on your configured Membership Status Rules. Record was not imported.",
            explicit
        ),
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::ExcelParseError(err.to_string())
    }
}

// 实现 From<serde_json::Error>（列映射配置）
impl From<serde_json::Error> for ImportError {
    fn from(err: serde_json::Error) -> Self {
        ImportError::MappingConfigError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
