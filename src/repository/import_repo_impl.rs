// ==========================================
// 会员导入引擎 - 导入协作方 Repository 实现
// ==========================================
// 职责: 基于 rusqlite 实现字段元数据、会员读写、联系人匹配、行状态日志
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::open_sqlite_connection;
use crate::domain::import::{FieldValue, ImportField};
use crate::domain::membership::{ContactRef, ExistingMembership, FormattedMembership};
use crate::domain::types::{
    ContactId, ContactType, DedupeRuleMode, EntityLabel, FieldDataType, ImportStatus,
    MembershipId,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_repo::{
    ContactMatcher, ContactStore, FieldMetadataStore, ImportProgressSink, MembershipStore,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// contact 表中允许参与匹配/新建的列
const CONTACT_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "organization_name",
    "household_name",
    "email",
    "external_identifier",
];

/// 行状态日志中的一条记录
#[derive(Debug, Clone, PartialEq)]
pub struct RowStatusRecord {
    pub row_number: usize,
    pub status: ImportStatus,
    pub message: String,
    pub entity_id: Option<i64>,
}

// ==========================================
// SqliteImportRepository
// ==========================================
pub struct SqliteImportRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportRepository {
    /// 创建新的 Repository 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（与 ConfigManager / 规则仓储共享连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询某批次的全部行状态（按行号排序）
    pub fn list_row_statuses(&self, job_id: &str) -> RepositoryResult<Vec<RowStatusRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT row_number, status, message, entity_id
            FROM import_row_status
            WHERE job_id = ?1
            ORDER BY row_number
            "#,
        )?;

        let raw = stmt
            .query_map(params![job_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(row_number, status, message, entity_id)| {
                let status = status
                    .parse::<ImportStatus>()
                    .map_err(|message| RepositoryError::FieldValueError {
                        field: "status".to_string(),
                        message,
                    })?;
                Ok(RowStatusRecord {
                    row_number: row_number as usize,
                    status,
                    message,
                    entity_id,
                })
            })
            .collect()
    }

    /// 读取判重规则字段（未配置时使用默认规则）
    fn load_rule_fields(
        conn: &Connection,
        contact_type: ContactType,
        mode: DedupeRuleMode,
    ) -> RepositoryResult<Vec<String>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT field_name FROM dedupe_rule_field
            WHERE contact_type = ?1 AND used = ?2
            ORDER BY weight DESC, field_name
            "#,
        )?;
        let fields = stmt
            .query_map(params![contact_type.as_str(), mode.as_str()], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if !fields.is_empty() {
            return Ok(fields);
        }

        let defaults: &[&str] = match contact_type {
            ContactType::Individual => &["email"],
            ContactType::Organization => &["organization_name", "email"],
            ContactType::Household => &["household_name", "email"],
        };
        Ok(defaults.iter().map(|f| f.to_string()).collect())
    }

    fn insert_contact_tx(
        tx: &Transaction,
        contact_type: ContactType,
        fields: &BTreeMap<String, String>,
    ) -> RepositoryResult<ContactId> {
        let mut columns = vec!["contact_type".to_string()];
        let mut values = vec![contact_type.as_str().to_string()];
        for (name, value) in fields {
            if CONTACT_COLUMNS.contains(&name.as_str()) {
                columns.push(name.clone());
                values.push(value.clone());
            }
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO contact ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );
        tx.execute(&sql, params_from_iter(values.iter()))?;
        Ok(tx.last_insert_rowid())
    }

    fn write_custom_values_tx(
        tx: &Transaction,
        membership_id: MembershipId,
        custom: &BTreeMap<String, String>,
    ) -> RepositoryResult<()> {
        let mut stmt = tx.prepare(
            r#"
            INSERT OR REPLACE INTO membership_custom_value (membership_id, custom_field_id, value)
            VALUES (?1, ?2, ?3)
            "#,
        )?;
        for (key, value) in custom {
            let field_id = custom_field_id(key).ok_or_else(|| RepositoryError::FieldValueError {
                field: key.clone(),
                message: "custom field key must look like custom_<id>".to_string(),
            })?;
            stmt.execute(params![membership_id, field_id, value])?;
        }
        Ok(())
    }
}

fn required_status(record: &FormattedMembership) -> RepositoryResult<i64> {
    record
        .status_id
        .ok_or_else(|| RepositoryError::FieldValueError {
            field: "status_id".to_string(),
            message: "membership status is required".to_string(),
        })
}

fn custom_field_id(key: &str) -> Option<i64> {
    key.strip_prefix("custom_").and_then(|id| id.parse().ok())
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_stored_date(raw: Option<String>) -> Option<NaiveDate> {
    raw.and_then(|v| NaiveDate::parse_from_str(v.get(..10).unwrap_or(&v), "%Y-%m-%d").ok())
}

/// 会员原生可导入字段
pub fn membership_native_fields() -> Vec<ImportField> {
    use EntityLabel::Membership as M;
    vec![
        ImportField::new(M, "id", "Membership ID", FieldDataType::Integer),
        ImportField::new(M, "contact_id", "Contact ID (match to contact)", FieldDataType::Integer),
        ImportField::new(M, "membership_type_id", "Membership Type", FieldDataType::Integer).required(),
        ImportField::new(M, "join_date", "Member Since", FieldDataType::Date),
        ImportField::new(M, "start_date", "Membership Start Date", FieldDataType::Date),
        ImportField::new(M, "end_date", "Membership Expiration Date", FieldDataType::Date),
        ImportField::new(M, "status_id", "Membership Status", FieldDataType::Integer),
        ImportField::new(M, "is_override", "Status Override", FieldDataType::Boolean),
        ImportField::new(M, "source", "Membership Source", FieldDataType::String),
    ]
}

/// 联系人匹配字段（随联系人类型变化）
pub fn contact_matching_fields(contact_type: ContactType) -> Vec<ImportField> {
    use EntityLabel::Contact as C;
    let mut fields = match contact_type {
        ContactType::Individual => vec![
            ImportField::new(C, "first_name", "First Name", FieldDataType::String),
            ImportField::new(C, "last_name", "Last Name", FieldDataType::String),
        ],
        ContactType::Organization => vec![ImportField::new(
            C,
            "organization_name",
            "Organization Name",
            FieldDataType::String,
        )],
        ContactType::Household => vec![ImportField::new(
            C,
            "household_name",
            "Household Name",
            FieldDataType::String,
        )],
    };
    fields.push(ImportField::new(C, "email", "Email", FieldDataType::Email));
    fields.push(ImportField::new(
        C,
        "external_identifier",
        "External Identifier",
        FieldDataType::String,
    ));
    fields
}

#[async_trait]
impl FieldMetadataStore for SqliteImportRepository {
    async fn importable_fields(
        &self,
        contact_type: ContactType,
    ) -> RepositoryResult<Vec<ImportField>> {
        let mut fields = contact_matching_fields(contact_type);
        fields.extend(membership_native_fields());

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, label, data_type, is_required
            FROM membership_custom_field
            WHERE is_active = 1
            ORDER BY id
            "#,
        )?;
        let custom = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? != 0,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (id, label, data_type, is_required) in custom {
            let name = format!("custom_{}", id);
            let data_type = data_type.parse::<FieldDataType>().map_err(|message| {
                RepositoryError::FieldValueError {
                    field: name.clone(),
                    message,
                }
            })?;
            let mut field = ImportField::new(EntityLabel::Membership, &name, &label, data_type);
            field.is_required = is_required;
            fields.push(field);
        }

        Ok(fields)
    }
}

#[async_trait]
impl MembershipStore for SqliteImportRepository {
    async fn get(&self, id: MembershipId) -> RepositoryResult<Option<ExistingMembership>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                r#"
                SELECT id, contact_id, membership_type_id, join_date, start_date, end_date,
                       status_id, is_override
                FROM membership WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, Option<i64>>(6)?,
                        row.get::<_, i64>(7)? != 0,
                    ))
                },
            )
            .optional()?;

        Ok(raw.map(
            |(id, contact_id, membership_type_id, join, start, end, status_id, is_override)| {
                ExistingMembership {
                    id,
                    contact_id,
                    membership_type_id,
                    join_date: parse_stored_date(join),
                    start_date: parse_stored_date(start),
                    end_date: parse_stored_date(end),
                    status_id,
                    is_override,
                }
            },
        ))
    }

    async fn create(&self, record: &FormattedMembership) -> RepositoryResult<MembershipId> {
        let status_id = required_status(record)?;
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let contact_id = match &record.contact {
            ContactRef::Existing(id) => *id,
            ContactRef::New(new_contact) => {
                let id = Self::insert_contact_tx(&tx, new_contact.contact_type, &new_contact.fields)?;
                debug!(contact_id = id, "新建联系人");
                id
            }
        };

        tx.execute(
            r#"
            INSERT INTO membership (
                contact_id, membership_type_id, join_date, start_date, end_date,
                status_id, is_override, source
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                contact_id,
                record.membership_type_id,
                format_date(record.join_date),
                format_date(record.start_date),
                format_date(record.end_date),
                status_id,
                record.is_override as i32,
                record.source,
            ],
        )?;
        let membership_id = tx.last_insert_rowid();

        Self::write_custom_values_tx(&tx, membership_id, &record.custom)?;

        tx.commit()?;
        Ok(membership_id)
    }

    async fn update(&self, record: &FormattedMembership) -> RepositoryResult<MembershipId> {
        let id = record.id.ok_or_else(|| {
            RepositoryError::InternalError("update requires a membership id".to_string())
        })?;
        let status_id = required_status(record)?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let contact_id = match &record.contact {
            ContactRef::Existing(cid) => *cid,
            ContactRef::New(new_contact) => {
                Self::insert_contact_tx(&tx, new_contact.contact_type, &new_contact.fields)?
            }
        };

        let changed = tx.execute(
            r#"
            UPDATE membership SET
                contact_id = ?1, membership_type_id = ?2, join_date = ?3, start_date = ?4,
                end_date = ?5, status_id = ?6, is_override = ?7,
                source = COALESCE(?8, source), updated_at = datetime('now')
            WHERE id = ?9
            "#,
            params![
                contact_id,
                record.membership_type_id,
                format_date(record.join_date),
                format_date(record.start_date),
                format_date(record.end_date),
                status_id,
                record.is_override as i32,
                record.source,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Membership".to_string(),
                id: id.to_string(),
            });
        }

        Self::write_custom_values_tx(&tx, id, &record.custom)?;

        tx.commit()?;
        Ok(id)
    }
}

#[async_trait]
impl ContactMatcher for SqliteImportRepository {
    async fn rule_fields(
        &self,
        contact_type: ContactType,
        mode: DedupeRuleMode,
    ) -> RepositoryResult<Vec<String>> {
        let conn = self.lock()?;
        Self::load_rule_fields(&conn, contact_type, mode)
    }

    /// 规则字段中行内已提供的全部字段需同时匹配（忽略大小写）；
    /// 行内没有任何规则字段时退化为外部标识精确匹配
    async fn find_duplicates(
        &self,
        contact_fields: &BTreeMap<String, FieldValue>,
        contact_type: ContactType,
        mode: DedupeRuleMode,
    ) -> RepositoryResult<Vec<ContactId>> {
        let conn = self.lock()?;
        let rule_fields = Self::load_rule_fields(&conn, contact_type, mode)?;

        let mut clauses = Vec::new();
        let mut values = vec![contact_type.as_str().to_string()];
        for field in rule_fields.iter().map(|f| f.trim()) {
            if !CONTACT_COLUMNS.contains(&field) {
                continue;
            }
            let value = contact_fields
                .get(field)
                .and_then(|v| v.first_text(field))
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(value) = value {
                values.push(value.to_string());
                clauses.push(format!("lower({}) = lower(?{})", field, values.len()));
            }
        }

        if clauses.is_empty() {
            let external = contact_fields
                .get("external_identifier")
                .and_then(|v| v.first_text("external_identifier"))
                .map(str::trim)
                .filter(|v| !v.is_empty());
            match external {
                Some(ext) => {
                    values.push(ext.to_string());
                    clauses.push(format!("external_identifier = ?{}", values.len()));
                }
                None => return Ok(Vec::new()),
            }
        }

        let sql = format!(
            "SELECT id FROM contact WHERE contact_type = ?1 AND {} ORDER BY id",
            clauses.join(" AND ")
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params_from_iter(values.iter()), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

#[async_trait]
impl ContactStore for SqliteImportRepository {
    async fn find_by_external_identifier(
        &self,
        external_identifier: &str,
    ) -> RepositoryResult<Option<ContactId>> {
        let conn = self.lock()?;
        let id = conn
            .query_row(
                "SELECT id FROM contact WHERE external_identifier = ?1",
                params![external_identifier.trim()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id)
    }

    async fn contact_type_of(
        &self,
        contact_id: ContactId,
    ) -> RepositoryResult<Option<ContactType>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT contact_type FROM contact WHERE id = ?1",
                params![contact_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        raw.map(|t| {
            t.parse::<ContactType>()
                .map_err(|message| RepositoryError::FieldValueError {
                    field: "contact_type".to_string(),
                    message,
                })
        })
        .transpose()
    }
}

#[async_trait]
impl ImportProgressSink for SqliteImportRepository {
    async fn set_row_status(
        &self,
        job_id: &str,
        row_number: usize,
        status: ImportStatus,
        message: &str,
        created_id: Option<i64>,
    ) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO import_row_status (job_id, row_number, status, message, entity_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(job_id, row_number) DO UPDATE SET
                status = excluded.status,
                message = excluded.message,
                entity_id = excluded.entity_id,
                updated_at = datetime('now')
            "#,
            params![job_id, row_number as i64, status.as_str(), message, created_id],
        )?;
        Ok(())
    }

    async fn finished_rows(&self, job_id: &str) -> RepositoryResult<HashSet<usize>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT row_number FROM import_row_status
            WHERE job_id = ?1 AND status IN ('IMPORTED', 'DUPLICATE')
            "#,
        )?;
        let rows = stmt
            .query_map(params![job_id], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(|r| r as usize).collect())
    }
}
