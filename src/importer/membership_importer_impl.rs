// ==========================================
// 会员导入引擎 - 会员导入器实现（逐行编排）
// ==========================================
// 职责: 整合导入流程，从原始行到会员落库
// 流程: 映射 → 校验 → 解析（已有会员 / 联系人） → 日期与状态 → 落库 → 行状态
// 状态机: Mapped → Validated → Resolved → DatesCalculated → Committed
//         失败终态 Rejected（ERROR）/ Skipped（联系人多重匹配，ERROR）
// 红线:
// - 每行恰好一个结果、恰好一次 set_row_status
// - 单行失败不中断批次；失败行不写入任何业务数据
// - 行状态写入失败则停止批次（否则续跑时会重复落库）
// ==========================================

use crate::domain::import::{
    ColumnMapping, ImportField, ImportOptions, ImportOutcome, ImportSummary, MappedRow,
};
use crate::domain::membership::{
    ContactRef, ExistingMembership, FormattedMembership, NewContact,
};
use crate::domain::types::{ContactId, EntityLabel, OnDuplicate};
use crate::importer::contact_resolver::{
    ContactResolution, ContactResolutionLocks, ContactResolver, LockedResolution,
};
use crate::importer::data_cleaner::DataCleaner;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_catalog::{FieldCache, FieldCatalog};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::membership_importer_trait::{
    FileParser, ImportCancelHandle, MembershipImporter, NumberedRow,
};
use crate::importer::row_mapper::{remove_empty_values, RowMapper};
use crate::importer::status_calculator::{
    explicit_status, reconcile_status, resolve_date_inputs, MembershipStatusCalculator,
};
use crate::importer::validator::Validator;
use crate::repository::import_repo::{
    ContactMatcher, ContactStore, FieldMetadataStore, ImportProgressSink, MembershipStore,
};
use crate::repository::membership_rules_repo::{MembershipStatusRules, MembershipTypeDateRules};
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// ImportCollaborators - 外部协作方集合
// ==========================================
#[derive(Clone)]
pub struct ImportCollaborators {
    pub field_store: Arc<dyn FieldMetadataStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub contact_matcher: Arc<dyn ContactMatcher>,
    pub contacts: Arc<dyn ContactStore>,
    pub date_rules: Arc<dyn MembershipTypeDateRules>,
    pub status_rules: Arc<dyn MembershipStatusRules>,
    pub progress: Arc<dyn ImportProgressSink>,
}

/// 单行成功结果
enum RowSuccess {
    Imported(i64),
    Duplicate(String),
}

// ==========================================
// MembershipImporterImpl
// ==========================================
pub struct MembershipImporterImpl {
    options: ImportOptions,

    // 导入组件
    catalog: FieldCatalog,
    mapper: RowMapper,
    cleaner: DataCleaner,
    validator: Validator,
    resolver: ContactResolver,
    calculator: MembershipStatusCalculator,
    file_parser: Box<dyn FileParser>,

    // 数据访问层
    memberships: Arc<dyn MembershipStore>,
    contacts: Arc<dyn ContactStore>,
    progress: Arc<dyn ImportProgressSink>,

    // 状态参考日期（None = 每行取今天）
    as_of: Option<NaiveDate>,
}

impl MembershipImporterImpl {
    /// 创建新的 MembershipImporter 实例
    ///
    /// # 参数
    /// - collaborators: 存储/匹配/规则/行状态协作方
    /// - options: 本次运行参数（批次号、联系人类型、重复策略等）
    /// - mapping: 列映射
    /// - field_cache: 字段元数据缓存（可在多个导入器间共享）
    /// - locks: 联系人匹配键锁表（并行工作者共享）
    pub fn new(
        collaborators: ImportCollaborators,
        options: ImportOptions,
        mapping: ColumnMapping,
        field_cache: Arc<FieldCache>,
        locks: Arc<ContactResolutionLocks>,
    ) -> Self {
        let catalog = FieldCatalog::new(collaborators.field_store, field_cache);
        let validator = Validator::new(
            options.date_format,
            catalog.required_fields(),
            options.is_update_existing(),
        );
        Self {
            catalog,
            mapper: RowMapper::new(mapping),
            cleaner: DataCleaner::new(options.date_format),
            validator,
            resolver: ContactResolver::new(collaborators.contact_matcher, locks),
            calculator: MembershipStatusCalculator::new(
                collaborators.date_rules,
                collaborators.status_rules,
            ),
            file_parser: Box::new(UniversalFileParser),
            memberships: collaborators.memberships,
            contacts: collaborators.contacts,
            progress: collaborators.progress,
            options,
            as_of: None,
        }
    }

    /// 固定状态参考日期
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_file_parser(mut self, file_parser: Box<dyn FileParser>) -> Self {
        self.file_parser = file_parser;
        self
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    fn as_of(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// 映射并去除空值（Mapped）
    fn map_row(&self, raw_row: &[String], row_number: usize) -> MappedRow {
        let mut row = self.mapper.map(raw_row, row_number);
        remove_empty_values(&mut row);
        row
    }

    /// 行内 id 对应的已有会员（id 格式错误时留给校验报告）
    async fn load_existing(&self, row: &MappedRow) -> ImportResult<Option<ExistingMembership>> {
        let id = match row
            .membership_text("id")
            .and_then(|v| self.cleaner.parse_integer(v))
        {
            Some(id) => id,
            None => return Ok(None),
        };
        match self.memberships.get(id).await? {
            Some(existing) => Ok(Some(existing)),
            None => Err(ImportError::MembershipNotFound(id)),
        }
    }

    /// 校验（Validated）
    async fn validate_mapped(
        &self,
        row: &MappedRow,
    ) -> ImportResult<(Arc<Vec<ImportField>>, Option<ExistingMembership>)> {
        let fields = self.catalog.fields(self.options.contact_type).await?;
        let existing = self.load_existing(row).await?;
        self.validator.validate(row, &fields, existing.as_ref())?;
        Ok((fields, existing))
    }

    /// 联系人 id 必须存在且类型与本次导入一致
    async fn check_contact_id(&self, contact_id: ContactId) -> ImportResult<()> {
        match self.contacts.contact_type_of(contact_id).await? {
            None => Err(ImportError::InvalidContactId {
                contact_id: contact_id.to_string(),
                reason: "no contact exists with this id".to_string(),
            }),
            Some(contact_type) if contact_type != self.options.contact_type => {
                Err(ImportError::InvalidContactId {
                    contact_id: contact_id.to_string(),
                    reason: format!(
                        "contact is of type {} but this import expects {}",
                        contact_type, self.options.contact_type
                    ),
                })
            }
            Some(_) => Ok(()),
        }
    }

    /// 外部标识必须指向同一联系人
    async fn check_external_identifier(
        &self,
        external_identifier: &str,
        contact_id: ContactId,
    ) -> ImportResult<()> {
        let found = self
            .contacts
            .find_by_external_identifier(external_identifier)
            .await?;
        if found != Some(contact_id) {
            return Err(ImportError::ContactIdentifierMismatch {
                external_identifier: external_identifier.to_string(),
                contact_id,
            });
        }
        Ok(())
    }

    fn new_contact(&self, row: &MappedRow) -> NewContact {
        let fields = row
            .entity(EntityLabel::Contact)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|(name, value)| {
                        value
                            .first_text(name)
                            .map(|v| (name.clone(), v.trim().to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();
        NewContact {
            contact_type: self.options.contact_type,
            fields,
        }
    }

    /// 单行管道；任何失败都以 Err 返回，由 process_row 统一记录
    async fn run_row(&self, raw_row: &[String], row_number: usize) -> ImportResult<RowSuccess> {
        // === Mapped ===
        let row = self.map_row(raw_row, row_number);

        // === Validated ===
        let (_fields, existing) = self.validate_mapped(&row).await?;
        let values = self.cleaner.membership_values(&row)?;
        debug!(row_number, has_existing = existing.is_some(), "行校验通过");

        if let (Some(existing), OnDuplicate::Skip) = (&existing, self.options.on_duplicate) {
            return Ok(RowSuccess::Duplicate(format!(
                "Membership {} already exists; skipped",
                existing.id
            )));
        }

        if let Some(contact_id) = values.contact_id {
            self.check_contact_id(contact_id).await?;
        }

        // === Resolved ===
        let inputs = resolve_date_inputs(&values, existing.as_ref());
        let membership_type_id = inputs.membership_type_id.ok_or_else(|| {
            ImportError::MissingRequiredFields("Membership Type".to_string())
        })?;

        // 匹配键锁持有到落库完成
        let known_contact_id = values
            .contact_id
            .or_else(|| existing.as_ref().map(|e| e.contact_id));
        let (contact, _resolution_lock): (ContactRef, Option<LockedResolution>) =
            match known_contact_id {
                None => {
                    let locked = self
                        .resolver
                        .resolve_locked(&row.contact_fields(), self.options.contact_type)
                        .await?;
                    let contact = match &locked.resolution {
                        ContactResolution::Unique(id) => ContactRef::Existing(*id),
                        ContactResolution::Ambiguous(ids) => {
                            return Err(ImportError::AmbiguousMatch {
                                contact_ids: ids.clone(),
                            })
                        }
                        ContactResolution::NotFound { description } => {
                            if !self.options.create_missing_contacts {
                                return Err(ImportError::ContactNotFound {
                                    description: description.clone(),
                                });
                            }
                            debug!(row_number, "未匹配到联系人，将新建");
                            ContactRef::New(self.new_contact(&row))
                        }
                    };
                    (contact, Some(locked))
                }
                Some(contact_id) => {
                    if let Some(external_identifier) = &values.external_identifier {
                        self.check_external_identifier(external_identifier, contact_id)
                            .await?;
                    }
                    (ContactRef::Existing(contact_id), None)
                }
            };

        // === DatesCalculated ===
        let explicit_status_id =
            explicit_status(values.status_id, existing.as_ref(), inputs.is_override);
        let mut formatted = FormattedMembership {
            id: existing.as_ref().map(|e| e.id),
            contact,
            membership_type_id,
            join_date: inputs.join_date,
            start_date: inputs.start_date,
            end_date: inputs.end_date,
            status_id: explicit_status_id,
            is_override: inputs.is_override,
            exclude_is_admin: !inputs.is_override,
            source: values.source.clone(),
            custom: values.custom.clone(),
            skip_recent_view: true,
        };

        let calculation = self
            .calculator
            .calculate(membership_type_id, &inputs, self.as_of(), Some(&formatted))
            .await?;
        formatted.join_date = calculation.dates.join_date;
        formatted.start_date = calculation.dates.start_date;
        formatted.end_date = calculation.dates.end_date;
        formatted.exclude_is_admin = calculation.exclude_admin;

        let status_id = reconcile_status(
            explicit_status_id,
            calculation.status.as_ref(),
            inputs.is_override,
        )?
        .ok_or(ImportError::MissingStatus)?;
        formatted.status_id = Some(status_id);

        // === Committed ===
        let membership_id = match formatted.id {
            Some(_) => self.memberships.update(&formatted).await?,
            None => self.memberships.create(&formatted).await?,
        };
        debug!(row_number, membership_id, status_id, "会员落库完成");

        Ok(RowSuccess::Imported(membership_id))
    }

    /// 记录行结果（恰好一次）；写入失败时返回 Err，不允许静默丢失进度
    async fn record(&self, outcome: &ImportOutcome) -> ImportResult<()> {
        self.progress
            .set_row_status(
                &self.options.job_id,
                outcome.row_number,
                outcome.status,
                &outcome.message,
                outcome.created_id,
            )
            .await
            .map_err(|source| {
                error!(
                    row_number = outcome.row_number,
                    error = %source,
                    "行状态写入失败，停止批次"
                );
                ImportError::ProgressNotRecorded {
                    row_number: outcome.row_number,
                    source,
                }
            })
    }

    /// 顺序处理一段行；abort 为并行工作者共享的停止标记
    async fn import_range(
        &self,
        rows: &[NumberedRow],
        cancel: &ImportCancelHandle,
        abort: Option<&ImportCancelHandle>,
    ) -> ImportResult<ImportSummary> {
        let start_time = Instant::now();
        let finished = self.progress.finished_rows(&self.options.job_id).await?;

        let mut summary = ImportSummary {
            job_id: self.options.job_id.clone(),
            total_rows: rows.len(),
            ..Default::default()
        };

        for (row_number, cells) in rows {
            if cancel.is_cancelled() {
                info!(row_number, "导入已取消");
                summary.cancelled = true;
                break;
            }
            if abort.is_some_and(|a| a.is_cancelled()) {
                debug!(row_number, "其他工作者已失败，停止");
                break;
            }
            if finished.contains(row_number) {
                summary.already_finished += 1;
                continue;
            }
            match self.process_row(cells, *row_number).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    if let Some(abort) = abort {
                        abort.cancel();
                    }
                    return Err(e);
                }
            }
        }

        summary.elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(
            imported = summary.imported,
            errors = summary.errors,
            duplicates = summary.duplicates,
            already_finished = summary.already_finished,
            cancelled = summary.cancelled,
            elapsed_ms = summary.elapsed_ms,
            "导入批次完成"
        );
        Ok(summary)
    }
}

#[async_trait]
impl MembershipImporter for MembershipImporterImpl {
    #[instrument(skip(self, raw_row), fields(job_id = %self.options.job_id))]
    async fn process_row(
        &self,
        raw_row: &[String],
        row_number: usize,
    ) -> ImportResult<ImportOutcome> {
        let outcome = match self.run_row(raw_row, row_number).await {
            Ok(RowSuccess::Imported(id)) => ImportOutcome::imported(row_number, id),
            Ok(RowSuccess::Duplicate(message)) => {
                info!(row_number, message = %message, "重复会员，跳过");
                ImportOutcome::duplicate(row_number, message)
            }
            Err(e) => {
                warn!(row_number, error = %e, "行导入失败");
                let final_state = e.final_state();
                ImportOutcome::error(row_number, e.to_string(), final_state)
            }
        };
        self.record(&outcome).await?;
        Ok(outcome)
    }

    async fn validate_row(&self, raw_row: &[String], row_number: usize) -> ImportResult<()> {
        let row = self.map_row(raw_row, row_number);
        self.validate_mapped(&row).await.map(|_| ())
    }

    #[instrument(skip(self, rows, cancel), fields(job_id = %self.options.job_id, rows = rows.len()))]
    async fn import_rows(
        &self,
        rows: &[NumberedRow],
        cancel: &ImportCancelHandle,
    ) -> ImportResult<ImportSummary> {
        self.import_range(rows, cancel, None).await
    }

    async fn import_rows_parallel(
        &self,
        rows: &[NumberedRow],
        cancel: &ImportCancelHandle,
    ) -> ImportResult<ImportSummary> {
        let workers = self.options.worker_count.max(1);
        if workers == 1 || rows.len() <= 1 {
            return self.import_rows(rows, cancel).await;
        }

        let start_time = Instant::now();
        let chunk_size = rows.len().div_ceil(workers);
        info!(workers, chunk_size, total = rows.len(), "并行导入开始");
        let abort = ImportCancelHandle::new();

        let results = join_all(
            rows.chunks(chunk_size)
                .map(|chunk| self.import_range(chunk, cancel, Some(&abort))),
        )
        .await;

        let mut summary = ImportSummary {
            job_id: self.options.job_id.clone(),
            ..Default::default()
        };
        for result in results {
            summary.merge(result?);
        }
        summary.elapsed_ms = start_time.elapsed().as_millis() as u64;
        Ok(summary)
    }

    async fn import_file(
        &self,
        file_path: &Path,
        cancel: &ImportCancelHandle,
    ) -> ImportResult<ImportSummary> {
        info!(file_path = %file_path.display(), "开始导入会员文件");
        let rows = self.file_parser.parse_to_rows(file_path)?;
        info!(total_rows = rows.len(), "文件解析完成");
        self.import_rows_parallel(&rows, cancel).await
    }
}
