// ==========================================
// 会员导入引擎 - 命令行入口
// ==========================================
// 用法:
//   member-import <db_path|-> <input_file> <mapping.json> [job_id]
//
// - db_path 为 "-" 时使用用户数据目录下的默认数据库
// - job_id 省略时生成新的 UUID；传入已有 job_id 可断点续跑
// - Ctrl-C 在当前行处理完后停止
// ==========================================

use anyhow::{bail, Context, Result};
use member_import::config::ConfigManager;
use member_import::db::{init_schema, open_sqlite_connection};
use member_import::domain::types::ImportStatus;
use member_import::importer::{
    ContactResolutionLocks, FieldCache, ImportCancelHandle, ImportCollaborators,
    MembershipImporter, MembershipImporterImpl, RowMapper,
};
use member_import::repository::{SqliteImportRepository, SqliteMembershipRules};
use member_import::{logging, ImportOptions, APP_NAME, VERSION};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const USAGE: &str = "usage: member-import <db_path|-> <input_file> <mapping.json> [job_id]";

/// 默认数据库路径
///
/// 优先级: MEMBER_IMPORT_DB_PATH → 用户数据目录 → 当前目录
fn default_db_path() -> Result<String> {
    if let Ok(path) = std::env::var("MEMBER_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(trimmed.to_string());
        }
    }

    let mut path = PathBuf::from("./member_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("member-import");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data dir {}", dir.display()))?;
        path = dir.join("member_import.db");
    }
    Ok(path.to_string_lossy().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!(USAGE);
    }

    let db_path = match args[0].as_str() {
        "-" => default_db_path()?,
        other => other.to_string(),
    };
    let input_file = Path::new(&args[1]);
    let mapping_file = Path::new(&args[2]);
    let job_id = args
        .get(3)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::info!("{} v{}", APP_NAME, VERSION);
    tracing::info!(db_path = %db_path, job_id = %job_id, "opening database");

    let conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("failed to open database {}", db_path))?;
    init_schema(&conn).context("failed to initialise schema")?;
    let conn = Arc::new(Mutex::new(conn));

    // 配置（作业级覆写优先）
    let config = ConfigManager::from_connection(conn.clone())?.with_job_scope(job_id.clone());
    let options = ImportOptions::load(job_id.clone(), &config).await?;
    tracing::debug!(snapshot = %config.get_config_snapshot()?, "effective configuration");

    let mapper = RowMapper::from_json_file(mapping_file)
        .with_context(|| format!("failed to load mapping {}", mapping_file.display()))?;

    // 协作方共享同一连接
    let repo = Arc::new(SqliteImportRepository::from_connection(conn.clone()));
    let rules = Arc::new(SqliteMembershipRules::from_connection(conn.clone()));
    let collaborators = ImportCollaborators {
        field_store: repo.clone(),
        memberships: repo.clone(),
        contact_matcher: repo.clone(),
        contacts: repo.clone(),
        date_rules: rules.clone(),
        status_rules: rules,
        progress: repo.clone(),
    };

    let importer = MembershipImporterImpl::new(
        collaborators,
        options,
        mapper.mapping().clone(),
        Arc::new(FieldCache::new()),
        Arc::new(ContactResolutionLocks::new()),
    );

    let cancel = ImportCancelHandle::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current row");
                cancel.cancel();
            }
        });
    }

    let summary = importer
        .import_file(input_file, &cancel)
        .await
        .with_context(|| format!("import of {} failed", input_file.display()))?;

    println!("job_id={}", summary.job_id);
    println!(
        "total={} imported={} errors={} duplicates={} already_finished={} cancelled={} elapsed_ms={}",
        summary.total_rows,
        summary.imported,
        summary.errors,
        summary.duplicates,
        summary.already_finished,
        summary.cancelled,
        summary.elapsed_ms
    );

    for record in repo.list_row_statuses(&summary.job_id)? {
        if record.status != ImportStatus::Imported {
            println!("row {} [{}] {}", record.row_number, record.status, record.message);
        }
    }

    Ok(())
}
