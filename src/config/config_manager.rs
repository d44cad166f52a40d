// ==========================================
// 会员导入引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 覆写顺序: 作业 scope → global → 内置默认值
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::db::open_sqlite_connection;
use crate::domain::types::{ContactType, DateFormat, OnDuplicate};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// ConfigScope - 配置作用域
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Global,                   // 全局
    Job { job_id: String },   // 单个导入作业
}

impl ConfigScope {
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::Job { job_id } => format!("job/{}", job_id),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
    job_scope: Option<ConfigScope>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)
            .map_err(|e| RepositoryError::DatabaseConnectionError(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            job_scope: None,
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let conn_guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self {
            conn,
            job_scope: None,
        })
    }

    /// 启用作业级覆写：读取时先查 job/{job_id}，再查 global
    pub fn with_job_scope(mut self, job_id: impl Into<String>) -> Self {
        self.job_scope = Some(ConfigScope::Job {
            job_id: job_id.into(),
        });
        self
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取指定 scope 的配置值（不做回退）
    pub fn get_scoped_value(
        &self,
        scope: &ConfigScope,
        key: &str,
    ) -> RepositoryResult<Option<String>> {
        let conn = self.lock()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope.scope_id(), key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 读取配置值（作业 scope 优先，回退 global）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        if let Some(scope) = &self.job_scope {
            if let Some(value) = self.get_scoped_value(scope, key)? {
                return Ok(Some(value));
            }
        }
        self.get_scoped_value(&ConfigScope::Global, key)
    }

    /// 读取配置值，带默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 解析枚举型配置，格式错误时告警并回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> RepositoryResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };
        match raw.parse::<T>() {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    error = %e,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 写入（覆盖）配置值
    pub fn set_config_value(
        &self,
        scope: &ConfigScope,
        key: &str,
        value: &str,
    ) -> RepositoryResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = datetime('now')",
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 获取生效配置的快照（JSON格式）
    ///
    /// # 说明
    /// - global 在前，作业 scope 覆盖同名键
    /// - 导入开始时写入日志，便于排查某次运行使用的参数
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let mut scopes = vec![ConfigScope::Global];
        if let Some(scope) = &self.job_scope {
            scopes.push(scope.clone());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for scope in &scopes {
            let rows = stmt.query_map(params![scope.scope_id()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (key, value) = row?;
                config_map.insert(key, value);
            }
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_contact_type(&self) -> RepositoryResult<ContactType> {
        self.get_parsed_or_default(config_keys::CONTACT_TYPE, ContactType::default())
    }

    async fn get_on_duplicate(&self) -> RepositoryResult<OnDuplicate> {
        self.get_parsed_or_default(config_keys::ON_DUPLICATE, OnDuplicate::default())
    }

    async fn get_date_format(&self) -> RepositoryResult<DateFormat> {
        self.get_parsed_or_default(config_keys::DATE_FORMAT, DateFormat::default())
    }

    async fn get_create_missing_contacts(&self) -> RepositoryResult<bool> {
        let value = self.get_config_or_default(config_keys::CREATE_MISSING_CONTACTS, "0")?;
        Ok(matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "y"
        ))
    }

    async fn get_worker_count(&self) -> RepositoryResult<usize> {
        let value = self.get_config_or_default(config_keys::WORKER_COUNT, "1")?;
        Ok(value.trim().parse::<usize>().unwrap_or(1).max(1))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 联系人
    pub const CONTACT_TYPE: &str = "import.contact_type";
    pub const CREATE_MISSING_CONTACTS: &str = "import.create_missing_contacts";

    // 已有会员处理方式（update / skip）
    pub const ON_DUPLICATE: &str = "import.on_duplicate";

    // 文件格式
    pub const DATE_FORMAT: &str = "import.date_format";

    // 并行度
    pub const WORKER_COUNT: &str = "import.worker_count";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::import::ImportOptions;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_nothing_configured() {
        let manager = manager();
        let options = ImportOptions::load("job-1", &manager).await.unwrap();
        assert_eq!(options, ImportOptions::new("job-1"));
    }

    #[tokio::test]
    async fn test_job_scope_overrides_global() {
        let manager = manager().with_job_scope("job-7");
        manager
            .set_config_value(&ConfigScope::Global, config_keys::ON_DUPLICATE, "skip")
            .unwrap();
        manager
            .set_config_value(&ConfigScope::Global, config_keys::WORKER_COUNT, "4")
            .unwrap();
        manager
            .set_config_value(
                &ConfigScope::Job {
                    job_id: "job-7".to_string(),
                },
                config_keys::WORKER_COUNT,
                "2",
            )
            .unwrap();

        assert_eq!(manager.get_on_duplicate().await.unwrap(), OnDuplicate::Skip);
        assert_eq!(manager.get_worker_count().await.unwrap(), 2);

        let snapshot: BTreeMap<String, String> =
            serde_json::from_str(&manager.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot[config_keys::WORKER_COUNT], "2");
        assert_eq!(snapshot[config_keys::ON_DUPLICATE], "skip");
    }

    #[tokio::test]
    async fn test_malformed_values_fall_back_to_defaults() {
        let manager = manager();
        manager
            .set_config_value(&ConfigScope::Global, config_keys::DATE_FORMAT, "julian")
            .unwrap();
        manager
            .set_config_value(&ConfigScope::Global, config_keys::WORKER_COUNT, "0")
            .unwrap();
        manager
            .set_config_value(&ConfigScope::Global, config_keys::CONTACT_TYPE, "Organization")
            .unwrap();

        assert_eq!(manager.get_date_format().await.unwrap(), DateFormat::YearMonthDay);
        assert_eq!(manager.get_worker_count().await.unwrap(), 1);
        assert_eq!(
            manager.get_contact_type().await.unwrap(),
            ContactType::Organization
        );
    }
}
