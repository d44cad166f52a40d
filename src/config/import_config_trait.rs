// ==========================================
// 会员导入引擎 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::import::ImportOptions;
use crate::domain::types::{ContactType, DateFormat, OnDuplicate};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 导入的联系人类型
    ///
    /// # 默认值
    /// - Individual
    async fn get_contact_type(&self) -> RepositoryResult<ContactType>;

    /// 行内 id 指向已有会员时的处理方式
    ///
    /// # 返回
    /// - OnDuplicate::Update: 更新已有会员
    /// - OnDuplicate::Skip: 记为 DUPLICATE，不写入
    ///
    /// # 默认值
    /// - update
    async fn get_on_duplicate(&self) -> RepositoryResult<OnDuplicate>;

    /// 文件中的日期格式
    ///
    /// # 默认值
    /// - yyyy-mm-dd
    async fn get_date_format(&self) -> RepositoryResult<DateFormat>;

    /// 未匹配到联系人时是否新建
    ///
    /// # 默认值
    /// - false
    async fn get_create_missing_contacts(&self) -> RepositoryResult<bool>;

    /// 并行工作者数量
    ///
    /// # 默认值
    /// - 1
    async fn get_worker_count(&self) -> RepositoryResult<usize>;
}

impl ImportOptions {
    /// 从配置读取器生成本次运行参数快照
    pub async fn load(
        job_id: impl Into<String>,
        reader: &dyn ImportConfigReader,
    ) -> RepositoryResult<Self> {
        Ok(Self {
            job_id: job_id.into(),
            contact_type: reader.get_contact_type().await?,
            on_duplicate: reader.get_on_duplicate().await?,
            date_format: reader.get_date_format().await?,
            create_missing_contacts: reader.get_create_missing_contacts().await?,
            worker_count: reader.get_worker_count().await?,
        })
    }
}
