// ==========================================
// 会员导入引擎 - 会员导入 Trait
// ==========================================
// 职责: 定义会员导入接口（不包含实现）
// ==========================================

use crate::domain::import::{ImportOutcome, ImportSummary};
use crate::importer::error::ImportResult;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// (行号, 按列顺序的单元格)
pub type NumberedRow = (usize, Vec<String>);

/// 为未编号的行分配连续行号
pub fn number_rows(rows: Vec<Vec<String>>, first_row_number: usize) -> Vec<NumberedRow> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, cells)| (first_row_number + idx, cells))
        .collect()
}

// ==========================================
// ImportCancelHandle - 协作式取消
// ==========================================
// 只在行与行之间检查，不会中断正在处理的行
#[derive(Debug, Clone, Default)]
pub struct ImportCancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl ImportCancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

// ==========================================
// MembershipImporter Trait
// ==========================================
// 用途: 会员导入主接口
// 实现者: MembershipImporterImpl
#[async_trait]
pub trait MembershipImporter: Send + Sync {
    /// 处理单行（映射 → 校验 → 解析 → 日期/状态 → 落库）
    ///
    /// # 返回
    /// - Ok(ImportOutcome): 恰好一个结果，行级失败也在其中
    /// - Err: 行结果未能写入行状态日志（调用方必须停止批次）
    async fn process_row(
        &self,
        raw_row: &[String],
        row_number: usize,
    ) -> ImportResult<ImportOutcome>;

    /// 仅校验，不落库（预览用）
    async fn validate_row(&self, raw_row: &[String], row_number: usize) -> ImportResult<()>;

    /// 顺序导入一批行
    ///
    /// # 说明
    /// - 已记录为 IMPORTED/DUPLICATE 的行跳过（断点续跑）
    /// - 每行之间检查取消
    /// - 行状态写入失败时立即返回 Err（已落库的行必须有进度记录）
    async fn import_rows(
        &self,
        rows: &[NumberedRow],
        cancel: &ImportCancelHandle,
    ) -> ImportResult<ImportSummary>;

    /// 按不相交的连续区间并行导入
    async fn import_rows_parallel(
        &self,
        rows: &[NumberedRow],
        cancel: &ImportCancelHandle,
    ) -> ImportResult<ImportSummary>;

    /// 从文件导入（CSV / Excel，首行为表头）
    async fn import_file(
        &self,
        file_path: &Path,
        cancel: &ImportCancelHandle,
    ) -> ImportResult<ImportSummary>;
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 文件解析为按列顺序的原始行
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// 解析文件（跳过表头与全空行）
    ///
    /// # 返回
    /// - Ok(Vec<NumberedRow>): 行号为文件中的物理行号（表头为第 1 行）
    fn parse_to_rows(&self, file_path: &Path) -> ImportResult<Vec<NumberedRow>>;
}
