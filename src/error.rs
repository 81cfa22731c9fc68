use std::path::PathBuf;

/// 搜索流程中可以被调用方区分处理的错误
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// 缺少 ingest / build 产生的文件
    #[error("缺少必要文件: {}", .0.display())]
    MissingPrerequisite(PathBuf),
    /// 请求参数不合法，不会进行任何计算
    #[error("参数错误: {0}")]
    InvalidArgument(String),
    /// 目录条目数与嵌入矩阵行数不一致
    #[error("数据未对齐: 目录共 {catalog} 条记录，嵌入矩阵共 {rows} 行")]
    Misaligned { catalog: usize, rows: usize },
    #[error("向量维度不匹配: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// 模型或索引尚未加载完成
    #[error("模型尚未加载")]
    Unavailable,
}

impl SearchError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
