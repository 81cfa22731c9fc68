use std::sync::{Arc, OnceLock};

use crate::Searcher;
use crate::config::{DataDir, SearchOptions};

/// 应用状态
pub struct AppState {
    /// 搜索器，后台加载完成后写入，之后只读
    searcher: OnceLock<Arc<Searcher>>,
    /// 数据目录
    pub data_dir: DataDir,
    /// 搜索配置选项
    pub search: SearchOptions,
}

impl AppState {
    /// 创建新的应用状态，此时搜索器尚未加载
    pub fn new(data_dir: DataDir, search: SearchOptions) -> Arc<Self> {
        Arc::new(AppState { searcher: OnceLock::new(), data_dir, search })
    }

    /// 使用已经加载好的搜索器创建应用状态
    pub fn with_searcher(data_dir: DataDir, search: SearchOptions, searcher: Searcher) -> Arc<Self> {
        let state = Self::new(data_dir, search);
        state.set_searcher(searcher);
        state
    }

    pub fn searcher(&self) -> Option<Arc<Searcher>> {
        self.searcher.get().cloned()
    }

    /// 写入搜索器，已经写入过时返回 false
    pub fn set_searcher(&self, searcher: Searcher) -> bool {
        self.searcher.set(Arc::new(searcher)).is_ok()
    }

    pub fn is_loaded(&self) -> bool {
        self.searcher.get().is_some()
    }
}
