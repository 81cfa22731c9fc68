use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView1};
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::Catalog;
use crate::config::DataDir;
use crate::embeddings::read_embeddings;
use crate::encoder::Encoder;
use crate::error::SearchError;
use crate::index::EmbeddingIndex;
use crate::metrics;
use crate::query::Query;
use crate::utils::round_to;

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SearchResult {
    pub id: u64,
    pub filename: String,
    pub class_name: String,
    /// 余弦相似度，保留 4 位小数
    pub score: f32,
}

/// 搜索服务
///
/// 启动时加载一次目录和嵌入矩阵，之后只读
pub struct Searcher {
    catalog: Catalog,
    index: EmbeddingIndex,
    encoder: Arc<dyn Encoder>,
}

impl Searcher {
    /// 从数据目录加载目录与嵌入矩阵
    ///
    /// 两个文件缺一不可，且目录条目数必须等于矩阵行数
    pub fn open(data_dir: &DataDir, encoder: Arc<dyn Encoder>) -> Result<Self> {
        for path in [data_dir.metadata(), data_dir.embeddings()] {
            if !path.exists() {
                return Err(SearchError::MissingPrerequisite(path).into());
            }
        }

        let catalog = Catalog::load(data_dir.metadata())?;
        let matrix = read_embeddings(data_dir.embeddings())?;
        let searcher = Self::new(catalog, matrix, encoder)?;

        info!("搜索器初始化完成，共 {} 张图片，向量维度 {}", searcher.len(), searcher.dim());
        Ok(searcher)
    }

    /// 使用已经加载的数据创建搜索器
    pub fn new(catalog: Catalog, matrix: Array2<f32>, encoder: Arc<dyn Encoder>) -> Result<Self> {
        if catalog.len() != matrix.nrows() {
            return Err(
                SearchError::Misaligned { catalog: catalog.len(), rows: matrix.nrows() }.into()
            );
        }
        if catalog.is_empty() {
            warn!("图片目录为空，所有搜索都不会有结果");
        }
        Ok(Self { catalog, index: EmbeddingIndex::new(matrix), encoder })
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// 向量维度
    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    /// 编码查询并返回最相似的 top_k 张图片
    pub fn search(&self, query: &Query, top_k: usize) -> Result<Vec<SearchResult>> {
        check_top_k(top_k)?;

        let start = Instant::now();
        let vector = self.encoder.encode_query(query)?;
        let results = self.search_vector(vector.view(), top_k)?;
        let elapsed = start.elapsed();

        debug!(
            "{} 查询耗时 {:.2}ms，返回 {} 条结果",
            query.kind(),
            elapsed.as_secs_f64() * 1000.0,
            results.len()
        );
        metrics::inc_search_count(query.kind());
        metrics::observe_search_duration(query.kind(), elapsed.as_secs_f64());
        if let Some(best) = results.first() {
            metrics::observe_top_score(query.kind(), best.score);
        }

        Ok(results)
    }

    /// 直接使用查询向量搜索
    pub fn search_vector(&self, vector: ArrayView1<f32>, top_k: usize) -> Result<Vec<SearchResult>> {
        check_top_k(top_k)?;

        let neighbors = self.index.search(vector, top_k)?;
        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| {
                self.catalog.get(neighbor.row).map(|entry| SearchResult {
                    id: entry.id,
                    filename: entry.filename.clone(),
                    class_name: entry.class_name.clone(),
                    score: round_to(neighbor.score as f64, 4) as f32,
                })
            })
            .collect())
    }
}

fn check_top_k(top_k: usize) -> Result<(), SearchError> {
    if top_k == 0 {
        return Err(SearchError::invalid("top_k 至少为 1"));
    }
    Ok(())
}
