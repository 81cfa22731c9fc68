use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::SearchResult;
use crate::error::SearchError;
use crate::query::{Query, decode_image_base64};

/// 图片查询在响应中显示的查询内容
pub const IMAGE_QUERY_LABEL: &str = "[Image Search]";

/// 搜索请求参数，文本和图片至少提供一个，同时提供时以图片为准
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// 文本查询，支持多种语言
    #[serde(default)]
    pub query: String,
    /// base64 编码的图片，可以带有 data URI 前缀
    #[serde(default)]
    pub image_base64: String,
    /// 返回的结果数量
    #[schema(minimum = 1)]
    pub top_k: Option<i64>,
}

impl SearchRequest {
    /// 解析出查询内容
    pub fn to_query(&self) -> Result<Query, SearchError> {
        let image = match self.image_base64.trim() {
            "" => None,
            data => {
                let bytes = decode_image_base64(data)?;
                if bytes.is_empty() {
                    return Err(SearchError::invalid("图片数据为空"));
                }
                Some(bytes)
            }
        };
        Query::from_parts(Some(&self.query), image)
    }
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 文本查询内容，图片查询时为 `[Image Search]`
    pub query: String,
    pub results: Vec<SearchResult>,
    /// 搜索耗时，单位为毫秒
    pub latency_ms: f64,
}

/// 健康检查响应
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    /// 模型与索引是否已加载
    pub model_loaded: bool,
}

/// 错误响应
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}
