use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::SearchError;

/// 一次搜索的查询内容，文本和图片二选一
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Text(String),
    /// 未解码的图片文件内容
    Image(Vec<u8>),
}

impl Query {
    /// 根据可选的文本和图片构造查询
    ///
    /// 同时提供时只使用图片，文本会被忽略；两者都为空时返回参数错误
    pub fn from_parts(text: Option<&str>, image: Option<Vec<u8>>) -> Result<Self, SearchError> {
        if let Some(image) = image.filter(|image| !image.is_empty()) {
            return Ok(Self::Image(image));
        }
        match text.map(str::trim) {
            Some(text) if !text.is_empty() => Ok(Self::Text(text.to_owned())),
            _ => Err(SearchError::invalid("必须提供文本查询或图片")),
        }
    }

    /// 用于日志和指标的查询类型
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Image(_) => "image",
        }
    }
}

/// 解码 base64 图片，允许带有 `data:image/png;base64,` 之类的前缀
pub fn decode_image_base64(data: &str) -> Result<Vec<u8>, SearchError> {
    let data = match data.rsplit_once(',') {
        Some((_, payload)) => payload,
        None => data,
    };
    STANDARD
        .decode(data.trim())
        .map_err(|e| SearchError::invalid(format!("无效的 base64 图片数据: {e}")))
}
