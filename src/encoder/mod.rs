mod clip;
pub mod preprocess;

use anyhow::{Result, anyhow};
use image::DynamicImage;
use ndarray::{Array1, Array2};

pub use self::clip::ClipEncoder;
use crate::error::SearchError;
use crate::query::Query;

/// 把文本或图片映射到同一个向量空间
///
/// 构建嵌入矩阵和查询时必须使用同一个模型，否则分数没有意义
pub trait Encoder: Send + Sync {
    /// 编码一段文本
    fn encode_text(&self, text: &str) -> Result<Array1<f32>>;

    /// 编码一批图片，每一行对应一张图片
    fn encode_images(&self, images: &[DynamicImage]) -> Result<Array2<f32>>;

    /// 编码单张图片
    fn encode_image(&self, image: &DynamicImage) -> Result<Array1<f32>> {
        let embeddings = self.encode_images(std::slice::from_ref(image))?;
        embeddings
            .outer_iter()
            .next()
            .map(|row| row.to_owned())
            .ok_or_else(|| anyhow!("模型没有返回图片向量"))
    }

    /// 编码查询，图片查询在这里解码
    fn encode_query(&self, query: &Query) -> Result<Array1<f32>> {
        match query {
            Query::Text(text) => self.encode_text(text),
            Query::Image(bytes) => {
                let image = decode_image(bytes)?;
                self.encode_image(&image)
            }
        }
    }
}

/// 解码图片文件内容
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, SearchError> {
    image::load_from_memory(bytes).map_err(|e| SearchError::invalid(format!("无法解码图片: {e}")))
}
