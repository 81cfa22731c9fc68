use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow, bail};
use image::DynamicImage;
use log::{debug, info};
use ndarray::{Array1, Array2};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use tokenizers::{Tokenizer, TruncationParams};

use super::Encoder;
use super::preprocess::preprocess_batch;
use crate::config::ModelOptions;
use crate::error::SearchError;

/// 视觉模型文件名，输入 N×3×224×224，第一个输出为 N×D 的图片向量
pub const VISION_MODEL: &str = "vision.onnx";
/// 文本模型文件名，输入 input_ids 与 attention_mask，第一个输出为 1×D 的句向量
pub const TEXT_MODEL: &str = "text.onnx";
pub const TOKENIZER: &str = "tokenizer.json";

/// 基于 ONNX Runtime 的多语言 CLIP 编码器
///
/// 图片部分来自 CLIP ViT-B/32，文本部分是蒸馏到同一空间的多语言模型，
/// 池化和投影层已经包含在导出的 text.onnx 中
pub struct ClipEncoder {
    vision: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
}

impl ClipEncoder {
    /// 从模型目录加载视觉模型、文本模型和分词器
    pub fn open(opts: &ModelOptions) -> Result<Self> {
        let dir = opts.model_dir.as_path();
        let vision_path = require_file(dir, VISION_MODEL)?;
        let text_path = require_file(dir, TEXT_MODEL)?;
        let tokenizer_path = require_file(dir, TOKENIZER)?;

        let vision = load_session(&vision_path, opts.threads)?;
        let text = load_session(&text_path, opts.threads)?;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("无法加载分词器 {}: {e}", tokenizer_path.display()))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: opts.max_text_len,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("无法设置分词器截断参数: {e}"))?;
        tokenizer.with_padding(None);

        info!("模型加载完成: {}", dir.display());

        Ok(Self { vision: Mutex::new(vision), text: Mutex::new(text), tokenizer })
    }
}

impl Encoder for ClipEncoder {
    fn encode_text(&self, text: &str) -> Result<Array1<f32>> {
        let encoding =
            self.tokenizer.encode(text, true).map_err(|e| anyhow!("文本分词失败: {e}"))?;
        let ids = encoding.get_ids().iter().map(|&id| id as i64).collect::<Vec<_>>();
        let mask = encoding.get_attention_mask().iter().map(|&m| m as i64).collect::<Vec<_>>();
        let len = ids.len();

        let ids = Tensor::from_array(Array2::from_shape_vec((1, len), ids)?)
            .map_err(|e| anyhow!("无法创建 input_ids 张量: {e}"))?;
        let mask = Tensor::from_array(Array2::from_shape_vec((1, len), mask)?)
            .map_err(|e| anyhow!("无法创建 attention_mask 张量: {e}"))?;

        let mut session = self.text.lock().map_err(|_| anyhow!("文本模型锁已损坏"))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "sentence_embedding".into());

        let outputs = session
            .run(ort::inputs!["input_ids" => ids, "attention_mask" => mask])
            .map_err(|e| anyhow!("文本模型推理失败: {e}"))?;
        let output = outputs
            .get(&output_name)
            .ok_or_else(|| anyhow!("文本模型没有输出 {output_name}"))?;
        let (_, data) =
            output.try_extract_tensor::<f32>().map_err(|e| anyhow!("无法读取文本向量: {e}"))?;

        let embedding = Array1::from(data.to_vec());
        check_finite(embedding.iter())?;
        debug!("文本 {:?} 编码为 {} 维向量", text, embedding.len());
        Ok(embedding)
    }

    fn encode_images(&self, images: &[DynamicImage]) -> Result<Array2<f32>> {
        if images.is_empty() {
            return Ok(Array2::zeros((0, 0)));
        }

        let pixels = preprocess_batch(images)?;
        let pixels =
            Tensor::from_array(pixels).map_err(|e| anyhow!("无法创建图片张量: {e}"))?;

        let mut session = self.vision.lock().map_err(|_| anyhow!("视觉模型锁已损坏"))?;
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "pixel_values".into());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "image_embeds".into());

        let outputs = session
            .run(ort::inputs![input_name => pixels])
            .map_err(|e| anyhow!("视觉模型推理失败: {e}"))?;
        let output = outputs
            .get(&output_name)
            .ok_or_else(|| anyhow!("视觉模型没有输出 {output_name}"))?;
        let (_, data) =
            output.try_extract_tensor::<f32>().map_err(|e| anyhow!("无法读取图片向量: {e}"))?;

        if data.is_empty() || data.len() % images.len() != 0 {
            bail!("视觉模型输出长度 {} 与图片数量 {} 不匹配", data.len(), images.len());
        }
        check_finite(data.iter())?;

        let dim = data.len() / images.len();
        Ok(Array2::from_shape_vec((images.len(), dim), data.to_vec())?)
    }
}

fn require_file(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if !path.exists() {
        return Err(SearchError::MissingPrerequisite(path).into());
    }
    Ok(path)
}

fn load_session(path: &Path, threads: usize) -> Result<Session> {
    debug!("正在加载模型: {}", path.display());
    let session = Session::builder()
        .map_err(|e| anyhow!("{e}"))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| anyhow!("{e}"))?
        .with_intra_threads(threads)
        .map_err(|e| anyhow!("{e}"))?
        .commit_from_file(path)
        .map_err(|e| anyhow!("{e}"))
        .with_context(|| format!("无法加载模型 {}", path.display()))?;
    Ok(session)
}

fn check_finite<'a>(mut values: impl Iterator<Item = &'a f32>) -> Result<()> {
    if values.any(|v| !v.is_finite()) {
        bail!("模型输出包含非有限值");
    }
    Ok(())
}
