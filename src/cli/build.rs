use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::ProgressBar;
use log::{debug, info};
use ndarray::{Array2, Axis, concatenate};
use rayon::prelude::*;
use tokio::task::block_in_place;

use crate::catalog::Catalog;
use crate::cli::SubCommandExtend;
use crate::config::{DataDir, ModelOptions, Opts};
use crate::embeddings::write_embeddings;
use crate::encoder::{ClipEncoder, Encoder};
use crate::error::SearchError;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    /// 每个批次编码的图片数量
    #[arg(long, value_name = "SIZE", default_value_t = 32)]
    pub batch_size: usize,
    /// 嵌入矩阵已存在时重新构建
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for BuildCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        block_in_place(|| self.build(&opts.data_dir))
    }
}

impl BuildCommand {
    fn build(&self, data_dir: &DataDir) -> Result<()> {
        let output = data_dir.embeddings();
        if output.exists() && !self.force {
            info!("嵌入矩阵已存在: {}，使用 --force 重新构建", output.display());
            return Ok(());
        }

        let catalog = Catalog::load(data_dir.metadata())?;
        let images_dir = data_dir.images();
        if !images_dir.is_dir() {
            return Err(SearchError::MissingPrerequisite(images_dir).into());
        }

        let encoder = ClipEncoder::open(&self.model)?;
        let matrix = build_embeddings(&encoder, &catalog, &images_dir, self.batch_size)?;
        write_embeddings(&matrix, &output, data_dir.embeddings_tmp())?;

        info!("构建嵌入矩阵成功");
        Ok(())
    }
}

/// 按目录顺序编码所有图片，第 i 行对应目录中的第 i 张图片
pub fn build_embeddings(
    encoder: &dyn Encoder,
    catalog: &Catalog,
    images_dir: &Path,
    batch_size: usize,
) -> Result<Array2<f32>> {
    if catalog.is_empty() {
        bail!("图片目录为空，请先运行 ingest");
    }

    let pb = ProgressBar::new(catalog.len() as u64).with_style(pb_style());
    let mut batches = vec![];

    for batch in catalog.entries().chunks(batch_size.max(1)) {
        let images = batch
            .par_iter()
            .map(|entry| {
                let path = images_dir.join(&entry.filename);
                image::open(&path).with_context(|| format!("无法读取图片: {}", path.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        let embeddings = encoder.encode_images(&images)?;
        if embeddings.nrows() != batch.len() {
            bail!("编码器为 {} 张图片返回了 {} 个向量", batch.len(), embeddings.nrows());
        }
        debug!("批次编码完成: {:?}", embeddings.dim());

        batches.push(embeddings);
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("编码完成");

    let views = batches.iter().map(|b| b.view()).collect::<Vec<_>>();
    let matrix = concatenate(Axis(0), &views).context("各批次的向量维度不一致")?;
    Ok(matrix)
}
