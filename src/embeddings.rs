use std::fs::{self, File};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};
use ndarray::Array2;
use ndarray_npy::{NpzReader, NpzWriter};

use crate::error::SearchError;

/// npz 中嵌入矩阵的名称
pub const EMBEDDINGS_KEY: &str = "embeddings";

/// 从 npz 文件中读取嵌入矩阵，形状为 (N, D)
///
/// numpy 写入的条目名带有 `.npy` 后缀，两种写法都可以识别；
/// 如果矩阵是 f64 会被转换为 f32
pub fn read_embeddings(path: impl AsRef<Path>) -> Result<Array2<f32>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SearchError::MissingPrerequisite(path.to_path_buf()).into());
    }

    let mut npz = NpzReader::new(File::open(path)?)
        .with_context(|| format!("无法打开 npz 文件: {}", path.display()))?;
    let names = npz.names()?;
    debug!("npz 条目: {:?}", names);

    let name = names
        .into_iter()
        .find(|name| name == EMBEDDINGS_KEY || name.strip_suffix(".npy") == Some(EMBEDDINGS_KEY))
        .ok_or_else(|| anyhow!("{} 中没有名为 {} 的矩阵", path.display(), EMBEDDINGS_KEY))?;

    let matrix: Array2<f32> = match npz.by_name(&name) {
        Ok(matrix) => matrix,
        Err(err) => {
            let matrix: Array2<f64> = npz
                .by_name(&name)
                .map_err(|_| err)
                .with_context(|| format!("无法读取嵌入矩阵: {}", path.display()))?;
            matrix.mapv(|v| v as f32)
        }
    };

    info!("从 {} 读取了形状为 {:?} 的嵌入矩阵", path.display(), matrix.dim());
    Ok(matrix)
}

/// 先写入临时文件，再重命名为目标文件，避免中断后留下不完整的矩阵
pub fn write_embeddings(
    matrix: &Array2<f32>,
    path: impl AsRef<Path>,
    tmp_path: impl AsRef<Path>,
) -> Result<()> {
    let (path, tmp_path) = (path.as_ref(), tmp_path.as_ref());

    let mut npz = NpzWriter::new_compressed(File::create(tmp_path)?);
    npz.add_array(format!("{EMBEDDINGS_KEY}.npy"), matrix)?;
    npz.finish()?;
    fs::rename(tmp_path, path)?;

    info!("已将形状为 {:?} 的矩阵保存到 {}", matrix.dim(), path.display());
    Ok(())
}
