use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use image::ImageFormat;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{info, warn};
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::catalog::{Catalog, CatalogEntry};
use crate::cli::SubCommandExtend;
use crate::config::{DataDir, Opts};
use crate::error::SearchError;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct IngestCommand {
    /// 数据集目录，每个子目录为一个类别
    pub source: PathBuf,
    /// 最多导入的图片数量
    #[arg(long, value_name = "N")]
    pub limit: Option<usize>,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,tif,tiff")]
    pub suffix: String,
    /// 数据集已存在时重新导入
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for IngestCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        block_in_place(|| self.ingest(&opts.data_dir))?;
        Ok(())
    }
}

/// 待导入的样本
#[derive(Debug)]
struct Sample {
    path: PathBuf,
    class_name: String,
    label: u32,
}

impl IngestCommand {
    /// 导入数据集，返回导入的图片数量
    ///
    /// 图片统一转换为 RGB JPEG 保存为 `images/{类别}_{序号}.jpg`，
    /// 全部图片写入完成后才写入 metadata.json
    pub fn ingest(&self, data_dir: &DataDir) -> Result<usize> {
        let metadata = data_dir.metadata();
        if metadata.exists() && !self.force {
            info!("数据集已存在: {}，使用 --force 重新导入", metadata.display());
            return Ok(0);
        }
        if !self.source.is_dir() {
            return Err(SearchError::MissingPrerequisite(self.source.clone()).into());
        }

        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let (classes, mut samples) = scan_dataset(&self.source, &re_suf)?;
        if let Some(limit) = self.limit {
            samples.truncate(limit);
        }
        if samples.is_empty() {
            bail!("没有在 {} 中找到任何图片", self.source.display());
        }
        info!("发现 {} 个类别，导入 {} 张图片", classes.len(), samples.len());

        // 上次导入留下的图片可能不在新目录中
        let images_dir = data_dir.images();
        if images_dir.exists() {
            fs::remove_dir_all(&images_dir)?;
        }
        fs::create_dir_all(&images_dir)?;

        // 旧的嵌入矩阵与新目录不再对应
        let embeddings = data_dir.embeddings();
        if self.force && embeddings.exists() {
            warn!("删除过期的嵌入矩阵: {}", embeddings.display());
            fs::remove_file(&embeddings)?;
        }

        let pb = ProgressBar::new(samples.len() as u64).with_style(pb_style());
        let entries = samples
            .into_par_iter()
            .enumerate()
            .map(|(id, sample)| convert_sample(id, sample, &images_dir))
            .progress_with(pb.clone())
            .collect::<Result<Vec<_>>>()?;
        pb.finish_with_message("导入完成");

        let count = entries.len();
        Catalog::new(entries).save(&metadata)?;
        info!("已写入图片目录: {}", metadata.display());

        Ok(count)
    }
}

/// 按类别名排序扫描数据集，类别序号即为 label_int
fn scan_dataset(root: &Path, re_suf: &Regex) -> Result<(Vec<String>, Vec<Sample>)> {
    let mut classes = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .collect::<Vec<_>>();
    classes.sort();

    let mut samples = vec![];
    for (label, class_name) in classes.iter().enumerate() {
        let files = WalkDir::new(root.join(class_name))
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry.path().extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy()))
            });
        for entry in files {
            samples.push(Sample {
                path: entry.into_path(),
                class_name: class_name.clone(),
                label: label as u32,
            });
        }
    }

    Ok((classes, samples))
}

fn convert_sample(id: usize, sample: Sample, images_dir: &Path) -> Result<CatalogEntry> {
    let filename = format!("{}_{}.jpg", sample.class_name, id);
    let image = image::open(&sample.path)
        .with_context(|| format!("无法读取图片: {}", sample.path.display()))?;
    image
        .to_rgb8()
        .save_with_format(images_dir.join(&filename), ImageFormat::Jpeg)
        .with_context(|| format!("无法保存图片: {filename}"))?;

    Ok(CatalogEntry {
        id: id as u64,
        filename,
        label_int: Some(sample.label),
        class_name: sample.class_name,
    })
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    use super::*;

    fn write_image(path: &Path, color: [u8; 3]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(8, 8, Rgb(color)).save(path).unwrap();
    }

    fn command(source: &Path) -> IngestCommand {
        IngestCommand {
            source: source.to_path_buf(),
            limit: None,
            suffix: "jpg,png".to_string(),
            force: false,
        }
    }

    #[test]
    fn scan_sorted_classes() {
        let dir = tempdir().unwrap();
        write_image(&dir.path().join("River/b.png"), [0, 0, 255]);
        write_image(&dir.path().join("Forest/a.png"), [0, 255, 0]);
        write_image(&dir.path().join("River/a.PNG"), [0, 0, 200]);
        fs::write(dir.path().join("River/notes.txt"), "x").unwrap();

        let re = Regex::new("(?i)^(png)$").unwrap();
        let (classes, samples) = scan_dataset(dir.path(), &re).unwrap();
        assert_eq!(classes, vec!["Forest", "River"]);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].class_name, "Forest");
        assert_eq!(samples[0].label, 0);
        assert!(samples[1].path.ends_with("River/a.PNG"));
        assert_eq!(samples[2].label, 1);
    }

    #[test]
    fn ingest_writes_catalog_and_images() {
        let source = tempdir().unwrap();
        write_image(&source.path().join("Forest/1.png"), [0, 255, 0]);
        write_image(&source.path().join("SeaLake/1.jpg"), [0, 0, 255]);
        write_image(&source.path().join("SeaLake/2.jpg"), [0, 0, 200]);

        let data = tempdir().unwrap();
        let data_dir = DataDir::new(data.path());
        let count = command(source.path()).ingest(&data_dir).unwrap();
        assert_eq!(count, 3);

        let catalog = Catalog::load(data_dir.metadata()).unwrap();
        let names = catalog.iter().map(|e| e.filename.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Forest_0.jpg", "SeaLake_1.jpg", "SeaLake_2.jpg"]);
        assert_eq!(catalog.get(2).unwrap().label_int, Some(1));
        for name in names {
            assert!(data_dir.images().join(name).is_file());
        }
    }

    #[test]
    fn ingest_respects_limit_and_skip() {
        let source = tempdir().unwrap();
        for i in 0..4 {
            write_image(&source.path().join(format!("Forest/{i}.png")), [0, 255, 0]);
        }

        let data = tempdir().unwrap();
        let data_dir = DataDir::new(data.path());
        let mut cmd = command(source.path());
        cmd.limit = Some(2);
        assert_eq!(cmd.ingest(&data_dir).unwrap(), 2);
        assert_eq!(Catalog::load(data_dir.metadata()).unwrap().len(), 2);

        // 已存在且没有 --force 时不做任何事
        cmd.limit = None;
        assert_eq!(cmd.ingest(&data_dir).unwrap(), 0);
        assert_eq!(Catalog::load(data_dir.metadata()).unwrap().len(), 2);

        fs::write(data_dir.embeddings(), b"stale").unwrap();
        cmd.force = true;
        assert_eq!(cmd.ingest(&data_dir).unwrap(), 4);
        assert!(!data_dir.embeddings().exists());
    }

    #[test]
    fn force_clears_old_images() {
        let source = tempdir().unwrap();
        for i in 0..3 {
            write_image(&source.path().join(format!("Forest/{i}.png")), [0, 255, 0]);
        }

        let data = tempdir().unwrap();
        let data_dir = DataDir::new(data.path());
        let mut cmd = command(source.path());
        assert_eq!(cmd.ingest(&data_dir).unwrap(), 3);

        cmd.force = true;
        cmd.limit = Some(1);
        assert_eq!(cmd.ingest(&data_dir).unwrap(), 1);
        let files = fs::read_dir(data_dir.images()).unwrap().count();
        assert_eq!(files, 1);
        assert!(data_dir.images().join("Forest_0.jpg").is_file());
    }

    #[test]
    fn missing_source() {
        let data = tempdir().unwrap();
        let err = command(&data.path().join("nope")).ingest(&DataDir::new(data.path())).unwrap_err();
        assert!(matches!(err.downcast_ref::<SearchError>(), Some(SearchError::MissingPrerequisite(_))));
    }
}
