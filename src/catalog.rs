use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// 数据集中的一张图片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    /// 相对于 images 目录的文件名
    pub filename: String,
    /// 类别编号，旧数据可能没有这个字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_int: Option<u32>,
    pub class_name: String,
}

/// 图片目录，第 i 条记录对应嵌入矩阵的第 i 行
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// 从 metadata.json 读取目录
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SearchError::MissingPrerequisite(path.to_path_buf()).into());
        }
        let data = fs::read_to_string(path)?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&data)
            .with_context(|| format!("无法解析目录文件: {}", path.display()))?;
        info!("从 {} 读取了 {} 条记录", path.display(), entries.len());
        Ok(Self { entries })
    }

    /// 保存为带缩进的 JSON 数组
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&CatalogEntry> {
        self.entries.get(row)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}
