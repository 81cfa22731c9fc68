use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::cli::*;

#[derive(Parser, Debug, Clone)]
pub struct ModelOptions {
    /// 模型目录，需包含 vision.onnx、text.onnx 和 tokenizer.json
    #[arg(long, value_name = "DIR", default_value = "models/clip-ViT-B-32-multilingual-v1")]
    pub model_dir: PathBuf,
    /// 推理使用的线程数
    #[arg(long, value_name = "N", default_value_t = num_cpus::get())]
    pub threads: usize,
    /// 文本查询最大 token 数，超出部分会被截断
    #[arg(long, value_name = "N", default_value_t = 128)]
    pub max_text_len: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 未指定 top_k 时返回的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 5)]
    pub default_top_k: usize,
    /// 单次请求允许的最大结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 50)]
    pub max_top_k: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { default_top_k: 5, max_top_k: 50 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "eovs", version, about = "EuroSAT 卫星图像多语言语义搜索")]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 数据目录，包含 metadata.json、embeddings.npz 和 images/
    #[arg(short, long, global = true, default_value = "data/eurosat")]
    pub data_dir: DataDir,
    /// 输出调试日志
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 从本地目录导入数据集
    Ingest(IngestCommand),
    /// 为数据集中的所有图片计算向量
    Build(BuildCommand),
    /// 使用文本或图片搜索
    Search(SearchCommand),
    /// 启动 HTTP 搜索服务
    Server(ServerCommand),
}

/// 数据目录，ingest 和 build 的产物都在这里
#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回图片目录文件的路径
    pub fn metadata(&self) -> PathBuf {
        self.path.join("metadata.json")
    }

    /// 返回嵌入矩阵文件的路径
    pub fn embeddings(&self) -> PathBuf {
        self.path.join("embeddings.npz")
    }

    /// 返回嵌入矩阵的临时路径
    pub fn embeddings_tmp(&self) -> PathBuf {
        self.path.join("embeddings.npz.tmp")
    }

    /// 返回图片目录的路径
    pub fn images(&self) -> PathBuf {
        self.path.join("images")
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
