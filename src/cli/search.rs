use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{ModelOptions, Opts};
use crate::encoder::ClipEncoder;
use crate::query::Query;
use crate::server::IMAGE_QUERY_LABEL;
use crate::{SearchResult, Searcher};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    /// 文本查询，支持多种语言
    pub text: Option<String>,
    /// 以图搜图，同时提供文本时只使用图片
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,
    /// 返回的结果数量
    #[arg(short = 'k', long, value_name = "COUNT", default_value_t = 5)]
    pub top_k: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let image = self.image.as_ref().map(fs::read).transpose()?;
        let query = Query::from_parts(self.text.as_deref(), image)?;

        let result = block_in_place(|| -> Result<_> {
            let encoder = Arc::new(ClipEncoder::open(&self.model)?);
            let searcher = Searcher::open(&opts.data_dir, encoder)?;
            searcher.search(&query, self.top_k)
        })?;

        print_result(&mut io::stdout().lock(), &query, &result, self.output_format)
    }
}

fn print_result(
    out: &mut impl Write,
    query: &Query,
    result: &[SearchResult],
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            writeln!(out, "{}", serde_json::to_string_pretty(result)?)?;
        }
        OutputFormat::Table => {
            let label = match query {
                Query::Text(text) => text.as_str(),
                Query::Image(_) => IMAGE_QUERY_LABEL,
            };
            writeln!(out, "{}", "=".repeat(60))?;
            writeln!(out, "  Query: {label}")?;
            writeln!(out, "  Top-{} results", result.len())?;
            writeln!(out, "{}", "=".repeat(60))?;
            if result.is_empty() {
                writeln!(out, "  No results found.")?;
            }
            for (rank, r) in result.iter().enumerate() {
                writeln!(
                    out,
                    "  {}. {}  (Class: {})  -- Score: {:.4}",
                    rank + 1,
                    r.filename,
                    r.class_name,
                    r.score
                )?;
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(result: &[SearchResult], format: OutputFormat) -> String {
        let mut out = vec![];
        print_result(&mut out, &Query::Text("forest".into()), result, format).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn table_rows() {
        let result = vec![SearchResult {
            id: 3,
            filename: "Forest_3.jpg".into(),
            class_name: "Forest".into(),
            score: 0.3125,
        }];
        let text = render(&result, OutputFormat::Table);
        assert!(text.contains("Query: forest"));
        assert!(text.contains("1. Forest_3.jpg  (Class: Forest)  -- Score: 0.3125"));
        assert!(!text.contains("No results found."));
    }

    #[test]
    fn table_without_results() {
        let text = render(&[], OutputFormat::Table);
        assert!(text.contains("No results found."));
        assert_eq!(render(&[], OutputFormat::Json).trim(), "[]");
    }
}
