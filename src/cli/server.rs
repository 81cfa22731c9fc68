use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::{error, info};
use prometheus::{BasicAuthentication, labels};
use tokio::net::TcpListener;
use tokio::task::spawn_blocking;
use tokio::time::{Duration, sleep};

use crate::cli::SubCommandExtend;
use crate::config::{DataDir, ModelOptions, SearchOptions};
use crate::encoder::{ClipEncoder, Encoder};
use crate::server::AppState;
use crate::{Opts, Searcher, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// prometheus 主动推送地址
    #[arg(long, value_name = "URL")]
    pub prometheus_push: Option<String>,
    /// 自定义 instance 标签值
    #[arg(long, value_name = "NAME")]
    pub prometheus_instance: Option<String>,
    /// prometheus 认证信息，格式为 username:password
    #[arg(long, value_name = "AUTH", value_parser = parse_auth)]
    pub prometheus_auth: Option<(String, String)>,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        // 创建应用状态，搜索器加载完成前 /search 返回 503
        let state = AppState::new(opts.data_dir.clone(), self.search.clone());
        tokio::spawn(load_searcher(state.clone(), opts.data_dir.clone(), self.model.clone()));

        // 创建应用
        let app = server::create_app(state);

        if let Some(url) = self.prometheus_push.clone() {
            let instance = self.prometheus_instance.clone().unwrap_or_else(|| self.addr.clone());
            let auth = self.prometheus_auth.clone();
            tokio::spawn(push_metrics(url, instance, auth));
        }

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// 在后台加载模型与索引，失败时服务继续运行
async fn load_searcher(state: Arc<AppState>, data_dir: DataDir, model: ModelOptions) {
    info!("正在加载模型与嵌入矩阵");
    let result = spawn_blocking(move || -> Result<Searcher> {
        let encoder: Arc<dyn Encoder> = Arc::new(ClipEncoder::open(&model)?);
        Searcher::open(&data_dir, encoder)
    })
    .await;

    match result {
        Ok(Ok(searcher)) => {
            state.set_searcher(searcher);
            info!("搜索器已就绪");
        }
        Ok(Err(e)) => error!("加载搜索器失败，请先运行 ingest 和 build: {e:#}"),
        Err(e) => error!("加载搜索器的任务异常退出: {e}"),
    }
}

async fn push_metrics(url: String, instance: String, auth: Option<(String, String)>) {
    loop {
        let metric_families = prometheus::gather();
        let url = url.clone();
        let instance = instance.clone();
        let auth = auth.clone();
        let r = spawn_blocking(move || {
            prometheus::push_metrics(
                "eovs",
                labels! {
                    "instance".to_string() => instance,
                },
                &url,
                metric_families,
                auth.map(|(username, password)| BasicAuthentication { username, password }),
            )
        })
        .await;
        match r {
            Ok(Err(e)) => error!("推送指标失败: {e}"),
            Err(e) => error!("推送指标的任务异常退出: {e}"),
            Ok(Ok(())) => {}
        }
        sleep(Duration::from_secs(30)).await;
    }
}

fn parse_auth(s: &str) -> Result<(String, String)> {
    let (username, password) =
        s.split_once(':').ok_or_else(|| anyhow!("认证信息格式应为 username:password"))?;
    Ok((username.to_string(), password.to_string()))
}
