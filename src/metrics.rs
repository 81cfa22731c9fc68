use std::sync::LazyLock;

use prometheus::*;

static METRIC_SEARCH_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("eovs_search_count", "count of the search requests", &["kind"])
        .unwrap()
});

static METRIC_SEARCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "eovs_search_duration",
        "duration of the encode + rank step in seconds",
        &["kind"]
    )
    .unwrap()
});

static METRIC_SEARCH_TOP_SCORE: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "eovs_search_top_score",
        "cosine similarity of the best match",
        &["kind"],
        (-10..=10).map(|x| x as f64 / 10.).collect()
    )
    .unwrap()
});

/// 增加搜索次数
pub fn inc_search_count(kind: &str) {
    METRIC_SEARCH_COUNT.with_label_values(&[kind]).inc();
}

pub fn observe_search_duration(kind: &str, seconds: f64) {
    METRIC_SEARCH_DURATION.with_label_values(&[kind]).observe(seconds);
}

/// 记录第一名的相似度
pub fn observe_top_score(kind: &str, score: f32) {
    METRIC_SEARCH_TOP_SCORE.with_label_values(&[kind]).observe(score as f64);
}
