use std::cmp::Ordering;

use anyhow::Result;
use ndarray::prelude::*;

use crate::error::SearchError;

/// 一次检索命中的行
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 在嵌入矩阵中的行号
    pub row: usize,
    /// 余弦相似度，范围 [-1, 1]
    pub score: f32,
}

/// 暴力扫描的余弦相似度索引
///
/// 数据集只有几万张图片，逐行计算即可，不做任何近似
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    matrix: Array2<f32>,
    norms: Array1<f32>,
}

impl EmbeddingIndex {
    /// 使用 (N, D) 的嵌入矩阵创建索引，预先计算每一行的模长
    pub fn new(matrix: Array2<f32>) -> Self {
        let norms = matrix.map_axis(Axis(1), |row| l2_norm(row));
        Self { matrix, norms }
    }

    /// 向量条数
    pub fn len(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 向量维度
    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    /// 计算查询向量与每一行的余弦相似度，模长为 0 的一方得分为 0
    pub fn scores(&self, query: ArrayView1<f32>) -> Result<Array1<f32>> {
        if query.len() != self.dim() {
            return Err(
                SearchError::DimensionMismatch { expected: self.dim(), actual: query.len() }.into()
            );
        }

        let qnorm = l2_norm(query);
        let mut scores = self.matrix.dot(&query);
        scores.zip_mut_with(&self.norms, |score, &norm| {
            let denom = norm * qnorm;
            *score = if denom > 0.0 { (*score / denom).clamp(-1.0, 1.0) } else { 0.0 };
        });
        Ok(scores)
    }

    /// 返回相似度最高的 min(k, N) 行，按分数降序排列，分数相同时行号小的在前
    pub fn search(&self, query: ArrayView1<f32>, k: usize) -> Result<Vec<Neighbor>> {
        let scores = self.scores(query)?.to_vec();
        Ok(top_k(&scores, k)
            .into_iter()
            .map(|row| Neighbor { row, score: scores[row] })
            .collect())
    }
}

/// 选出分数最高的 k 个下标
///
/// 排序规则为 (分数降序, 下标升序) 的全序，结果与输入顺序以外的因素无关
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let k = k.min(scores.len());
    if k == 0 {
        return vec![];
    }

    let cmp = |a: &usize, b: &usize| -> Ordering {
        scores[*b].total_cmp(&scores[*a]).then_with(|| a.cmp(b))
    };

    let mut indices = (0..scores.len()).collect::<Vec<_>>();
    if k < indices.len() {
        indices.select_nth_unstable_by(k - 1, cmp);
        indices.truncate(k);
    }
    indices.sort_unstable_by(cmp);
    indices
}

fn l2_norm(v: ArrayView1<f32>) -> f32 {
    v.dot(&v).sqrt()
}

#[cfg(test)]
mod tests {
    use rand::prelude::*;

    use super::*;

    fn random_matrix(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.random_range(-1.0..1.0))
    }

    #[test]
    fn two_rows() {
        let index = EmbeddingIndex::new(array![[1.0, 0.0], [0.0, 1.0]]);
        let result = index.search(array![0.9, 0.1].view(), 2).unwrap();

        assert_eq!(result.iter().map(|n| n.row).collect::<Vec<_>>(), vec![0, 1]);
        assert!((result[0].score - 0.9939).abs() < 1e-4);
        assert!((result[1].score - 0.1104).abs() < 1e-4);
    }

    #[test]
    fn self_match_is_top1() {
        let matrix = random_matrix(64, 16, 42);
        let index = EmbeddingIndex::new(matrix.clone());
        for (row, vector) in matrix.outer_iter().enumerate() {
            let result = index.search(vector, 3).unwrap();
            assert_eq!(result[0].row, row);
            assert!((result[0].score - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn sorted_and_capped() {
        let index = EmbeddingIndex::new(random_matrix(50, 8, 7));
        let query = random_matrix(1, 8, 8).row(0).to_owned();

        for k in [1, 5, 50, 51, 1000] {
            let result = index.search(query.view(), k).unwrap();
            assert_eq!(result.len(), k.min(50));
            assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[test]
    fn ties_keep_row_order() {
        // 第 1、3 行与第 0 行方向相同
        let index =
            EmbeddingIndex::new(array![[1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [3.0, 0.0], [-1.0, 0.0]]);
        let result = index.search(array![1.0, 0.0].view(), 4).unwrap();
        assert_eq!(result.iter().map(|n| n.row).collect::<Vec<_>>(), vec![0, 1, 3, 2]);

        // 重复运行结果一致
        for _ in 0..10 {
            assert_eq!(index.search(array![1.0, 0.0].view(), 4).unwrap(), result);
        }
    }

    #[test]
    fn zero_vectors_score_zero() {
        let index = EmbeddingIndex::new(array![[0.0, 0.0], [1.0, 1.0]]);
        let scores = index.scores(array![1.0, 1.0].view()).unwrap();
        assert_eq!(scores[0], 0.0);

        let scores = index.scores(array![0.0, 0.0].view()).unwrap();
        assert!(scores.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn dimension_mismatch() {
        let index = EmbeddingIndex::new(array![[1.0, 0.0]]);
        let err = index.search(array![1.0, 0.0, 0.0].view(), 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchError>(),
            Some(SearchError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn top_k_zero() {
        assert!(top_k(&[0.5, 0.1], 0).is_empty());
        assert!(top_k(&[], 3).is_empty());
    }
}
