#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use eovs::Searcher;
use eovs::catalog::{Catalog, CatalogEntry};
use eovs::encoder::Encoder;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::{Array1, Array2, array};

/// 按颜色编码的测试编码器：图片取 RGB 均值，文本按颜色名映射
pub struct ColorEncoder;

impl Encoder for ColorEncoder {
    fn encode_text(&self, text: &str) -> Result<Array1<f32>> {
        let text = text.to_lowercase();
        Ok(if text.contains("red") || text.contains("rojo") {
            array![1.0, 0.0, 0.0]
        } else if text.contains("green") || text.contains("wald") {
            array![0.0, 1.0, 0.0]
        } else if text.contains("blue") || text.contains("mer") {
            array![0.0, 0.0, 1.0]
        } else {
            array![1.0, 1.0, 1.0]
        })
    }

    fn encode_images(&self, images: &[DynamicImage]) -> Result<Array2<f32>> {
        let mut matrix = Array2::zeros((images.len(), 3));
        for (i, image) in images.iter().enumerate() {
            let image = image.to_rgb8();
            let count = (image.width() * image.height()) as f32;
            for pixel in image.pixels() {
                for c in 0..3 {
                    matrix[[i, c]] += pixel[c] as f32 / 255.0 / count;
                }
            }
        }
        Ok(matrix)
    }
}

pub const COLORS: [(&str, [u8; 3]); 3] =
    [("Red", [255, 0, 0]), ("Green", [0, 255, 0]), ("Blue", [0, 0, 255])];

pub fn solid_image(color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(16, 16, Rgb(color))
}

pub fn png_bytes(color: [u8; 3]) -> Vec<u8> {
    let mut buf = vec![];
    DynamicImage::ImageRgb8(solid_image(color))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// 每种颜色一条记录
pub fn color_catalog() -> Catalog {
    Catalog::new(
        COLORS
            .iter()
            .enumerate()
            .map(|(i, (name, _))| CatalogEntry {
                id: i as u64,
                filename: format!("{name}_{i}.jpg"),
                label_int: Some(i as u32),
                class_name: name.to_string(),
            })
            .collect(),
    )
}

/// 与 [`color_catalog`] 对齐的单位矩阵
pub fn color_matrix() -> Array2<f32> {
    Array2::eye(3)
}

pub fn color_searcher() -> Searcher {
    Searcher::new(color_catalog(), color_matrix(), Arc::new(ColorEncoder)).unwrap()
}

/// 把目录中的每张图片写到 images_dir
pub fn write_color_images(images_dir: &Path) {
    std::fs::create_dir_all(images_dir).unwrap();
    for (i, (name, color)) in COLORS.iter().enumerate() {
        solid_image(*color).save(images_dir.join(format!("{name}_{i}.jpg"))).unwrap();
    }
}
