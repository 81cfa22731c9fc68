//! CLIP ViT-B/32 的图片预处理

use anyhow::Result;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use ndarray::{Array3, Array4, Axis};
use rayon::prelude::*;

/// 模型输入的边长
pub const IMAGE_SIZE: u32 = 224;

const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// 短边缩放到 224，居中裁剪，归一化后输出 CHW 格式
pub fn preprocess(image: &DynamicImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let scale = IMAGE_SIZE as f32 / width.min(height).max(1) as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(IMAGE_SIZE);
    let new_height = ((height as f32 * scale).round() as u32).max(IMAGE_SIZE);
    let resized = image.resize_exact(new_width, new_height, FilterType::CatmullRom).to_rgb8();

    let left = (new_width - IMAGE_SIZE) / 2;
    let top = (new_height - IMAGE_SIZE) / 2;
    let size = IMAGE_SIZE as usize;

    Array3::from_shape_fn((3, size, size), |(c, y, x)| {
        let pixel = resized.get_pixel(left + x as u32, top + y as u32);
        (pixel[c] as f32 / 255.0 - MEAN[c]) / STD[c]
    })
}

/// 并行处理一批图片，输出 NCHW 格式
pub fn preprocess_batch(images: &[DynamicImage]) -> Result<Array4<f32>> {
    let size = IMAGE_SIZE as usize;
    if images.is_empty() {
        return Ok(Array4::zeros((0, 3, size, size)));
    }

    let arrays = images.par_iter().map(preprocess).collect::<Vec<_>>();
    let views = arrays.iter().map(|a| a.view()).collect::<Vec<_>>();
    Ok(ndarray::stack(Axis(0), &views)?)
}
