//! 分割掩码：灰度图（PNG，亦接受 PGM），非零像素即目标
//!
//! 控制端与内置仿真器都把掩码写成 0/255 的 PNG；彩色图按灰度读入。
//! 完成判定只关心非零像素计数与占比。

use std::io::Cursor;
use std::path::Path;

use image::{GrayImage, ImageFormat};

use crate::core::MissionError;

#[derive(Debug, Clone, PartialEq)]
pub struct SegMask {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl SegMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    /// 由原始灰度像素构造；尺寸溢出或与像素数不符时报错
    pub fn from_raw(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self, MissionError> {
        let len = width
            .checked_mul(height)
            .ok_or_else(|| MissionError::Mask(format!("mask size {}x{} overflows", width, height)))?;
        if len != pixels.len() {
            return Err(MissionError::Mask(format!(
                "mask {}x{} expects {} pixels, got {}",
                width,
                height,
                len,
                pixels.len()
            )));
        }
        Ok(Self { width, height, pixels })
    }

    pub async fn load(path: &Path) -> Result<Self, MissionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| MissionError::Mask(format!("{}: {}", path.display(), e)))?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MissionError> {
        let gray = image::load_from_memory(bytes)
            .map_err(|e| MissionError::Mask(e.to_string()))?
            .to_luma8();
        let (width, height) = gray.dimensions();
        Self::from_raw(width as usize, height as usize, gray.into_raw())
    }

    /// 编码为灰度 PNG
    pub fn encode_png(&self) -> Result<Vec<u8>, MissionError> {
        let (width, height) = (dim(self.width)?, dim(self.height)?);
        let gray = GrayImage::from_raw(width, height, self.pixels.clone())
            .ok_or_else(|| MissionError::Mask("pixel buffer does not match dimensions".to_string()))?;
        let mut out = Cursor::new(Vec::new());
        gray.write_to(&mut out, ImageFormat::Png)
            .map_err(|e| MissionError::Mask(e.to_string()))?;
        Ok(out.into_inner())
    }

    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = value;
        }
    }

    pub fn nonzero_count(&self) -> usize {
        self.pixels.iter().filter(|p| **p != 0).count()
    }

    pub fn nonzero_ratio(&self) -> f64 {
        if self.pixels.is_empty() {
            return 0.0;
        }
        self.nonzero_count() as f64 / self.pixels.len() as f64
    }

    /// 以图像中心为中心、半边长 half 的窗口内非零占比（窗口越界时截断）
    pub fn center_ratio(&self, half: usize) -> f64 {
        let (cx, cy) = (self.width / 2, self.height / 2);
        let x0 = cx.saturating_sub(half);
        let x1 = cx.saturating_add(half).min(self.width);
        let y0 = cy.saturating_sub(half);
        let y1 = cy.saturating_add(half).min(self.height);
        let area = (x1 - x0) * (y1 - y0);
        if area == 0 {
            return 0.0;
        }
        let hits = (y0..y1)
            .flat_map(|y| (x0..x1).map(move |x| (x, y)))
            .filter(|&(x, y)| self.pixels[y * self.width + x] != 0)
            .count();
        hits as f64 / area as f64
    }
}

fn dim(value: usize) -> Result<u32, MissionError> {
    u32::try_from(value).map_err(|_| MissionError::Mask(format!("dimension {} too large", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_png_mask() {
        let mut mask = SegMask::new(4, 2);
        mask.set(1, 0, 255);
        mask.set(2, 1, 255);
        let bytes = mask.encode_png().unwrap();
        assert!(bytes.starts_with(b"\x89PNG"));

        let back = SegMask::decode(&bytes).unwrap();
        assert_eq!((back.width, back.height), (4, 2));
        assert_eq!(back.nonzero_count(), 2);
        assert!((back.nonzero_ratio() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_color_png_read_as_gray() {
        let mut rgb = image::RgbImage::new(2, 1);
        rgb.put_pixel(1, 0, image::Rgb([255, 255, 255]));
        let mut bytes = Cursor::new(Vec::new());
        rgb.write_to(&mut bytes, ImageFormat::Png).unwrap();

        let mask = SegMask::decode(bytes.get_ref()).unwrap();
        assert_eq!(mask.pixels, vec![0, 255]);
    }

    #[test]
    fn test_pgm_still_accepted() {
        let mut bytes = b"P5\n4 2\n255\n".to_vec();
        bytes.extend_from_slice(&[0, 255, 0, 0, 0, 0, 255, 0]);
        let mask = SegMask::decode(&bytes).unwrap();
        assert_eq!(mask.nonzero_count(), 2);
    }

    #[test]
    fn test_oversized_header_is_error_not_panic() {
        let err = SegMask::decode(b"P5\n4294967296 4294967296\n255\n").unwrap_err();
        assert!(matches!(err, MissionError::Mask(_)));

        let err = SegMask::from_raw(usize::MAX, 2, Vec::new()).unwrap_err();
        assert!(matches!(err, MissionError::Mask(ref m) if m.contains("overflows")));
        assert!(SegMask::from_raw(2, 2, vec![0; 3]).is_err());
    }

    #[test]
    fn test_garbage_is_mask_error() {
        let err = SegMask::decode(b"\x89PNG\r\n").unwrap_err();
        assert!(matches!(err, MissionError::Mask(_)));
    }

    #[test]
    fn test_center_window() {
        let mut mask = SegMask::new(10, 10);
        for y in 4..6 {
            for x in 4..6 {
                mask.set(x, y, 255);
            }
        }
        assert!((mask.center_ratio(1) - 1.0).abs() < 1e-9);
        assert!((mask.center_ratio(50) - 0.04).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let mut mask = SegMask::new(3, 3);
        mask.set(1, 1, 255);
        std::fs::write(&path, mask.encode_png().unwrap()).unwrap();
        assert_eq!(SegMask::load(&path).await.unwrap(), mask);
    }
}
