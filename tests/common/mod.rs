#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use env_logger::{Builder, Env};
use image::{GrayImage, Luma};

// Initialize test logger
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn")).try_init();
}

/// Writes a `width` x `height` PNG filled with `value` and returns its path.
pub fn solid_image(dir: &Path, name: &str, width: u32, height: u32, value: u8) -> PathBuf {
    let path = dir.join(name);
    GrayImage::from_pixel(width, height, Luma([value]))
        .save(&path)
        .unwrap();
    path
}

/// Writes a PNG with a horizontal gradient, brighter towards the right.
pub fn gradient_image(dir: &Path, name: &str, width: u32, height: u32, offset: u8) -> PathBuf {
    let path = dir.join(name);
    GrayImage::from_fn(width, height, |x, y| {
        Luma([offset.saturating_add((x * 20 + y) as u8)])
    })
    .save(&path)
    .unwrap();
    path
}

/// Writes `<dir>/<set>.csv` with a header line and one `<image>,<label>` row
/// per entry.
pub fn write_manifest(dir: &Path, set: &str, rows: &[(&str, &str)]) {
    let mut text = String::from("image,label\n");
    for (image, label) in rows {
        text.push_str(&format!("{image},{label}\n"));
    }
    fs::write(dir.join(format!("{set}.csv")), text).unwrap();
}
