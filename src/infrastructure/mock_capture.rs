/// モックキャプチャアダプタ
///
/// テスト・装置なし運転用の合成カメラ。明るい背景に暗めのシャーレ円盤、
/// その内側に数個のコロニー斑点を描いた決定的なシーンを返す。
/// フレームごとに軽いノイズパターンを変えて時間平均に意味を持たせる。

use crate::domain::{CameraInfo, CapturePort, DomainResult, Frame, FRAME_CHANNELS};
use std::time::Duration;

/// 合成シーンの輝度
const BACKGROUND: u8 = 230;
const DISH: u8 = 150;
const COLONY: u8 = 60;

/// モックキャプチャアダプタ
pub struct MockCaptureAdapter {
    width: u32,
    height: u32,
    frame_index: u64,
}

impl MockCaptureAdapter {
    pub fn new() -> Self {
        Self::with_resolution(640, 640)
    }

    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_index: 0,
        }
    }

    /// シャーレ中心からのコロニー斑点のオフセット（ピクセル）
    ///
    /// MockDetectorAdapterのデフォルト検出ボックスと対応している。
    pub const COLONY_OFFSETS: [(f64, f64); 3] = [(-60.0, -20.0), (40.0, -40.0), (10.0, 60.0)];

    fn render(&self) -> Frame {
        let cx = self.width as f64 / 2.0;
        let cy = self.height as f64 / 2.0;
        let dish_radius = self.width.min(self.height) as f64 * 0.4;

        let mut data = Vec::with_capacity((self.width * self.height) as usize * FRAME_CHANNELS);

        for y in 0..self.height {
            for x in 0..self.width {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let from_center = (dx * dx + dy * dy).sqrt();

                let mut value = if from_center <= dish_radius {
                    DISH
                } else {
                    BACKGROUND
                };

                for (ox, oy) in Self::COLONY_OFFSETS {
                    let sx = dx - ox;
                    let sy = dy - oy;
                    if (sx * sx + sy * sy).sqrt() <= 5.0 {
                        value = COLONY;
                    }
                }

                // フレームごとに変わる決定的ノイズ
                let noise = ((x as u64 * 31 + y as u64 * 17 + self.frame_index * 7) % 5) as u8;
                value = value.saturating_sub(noise);

                data.extend_from_slice(&[value, value, value]);
            }
        }

        Frame::new(data, self.width, self.height)
    }
}

impl Default for MockCaptureAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl CapturePort for MockCaptureAdapter {
    fn read_frame(&mut self) -> DomainResult<Frame> {
        // 実カメラのブロッキングを粗く模す
        std::thread::sleep(Duration::from_millis(2));

        self.frame_index += 1;
        Ok(self.render())
    }

    fn device_info(&self) -> CameraInfo {
        CameraInfo {
            width: self.width,
            height: self.height,
            name: "Mock Camera 0".to_string(),
        }
    }
}
