/// モック画像処理アダプタ
///
/// 検出（ONNX推論）とセグメンテーション（watershed系）のコラボレータを
/// 置き換えるテスト・開発用実装。

use crate::domain::{
    BinaryMask, DetectorPort, DomainResult, Frame, RawDetection, SegmenterPort, FRAME_CHANNELS,
};

/// 輝度閾値によるモックセグメンタ
///
/// 平均輝度が閾値未満のピクセルを前景（シャーレ内部候補）とする。
/// 明るい背景に暗いシャーレという合成シーンの前提に合わせてある。
pub struct MockSegmenterAdapter {
    threshold: u8,
}

impl MockSegmenterAdapter {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }
}

impl SegmenterPort for MockSegmenterAdapter {
    fn segment(&mut self, frame: &Frame) -> DomainResult<BinaryMask> {
        let mut mask = BinaryMask::new_zeroed(frame.width, frame.height);

        for (i, px) in frame.data.chunks_exact(FRAME_CHANNELS).enumerate() {
            let luminance = (px[0] as u32 + px[1] as u32 + px[2] as u32) / 3;
            if luminance < self.threshold as u32 {
                mask.data[i] = 1;
            }
        }

        Ok(mask)
    }
}

/// 固定リストを返すモック検出器
///
/// 出力順は与えた順のまま。スコアフィルタはレジストリ側の責務なので
/// ここでは閾値を無視する。
pub struct MockDetectorAdapter {
    detections: Vec<RawDetection>,
}

impl MockDetectorAdapter {
    /// MockCaptureAdapterの合成シーン（640x640）に合わせたデフォルト検出
    pub fn new() -> Self {
        let boxes = [
            (-60.0, -20.0, 0.93),
            (40.0, -40.0, 0.88),
            (10.0, 60.0, 0.81),
        ];

        let detections = boxes
            .iter()
            .map(|&(ox, oy, score)| {
                let cx = 320.0 + ox;
                let cy = 320.0 + oy;
                RawDetection {
                    x1: cx - 5.0,
                    y1: cy - 5.0,
                    x2: cx + 5.0,
                    y2: cy + 5.0,
                    score,
                    class_index: 0,
                }
            })
            .collect();

        Self { detections }
    }

    pub fn with_detections(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

impl Default for MockDetectorAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorPort for MockDetectorAdapter {
    fn infer(&mut self, _frame: &Frame, _score_threshold: f64) -> DomainResult<Vec<RawDetection>> {
        Ok(self.detections.clone())
    }
}
