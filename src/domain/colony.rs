//! コロニー実体とレジストリ構築
//!
//! 検出器の生ボックスを、その周期のキャリブレーションに束縛された
//! 物理空間ターゲットへ変換する。レジストリは周期ごとに全量
//! 作り直され、前世代のコロニーは保持しない。

use crate::domain::dish::{ConversionFactor, DishCalibration};
use crate::domain::geometry::{Circle, Point, Rectangle};
use crate::domain::types::RawDetection;

/// 検出されたコロニーの不変スナップショット
///
/// 生成時点のシャーレ重心と変換係数を束縛する。以降キャリブレーションが
/// 更新されても、このコロニーの座標は生成時の基準で計算され続ける。
#[derive(Debug, Clone, Copy)]
pub struct Colony {
    pixel_box: Rectangle,
    limits: Circle,
    dish_centroid: Point,
    conversion: ConversionFactor,
}

impl Colony {
    pub fn new(detection: Rectangle, dish_centroid: Point, conversion: ConversionFactor) -> Self {
        let center = detection.center();
        // ボックスの縦横平均を境界円の半径とする
        let limits = Circle::new(center.x, center.y, (detection.w + detection.h) / 2.0);

        Self {
            pixel_box: detection,
            limits,
            dish_centroid,
            conversion,
        }
    }

    pub fn pixel_box(&self) -> Rectangle {
        self.pixel_box
    }

    /// ピクセル空間での中心座標
    pub fn pixel_offset(&self) -> Point {
        self.limits.center()
    }

    /// シャーレ重心を原点とした物理空間オフセット[mm]
    pub fn physical_offset(&self) -> Point {
        (self.limits.center() - self.dish_centroid) * self.conversion.linear()
    }

    /// 境界円のピクセル面積
    pub fn pixel_area(&self) -> f64 {
        self.limits.area()
    }

    /// 変換後の物理面積[mm²]
    pub fn physical_area(&self) -> f64 {
        self.conversion * self.limits.area()
    }

    pub fn conversion_factor(&self) -> ConversionFactor {
        self.conversion
    }
}

/// 生の検出ボックス列からコロニーレジストリを構築する
///
/// - 座標をフレーム境界にクリップ
/// - `score > threshold` のボックスのみ残す
/// - 中心が除外ゾーンの内部（境界は含まない）に落ちる検出を捨てる
///   （ゾーンは和集合として判定）
/// - 検出器の出力順を保持する。この順序がそのまま装置への
///   配達順になるため、ここで並べ替えてはならない。
///
/// 空の結果は正常（その周期はターゲットなし）。
pub fn build_registry(
    detections: &[RawDetection],
    frame_width: u32,
    frame_height: u32,
    score_threshold: f64,
    calibration: &DishCalibration,
    exclusion_zones: &[Rectangle],
) -> Vec<Colony> {
    let w = frame_width as f64;
    let h = frame_height as f64;

    let mut colonies = Vec::new();

    for det in detections {
        if det.score <= score_threshold {
            continue;
        }

        let x1 = det.x1.clamp(0.0, w);
        let y1 = det.y1.clamp(0.0, h);
        let x2 = det.x2.clamp(0.0, w);
        let y2 = det.y2.clamp(0.0, h);

        let rect = Rectangle::new(x1, y1, (x1 - x2).abs(), (y1 - y2).abs());

        let center = rect.center();
        if exclusion_zones.iter().any(|z| z.contains_interior(center)) {
            continue;
        }

        colonies.push(Colony::new(rect, calibration.centroid, calibration.conversion));
    }

    colonies
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration(centroid: Point, diameter_mm: f64, pixel_area: f64) -> DishCalibration {
        let mut conversion = ConversionFactor::default();
        let physical = std::f64::consts::PI * (diameter_mm / 2.0_f64).powi(2);
        conversion.update(physical / pixel_area);
        DishCalibration {
            centroid,
            conversion,
            pixel_area,
        }
    }

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, score: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            score,
            class_index: 0,
        }
    }

    #[test]
    fn test_physical_offset_uses_capture_snapshot() {
        let cal = calibration(Point::new(100.0, 100.0), 88.0, 10000.0);
        let colony = Colony::new(Rectangle::new(110.0, 100.0, 20.0, 20.0), cal.centroid, cal.conversion);

        // ピクセルオフセットは(120,110)、重心差は(20,10)
        assert_eq!(colony.pixel_offset(), Point::new(120.0, 110.0));

        let offset = colony.physical_offset();
        let linear = cal.conversion.linear();
        assert!((offset.x - 20.0 * linear).abs() < 1e-9);
        assert!((offset.y - 10.0 * linear).abs() < 1e-9);
    }

    #[test]
    fn test_registry_preserves_detector_order() {
        let cal = calibration(Point::new(0.0, 0.0), 88.0, 10000.0);
        let dets = vec![
            det(50.0, 50.0, 60.0, 60.0, 0.9),
            det(10.0, 10.0, 20.0, 20.0, 0.8),
            det(30.0, 30.0, 40.0, 40.0, 0.7),
        ];

        let colonies = build_registry(&dets, 640, 640, 0.1, &cal, &[]);

        // 座標順ではなく検出器の出力順のまま
        let xs: Vec<f64> = colonies.iter().map(|c| c.pixel_box().x).collect();
        assert_eq!(xs, vec![50.0, 10.0, 30.0]);
    }

    #[test]
    fn test_registry_filters_by_score() {
        let cal = calibration(Point::new(0.0, 0.0), 88.0, 10000.0);
        let dets = vec![
            det(10.0, 10.0, 20.0, 20.0, 0.05),
            det(30.0, 30.0, 40.0, 40.0, 0.5),
        ];

        let colonies = build_registry(&dets, 640, 640, 0.1, &cal, &[]);
        assert_eq!(colonies.len(), 1);
        assert_eq!(colonies[0].pixel_box().x, 30.0);
    }

    #[test]
    fn test_registry_clips_to_frame_bounds() {
        let cal = calibration(Point::new(0.0, 0.0), 88.0, 10000.0);
        let dets = vec![det(-10.0, -10.0, 20.0, 20.0, 0.9)];

        let colonies = build_registry(&dets, 640, 640, 0.1, &cal, &[]);
        let rect = colonies[0].pixel_box();
        assert_eq!(rect.x, 0.0);
        assert_eq!(rect.y, 0.0);
        assert_eq!(rect.w, 20.0);
        assert_eq!(rect.h, 20.0);
    }

    #[test]
    fn test_exclusion_drops_strictly_inside_only() {
        let cal = calibration(Point::new(0.0, 0.0), 88.0, 10000.0);
        let zones = vec![Rectangle::new(100.0, 100.0, 50.0, 50.0)];

        // 中心(125,125)はゾーンの内部 → 除外
        let inside = vec![det(120.0, 120.0, 130.0, 130.0, 0.9)];
        assert!(build_registry(&inside, 640, 640, 0.1, &cal, &zones).is_empty());

        // ゾーン左縁(x=100)にまたがるボックス: 中心がちょうど境界上 → 残す
        let straddling = vec![det(95.0, 110.0, 105.0, 120.0, 0.9)];
        assert_eq!(
            build_registry(&straddling, 640, 640, 0.1, &cal, &zones).len(),
            1
        );
    }

    #[test]
    fn test_exclusion_union_semantics() {
        let cal = calibration(Point::new(0.0, 0.0), 88.0, 10000.0);
        let zones = vec![
            Rectangle::new(0.0, 0.0, 50.0, 50.0),
            Rectangle::new(200.0, 200.0, 50.0, 50.0),
        ];

        let dets = vec![
            det(10.0, 10.0, 20.0, 20.0, 0.9),   // 1つ目のゾーン内
            det(210.0, 210.0, 220.0, 220.0, 0.9), // 2つ目のゾーン内
            det(100.0, 100.0, 110.0, 110.0, 0.9), // どちらにも入らない
        ];

        let colonies = build_registry(&dets, 640, 640, 0.1, &cal, &zones);
        assert_eq!(colonies.len(), 1);
        assert_eq!(colonies[0].pixel_box().x, 100.0);
    }

    #[test]
    fn test_empty_detections_yield_empty_registry() {
        let cal = calibration(Point::new(0.0, 0.0), 88.0, 10000.0);
        let colonies = build_registry(&[], 640, 640, 0.1, &cal, &[]);
        assert!(colonies.is_empty());
    }
}
