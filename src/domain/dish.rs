//! シャーレキャリブレータ
//!
//! セグメンテーションマスクからシャーレの重心・ピクセル面積を求め、
//! 既知の物理直径からピクセル→物理の変換係数を導出する。
//! 1検出周期ごとに全量再導出され、前周期の値は完全に上書きされる
//! （単一ライタ: 検出ループのみ）。

use std::collections::VecDeque;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::geometry::{Circle, Point};
use crate::domain::types::BinaryMask;

/// ピクセル量→物理量の変換係数
///
/// `factor`は面積比。線形量（座標・距離）には`linear = sqrt(factor/π)`を使う。
/// 未キャリブレーション時は両方0で、乗算は0を返す（no-op扱い）。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConversionFactor {
    factor: f64,
    linear: f64,
}

impl ConversionFactor {
    /// 面積比を更新し、線形係数を再導出する
    pub fn update(&mut self, value: f64) {
        self.factor = value;
        self.linear = (value / std::f64::consts::PI).sqrt();
    }

    /// 面積比
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// 線形係数（ピクセル距離 × linear = 物理距離[mm]）
    pub fn linear(&self) -> f64 {
        self.linear
    }
}

impl std::ops::Mul<f64> for ConversionFactor {
    type Output = f64;

    /// ピクセル面積に掛けると物理面積[mm²]になる
    fn mul(self, pixel_area: f64) -> f64 {
        self.factor * pixel_area
    }
}

/// 1周期分のキャリブレーション・スナップショット
///
/// コロニー生成時に束縛する値の組。重心・係数・面積は同一クリティカル
/// セクション内で計算されるため、部分更新が観測されることはない。
#[derive(Debug, Clone, Copy)]
pub struct DishCalibration {
    pub centroid: Point,
    pub conversion: ConversionFactor,
    pub pixel_area: f64,
}

/// シャーレ実体
#[derive(Debug)]
pub struct PetriDish {
    segmentation: Option<BinaryMask>,
    centroid: Point,
    pixel_area: f64,
    pixel_radius: f64,
    diameter_mm: f64,
    conversion: ConversionFactor,
    center_marker: Option<Circle>,
}

impl PetriDish {
    pub fn new(diameter_mm: f64) -> Self {
        Self {
            segmentation: None,
            centroid: Point::default(),
            pixel_area: 0.0,
            pixel_radius: 0.0,
            diameter_mm,
            conversion: ConversionFactor::default(),
            center_marker: None,
        }
    }

    /// シャーレの物理直径[mm]を設定（オペレータが実行中に変更できる）
    pub fn set_diameter(&mut self, diameter_mm: f64) {
        self.diameter_mm = diameter_mm;
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn conversion_factor(&self) -> ConversionFactor {
        self.conversion
    }

    pub fn pixel_area(&self) -> f64 {
        self.pixel_area
    }

    pub fn pixel_radius(&self) -> f64 {
        self.pixel_radius
    }

    pub fn is_calibrated(&self) -> bool {
        self.center_marker.is_some()
    }

    /// クリーニング済みマスク（プレビュー合成用）
    pub fn segmentation(&self) -> Option<&BinaryMask> {
        self.segmentation.as_ref()
    }

    /// セグメンテーションマスクからパラメータ一式を再導出する
    ///
    /// 1. 入力マスクの生モーメントからシード（重心推定）を求める
    /// 2. シードから4連結フラッドフィルでノイズ成分を捨てる
    /// 3. クリーニング後の領域で重心・面積を再計算
    /// 4. 直径が設定されていれば変換係数を更新（0ならno-op）
    ///
    /// 重心・面積・係数の三つ組はローカルで計算し終えてから一括で
    /// コミットする。前景ピクセルが無い場合はNaNを作らず
    /// `Calibration`エラーで明示的に失敗する。
    pub fn calibrate(&mut self, mask: BinaryMask) -> DomainResult<DishCalibration> {
        let (m00, m10, m01) = raw_moments(&mask);
        if m00 == 0.0 {
            return Err(DomainError::Calibration(
                "segmentation mask has no foreground pixels".to_string(),
            ));
        }

        let seed_x = (m10 / m00) as u32;
        let seed_y = (m01 / m00) as u32;

        let cleaned = flood_fill(&mask, seed_x, seed_y);

        let (c00, c10, c01) = raw_moments(&cleaned);
        if c00 == 0.0 {
            // リング状のマスクなどでシードが背景に落ちた場合
            return Err(DomainError::Calibration(format!(
                "flood fill seed ({}, {}) is not on the dish component",
                seed_x, seed_y
            )));
        }

        let centroid = Point::new(c10 / c00, c01 / c00);
        let pixel_area = c00;
        let pixel_radius = (pixel_area / std::f64::consts::PI).sqrt();

        let mut conversion = self.conversion;
        if self.diameter_mm != 0.0 {
            let physical_area = std::f64::consts::PI * (self.diameter_mm / 2.0).powi(2);
            conversion.update(physical_area / pixel_area);
        }

        // ここから一括コミット（部分更新を外へ見せない）
        self.segmentation = Some(cleaned);
        self.centroid = centroid;
        self.pixel_area = pixel_area;
        self.pixel_radius = pixel_radius;
        self.conversion = conversion;
        self.center_marker = Some(Circle::new(centroid.x, centroid.y, 2.0));

        Ok(DishCalibration {
            centroid,
            conversion,
            pixel_area,
        })
    }
}

/// 生画像モーメント (M00, M10, M01)
fn raw_moments(mask: &BinaryMask) -> (f64, f64, f64) {
    let mut m00 = 0.0;
    let mut m10 = 0.0;
    let mut m01 = 0.0;

    for y in 0..mask.height {
        for x in 0..mask.width {
            if mask.at(x, y) {
                m00 += 1.0;
                m10 += x as f64;
                m01 += y as f64;
            }
        }
    }

    (m00, m10, m01)
}

/// シードから到達可能な前景成分だけを残すフラッドフィル
///
/// インデックスアドレスのキュー＋訪問済み配列によるBFS。再帰を使わない
/// ため大きなマスクでもスタックを消費しない。シードが背景に乗っている
/// 場合は空の領域を返す（呼び出し側がエラーにする）。
pub fn flood_fill(mask: &BinaryMask, seed_x: u32, seed_y: u32) -> BinaryMask {
    let mut cleaned = BinaryMask::new_zeroed(mask.width, mask.height);

    if seed_x >= mask.width || seed_y >= mask.height || !mask.at(seed_x, seed_y) {
        return cleaned;
    }

    let mut visited = vec![false; mask.data.len()];
    let mut queue = VecDeque::new();

    let seed = mask.index(seed_x, seed_y);
    visited[seed] = true;
    queue.push_back(seed);

    while let Some(i) = queue.pop_front() {
        cleaned.data[i] = 1;

        let x = i as u32 % mask.width;
        let y = i as u32 / mask.width;

        // 4近傍
        let mut try_neighbor = |nx: i64, ny: i64, queue: &mut VecDeque<usize>| {
            if nx < 0 || ny < 0 || nx >= mask.width as i64 || ny >= mask.height as i64 {
                return;
            }
            let ni = mask.index(nx as u32, ny as u32);
            if !visited[ni] && mask.data[ni] != 0 {
                visited[ni] = true;
                queue.push_back(ni);
            }
        };

        try_neighbor(x as i64 - 1, y as i64, &mut queue);
        try_neighbor(x as i64 + 1, y as i64, &mut queue);
        try_neighbor(x as i64, y as i64 - 1, &mut queue);
        try_neighbor(x as i64, y as i64 + 1, &mut queue);
    }

    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI: f64 = std::f64::consts::PI;

    /// 中央に正方形の前景を持つマスク
    fn square_mask(size: u32, x0: u32, y0: u32, side: u32) -> BinaryMask {
        let mut m = BinaryMask::new_zeroed(size, size);
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                m.set(x, y);
            }
        }
        m
    }

    #[test]
    fn test_conversion_factor_identity() {
        // factor = π(d/2)²/a, linear = sqrt(factor/π) の恒等式
        let d = 88.0;
        let a = 20000.0;

        let mut dish = PetriDish::new(d);
        let cal = dish.calibrate(square_mask(200, 10, 10, 141)).unwrap();

        let expected = PI * (d / 2.0_f64).powi(2) / cal.pixel_area;
        assert!((cal.conversion.factor() - expected).abs() < 1e-9);
        assert!((cal.conversion.linear() - (expected / PI).sqrt()).abs() < 1e-9);

        // 面積への乗算
        assert!((cal.conversion * a - expected * a).abs() < 1e-6);
    }

    #[test]
    fn test_zero_diameter_leaves_factor_unchanged() {
        let mut dish = PetriDish::new(0.0);
        let cal = dish.calibrate(square_mask(50, 10, 10, 20)).unwrap();

        // 直径0ではno-op（デフォルトの0のまま）
        assert_eq!(cal.conversion.factor(), 0.0);
        assert_eq!(cal.conversion.linear(), 0.0);
        assert_eq!(cal.pixel_area, 400.0);
    }

    #[test]
    fn test_centroid_of_square() {
        let mut dish = PetriDish::new(88.0);
        let cal = dish.calibrate(square_mask(100, 20, 30, 11)).unwrap();

        // 20..=30 の中心は25、30..=40 の中心は35
        assert!((cal.centroid.x - 25.0).abs() < 1e-9);
        assert!((cal.centroid.y - 35.0).abs() < 1e-9);
        assert!(dish.is_calibrated());
    }

    #[test]
    fn test_flood_fill_discards_disconnected_noise() {
        let mut m = square_mask(50, 10, 10, 20);
        // 孤立ノイズ
        m.set(45, 45);
        m.set(46, 45);

        let mut dish = PetriDish::new(88.0);
        let cal = dish.calibrate(m).unwrap();

        // 本体の400ピクセルのみ残る
        assert_eq!(cal.pixel_area, 400.0);
        assert_eq!(dish.segmentation().unwrap().foreground_count(), 400);
    }

    #[test]
    fn test_flood_fill_idempotent() {
        let mut m = square_mask(40, 5, 5, 10);
        m.set(30, 30); // ノイズ

        let first = flood_fill(&m, 10, 10);
        let second = flood_fill(&first, 10, 10);

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_mask_fails_explicitly() {
        let mut dish = PetriDish::new(88.0);
        let result = dish.calibrate(BinaryMask::new_zeroed(30, 30));

        assert!(matches!(result, Err(DomainError::Calibration(_))));
        assert!(!dish.is_calibrated());
    }

    #[test]
    fn test_background_seed_fails_explicitly() {
        // 対角に離れた2つの塊: 全体の重心は両者の中間の背景に落ちる
        let mut m = BinaryMask::new_zeroed(60, 60);
        for y in 0..10 {
            for x in 0..10 {
                m.set(x, y);
                m.set(50 + x, 50 + y);
            }
        }

        let mut dish = PetriDish::new(88.0);
        let result = dish.calibrate(m);

        assert!(matches!(result, Err(DomainError::Calibration(_))));
    }
}
