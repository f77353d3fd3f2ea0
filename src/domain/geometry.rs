//! 幾何プリミティブ
//!
//! ピクセル座標・物理座標の両方で使う値型。
//! Point/Circleは生成後不変、Rectangleのみ対話的なリサイズ用に可変APIを持つ。

use std::ops::{Add, Mul, Sub};

/// 2次元の点（ピクセル座標または物理座標[mm]）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// 原点からの距離
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, scale: f64) -> Point {
        Point::new(self.x * scale, self.y * scale)
    }
}

/// 軸平行矩形
///
/// 除外ゾーンと検出ボックスの両方に使う。
/// 対話的な描画中は`set_origin`/`drag_corner`でインプレース更新され、
/// 確定後はゾーンリストに所有権ごと渡される。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rectangle {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rectangle {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// 右端のX座標
    pub fn xx(&self) -> f64 {
        self.x + self.w
    }

    /// 下端のY座標
    pub fn yy(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// 不変条件: valid ⇔ w>0 ∧ h>0
    pub fn is_valid(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    /// ドラッグ開始点を設定（幅・高さはリセット）
    pub fn set_origin(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.w = 0.0;
        self.h = 0.0;
    }

    /// ドラッグ中の対角点を設定
    pub fn drag_corner(&mut self, x: f64, y: f64) {
        self.w = x - self.x;
        self.h = y - self.y;
    }

    /// 境界を含む包含判定（ゾーン削除のクエリ用）
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.xx() && p.y >= self.y && p.y <= self.yy()
    }

    /// 境界を含まない内部判定（検出フィルタ用）
    ///
    /// 境界上の検出は除外しない。ゾーン縁にまたがるコロニーを
    /// 取りこぼさないための判定。
    pub fn contains_interior(&self, p: Point) -> bool {
        p.x > self.x && p.x < self.xx() && p.y > self.y && p.y < self.yy()
    }
}

/// 円（コロニーの境界近似・シャーレ中心マーカー）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub x: f64,
    pub y: f64,
    pub r: f64,
}

impl Circle {
    pub fn new(x: f64, y: f64, r: f64) -> Self {
        Self { x, y, r }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.r * self.r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_arithmetic() {
        let a = Point::new(3.0, 4.0);
        let b = Point::new(1.0, 2.0);

        assert_eq!(a + b, Point::new(4.0, 6.0));
        assert_eq!(a - b, Point::new(2.0, 2.0));
        assert_eq!(a * 2.0, Point::new(6.0, 8.0));
        assert_eq!(a.magnitude(), 5.0);
    }

    #[test]
    fn test_rectangle_derived_values() {
        let r = Rectangle::new(10.0, 20.0, 30.0, 40.0);
        assert_eq!(r.xx(), 40.0);
        assert_eq!(r.yy(), 60.0);
        assert_eq!(r.center(), Point::new(25.0, 40.0));
    }

    #[test]
    fn test_rectangle_valid_invariant() {
        // 幅または高さが0以下なら無効
        assert!(!Rectangle::new(0.0, 0.0, 0.0, 0.0).is_valid());
        assert!(!Rectangle::new(0.0, 0.0, 10.0, 0.0).is_valid());
        assert!(!Rectangle::new(0.0, 0.0, 10.0, -5.0).is_valid());
        assert!(Rectangle::new(0.0, 0.0, 10.0, 5.0).is_valid());
    }

    #[test]
    fn test_rectangle_interactive_resize() {
        let mut r = Rectangle::default();
        r.set_origin(100.0, 100.0);
        assert!(!r.is_valid());

        r.drag_corner(150.0, 130.0);
        assert!(r.is_valid());
        assert_eq!(r.w, 50.0);
        assert_eq!(r.h, 30.0);

        // 逆方向へのドラッグは無効のまま
        r.drag_corner(90.0, 130.0);
        assert!(!r.is_valid());
    }

    #[test]
    fn test_rectangle_containment_boundary() {
        let r = Rectangle::new(10.0, 10.0, 20.0, 20.0);

        // 境界上の点: contains は真、contains_interior は偽
        let on_edge = Point::new(10.0, 15.0);
        assert!(r.contains(on_edge));
        assert!(!r.contains_interior(on_edge));

        let inside = Point::new(15.0, 15.0);
        assert!(r.contains(inside));
        assert!(r.contains_interior(inside));

        let outside = Point::new(35.0, 15.0);
        assert!(!r.contains(outside));
        assert!(!r.contains_interior(outside));
    }

    #[test]
    fn test_circle_area() {
        let c = Circle::new(0.0, 0.0, 2.0);
        assert!((c.area() - std::f64::consts::PI * 4.0).abs() < 1e-9);
        assert_eq!(c.center(), Point::new(0.0, 0.0));
    }
}
