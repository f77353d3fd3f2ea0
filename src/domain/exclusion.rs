//! 除外ゾーン
//!
//! 検出を捨てるフレーム座標系の矩形リスト。編集は対話スレッドが
//! 単独で行い、検出ループはスナップショットを取って読むだけにする
//! （イテレーション中の変更と衝突させない）。

use crate::domain::geometry::{Point, Rectangle};

/// 除外ゾーンのリストと編集中のドラフト矩形
#[derive(Debug, Default)]
pub struct ExclusionZones {
    zones: Vec<Rectangle>,
    draft: Option<Rectangle>,
}

impl ExclusionZones {
    pub fn new() -> Self {
        Self::default()
    }

    /// ゾーンを直接追加する。無効な矩形（w≤0 または h≤0）は拒否。
    pub fn add(&mut self, rect: Rectangle) -> bool {
        if !rect.is_valid() {
            tracing::warn!(
                "Rejected invalid exclusion zone: {}x{} at ({}, {})",
                rect.w,
                rect.h,
                rect.x,
                rect.y
            );
            return false;
        }
        self.zones.push(rect);
        true
    }

    /// ドラッグ開始（ドラフト矩形の原点を置く）
    pub fn begin_draft(&mut self, x: f64, y: f64) {
        let mut rect = Rectangle::default();
        rect.set_origin(x, y);
        self.draft = Some(rect);
    }

    /// ドラッグ中の対角点を更新
    pub fn drag_draft(&mut self, x: f64, y: f64) {
        if let Some(rect) = self.draft.as_mut() {
            rect.drag_corner(x, y);
        }
    }

    /// ドラフトを確定してゾーンリストへ移す
    ///
    /// 無効なドラフト（クリックのみ・逆方向ドラッグ）は捨てる。
    pub fn commit_draft(&mut self) -> Option<Rectangle> {
        let rect = self.draft.take()?;
        if rect.is_valid() {
            self.zones.push(rect);
            Some(rect)
        } else {
            None
        }
    }

    /// 編集中のドラフト（プレビュー合成用）
    pub fn draft(&self) -> Option<&Rectangle> {
        self.draft.as_ref()
    }

    /// クエリ点を含むゾーンのうち、中心が最も近いものを削除する
    ///
    /// 包含判定は境界を含む。どのゾーンにも含まれない点ならNone。
    pub fn remove_nearest(&mut self, p: Point) -> Option<Rectangle> {
        let index = self
            .zones
            .iter()
            .enumerate()
            .filter(|(_, z)| z.contains(p))
            .min_by(|(_, a), (_, b)| {
                let da = (a.center() - p).magnitude();
                let db = (b.center() - p).magnitude();
                da.total_cmp(&db)
            })
            .map(|(i, _)| i)?;

        Some(self.zones.remove(index))
    }

    /// 検出ループ用のコピー
    pub fn snapshot(&self) -> Vec<Rectangle> {
        self.zones.clone()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}
