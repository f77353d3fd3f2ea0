//! フレームバッファ
//!
//! 直近Nフレームの時間平均でセンサノイズを均すリングバッファ。
//! それ自体はスレッドセーフではない。キャプチャループのpushと
//! 検出ループのaverageは共有のフレームロックを保持して呼ぶこと。

use std::collections::VecDeque;

use crate::domain::types::{Frame, FRAME_CHANNELS};

/// 固定容量のフレームリング
#[derive(Debug)]
pub struct FrameBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameBuffer {
    /// # Panics
    /// capacityが0の場合（設定のvalidateで弾かれる前提）
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame buffer capacity must be positive");
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// 最新フレームを追加する
    ///
    /// 最初のpushは同じフレームを容量いっぱいまで複製する（ウォームスタート）。
    /// 以降は最古を1枚捨てて末尾に積むFIFO。解像度が変わったら
    /// バッファを破棄して新しいフレームでウォームスタートし直す。
    pub fn push(&mut self, frame: Frame) {
        if let Some(front) = self.frames.front() {
            if front.width != frame.width || front.height != frame.height {
                tracing::warn!(
                    "Frame resolution changed ({}x{} -> {}x{}), restarting buffer",
                    front.width,
                    front.height,
                    frame.width,
                    frame.height
                );
                self.frames.clear();
            }
        }

        if self.frames.is_empty() {
            for _ in 0..self.capacity - 1 {
                self.frames.push_back(frame.clone());
            }
            self.frames.push_back(frame);
        } else {
            if self.frames.len() == self.capacity {
                self.frames.pop_front();
            }
            self.frames.push_back(frame);
        }
    }

    /// 保持中フレームのピクセル毎時間平均を返す
    ///
    /// u32で累積してから切り捨て除算でu8へ戻す。1枚でもpushされて
    /// いれば定義される（ウォームスタートにより常に容量分保持）。
    pub fn average(&self) -> Option<Frame> {
        let first = self.frames.front()?;
        let len = self.frames.len() as u32;

        let byte_count = first.pixel_count() * FRAME_CHANNELS;
        let mut sums = vec![0u32; byte_count];

        for frame in &self.frames {
            for (sum, &v) in sums.iter_mut().zip(frame.data.iter()) {
                *sum += v as u32;
            }
        }

        let data = sums.into_iter().map(|s| (s / len) as u8).collect();
        Some(Frame::new(data, first.width, first.height))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
