//! 統計情報管理モジュール
//!
//! 検出周期のレート・各処理段階のレイテンシを収集し、
//! 一定間隔でtracingに出力します。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// 統計情報の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// フレーム平均化
    Average,
    /// セグメンテーション＋キャリブレーション
    Calibration,
    /// 検出推論
    Inference,
    /// 検出周期全体（トリガ→発行）
    Cycle,
}

/// パーセンタイル統計値
#[derive(Debug, Clone)]
pub struct PercentileStats {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub count: usize,
}

/// 統計情報コレクター
///
/// 検出ループが単独で所有する。周期は手動トリガだと疎になるため、
/// レートは直近1分のウィンドウで数える。
#[derive(Debug)]
pub struct StatsCollector {
    /// 周期レート計測用のタイムスタンプ
    cycle_times: VecDeque<Instant>,
    /// 各処理段階の所要時間（最大1000サンプル保持）
    durations: std::collections::HashMap<StatKind, VecDeque<Duration>>,
    /// 最後の統計出力時刻
    last_report: Instant,
    /// 統計出力間隔
    report_interval: Duration,
}

impl StatsCollector {
    /// レート計算の時間範囲
    const RATE_WINDOW_SECS: u64 = 60;
    /// 最大サンプル保持数（パーセンタイル計算用）
    const MAX_DURATION_SAMPLES: usize = 1000;

    pub fn new(report_interval: Duration) -> Self {
        Self {
            cycle_times: VecDeque::new(),
            durations: std::collections::HashMap::new(),
            last_report: Instant::now(),
            report_interval,
        }
    }

    /// 検出周期の完了を記録（レート計測用）
    pub fn record_cycle(&mut self) {
        let now = Instant::now();
        self.cycle_times.push_back(now);

        let window = Duration::from_secs(Self::RATE_WINDOW_SECS);
        while let Some(&front) = self.cycle_times.front() {
            if now.duration_since(front) > window {
                self.cycle_times.pop_front();
            } else {
                break;
            }
        }
    }

    /// 処理時間を記録
    pub fn record_duration(&mut self, kind: StatKind, duration: Duration) {
        let queue = self.durations.entry(kind).or_default();
        queue.push_back(duration);

        if queue.len() > Self::MAX_DURATION_SAMPLES {
            queue.pop_front();
        }
    }

    /// 直近ウィンドウの周期レート（cycles/sec）
    pub fn current_rate(&self) -> f64 {
        if self.cycle_times.len() < 2 {
            return 0.0;
        }

        let count = self.cycle_times.len() as f64;
        if let (Some(&first), Some(&last)) = (self.cycle_times.front(), self.cycle_times.back()) {
            let elapsed = last.duration_since(first).as_secs_f64();
            if elapsed > 0.0 {
                return count / elapsed;
            }
        }
        0.0
    }

    /// パーセンタイル統計を計算
    pub fn percentile_stats(&self, kind: StatKind) -> Option<PercentileStats> {
        let queue = self.durations.get(&kind)?;
        if queue.is_empty() {
            return None;
        }

        let mut sorted: Vec<Duration> = queue.iter().copied().collect();
        sorted.sort();

        let count = sorted.len();
        let p50 = sorted[count * 50 / 100];
        let p95 = sorted[count * 95 / 100];
        let p99 = sorted[count * 99 / 100];

        Some(PercentileStats {
            p50,
            p95,
            p99,
            count,
        })
    }

    /// 統計レポートを出力すべきか判定
    pub fn should_report(&self) -> bool {
        self.last_report.elapsed() >= self.report_interval
    }

    /// 統計レポートを出力してタイマーをリセット
    pub fn report_and_reset(&mut self) {
        tracing::info!("=== Detection Cycle Statistics ===");
        tracing::info!("Cycle rate: {:.2}/s", self.current_rate());

        for kind in [
            StatKind::Average,
            StatKind::Calibration,
            StatKind::Inference,
            StatKind::Cycle,
        ] {
            if let Some(stats) = self.percentile_stats(kind) {
                tracing::info!(
                    "{:?}: p50={:.2}ms, p95={:.2}ms, p99={:.2}ms (n={})",
                    kind,
                    stats.p50.as_secs_f64() * 1000.0,
                    stats.p95.as_secs_f64() * 1000.0,
                    stats.p99.as_secs_f64() * 1000.0,
                    stats.count
                );
            }
        }

        tracing::info!("==================================");

        self.last_report = Instant::now();
    }
}
