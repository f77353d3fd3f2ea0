//! スレッド実装の詳細
//!
//! Capture / Detection / Serial の3ループの実装を含みます。
//! pipeline.rsから分離され、共有コンテキストはすべて引数で受け取ります。

use crate::application::pipeline::SharedState;
use crate::application::recovery::RecoveryState;
use crate::application::runtime_state::RuntimeState;
use crate::application::stats::{StatKind, StatsCollector};
use crate::domain::{
    build_registry, CameraConfig, CapturePort, DetectionConfig, DetectorPort, DomainResult,
    Frame, GenerationRecord, PersistencePort, PetriDish, Point, PreviewPort, Rectangle,
    SegmenterPort, SerialLink,
};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// プレビュー合成の色（BGR）
const MASK_COLOR: [u8; 3] = [0, 0, 0];
const BOX_COLOR: [u8; 3] = [0, 255, 0];

/// Captureスレッドのメインループ
///
/// フレームを読み、作業解像度へ中央切り出しし、フレームロックの下で
/// バッファへ積む。プレビュー合成はコピーに対して行い、検出に使う
/// バッファの中身には影響させない。表示レートまでスロットリングする。
pub(crate) fn capture_thread<C: CapturePort, V: PreviewPort>(
    capture: Arc<Mutex<C>>,
    preview: Arc<Mutex<V>>,
    shared: Arc<SharedState>,
    state: RuntimeState,
    config: CameraConfig,
) {
    let info = {
        let guard = capture.lock().unwrap();
        guard.device_info()
    };
    tracing::info!(
        "Capture thread started: {} ({}x{}), working resolution {}x{}",
        info.name,
        info.width,
        info.height,
        config.frame_width,
        config.frame_height
    );

    let display_interval = config.display_interval();
    let mut frame_count = 0u64;

    while state.is_running() {
        let started = Instant::now();

        let result = {
            let mut guard = capture.lock().unwrap();
            guard.read_frame()
        };

        match result {
            Ok(native) => {
                let frame = native.center_crop(config.frame_width, config.frame_height);

                {
                    let mut buffer = shared.frame_buffer.lock().unwrap();
                    buffer.push(frame.clone());
                }

                frame_count += 1;
                if frame_count.is_multiple_of(600) {
                    tracing::debug!(
                        "Frame captured: {}x{} (count: {})",
                        frame.width,
                        frame.height,
                        frame_count
                    );
                }

                let composed = compose_preview(frame, &shared);
                if let Err(e) = preview.lock().unwrap().present(&composed) {
                    tracing::warn!("Preview present failed: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!("Capture error: {}", e);
                std::thread::sleep(Duration::from_millis(10));
            }
        }

        let elapsed = started.elapsed();
        if elapsed < display_interval {
            std::thread::sleep(display_interval - elapsed);
        }
    }

    tracing::info!("Capture thread stopped");
}

/// プレビュー用にゾーン・ドラフト・直近の検出ボックスを合成する
fn compose_preview(mut frame: Frame, shared: &SharedState) -> Frame {
    {
        let zones = shared.exclusion_zones.lock().unwrap();

        if let Some(draft) = zones.draft() {
            if draft.is_valid() {
                frame.fill_rect(draft, MASK_COLOR);
            }
        }
        for zone in zones.snapshot() {
            frame.fill_rect(&zone, MASK_COLOR);
        }
    }

    {
        let boxes = shared.last_boxes.lock().unwrap();
        for b in boxes.iter() {
            frame.draw_rect(b, BOX_COLOR);
        }
    }

    frame
}

/// Detectionスレッドのメインループ
///
/// トリガで1周期を実行する。auto_triggerが有効な場合はトリガが
/// 来なくても設定間隔で自走する。トリガ送信側が落ちたら
/// （Disconnected）シャットダウンとみなして抜ける。
#[allow(clippy::too_many_arguments)]
pub(crate) fn detection_thread<D: DetectorPort, S: SegmenterPort>(
    detector: Arc<Mutex<D>>,
    segmenter: Arc<Mutex<S>>,
    shared: Arc<SharedState>,
    trigger_rx: Receiver<()>,
    state: RuntimeState,
    config: DetectionConfig,
    mut dish: PetriDish,
    mut stats: StatsCollector,
) {
    tracing::info!(
        "Detection thread started (auto_trigger={}, threshold={})",
        config.auto_trigger,
        config.score_threshold
    );

    loop {
        if config.auto_trigger {
            match trigger_rx.recv_timeout(config.auto_trigger_interval()) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else if trigger_rx.recv().is_err() {
            break;
        }

        if !state.is_running() {
            break;
        }

        let cycle_started = Instant::now();

        match run_detection_cycle(&detector, &segmenter, &shared, &config, &mut dish, &mut stats)
        {
            Ok(Some(count)) => {
                tracing::info!(
                    "Detection cycle published {} targets in {:?}",
                    count,
                    cycle_started.elapsed()
                );
            }
            Ok(None) => {
                tracing::debug!("Frame buffer empty, detection cycle skipped");
            }
            Err(e) => {
                // キャリブレーション失敗等は「この周期はターゲットなし」に
                // 格下げする。世代は発行しない。
                tracing::warn!("Detection cycle failed, no targets this cycle: {}", e);
            }
        }

        stats.record_cycle();
        stats.record_duration(StatKind::Cycle, cycle_started.elapsed());
        if stats.should_report() {
            stats.report_and_reset();
        }

        // 周期レートの上限までスロットリング
        let elapsed = cycle_started.elapsed();
        let min_interval = config.cycle_interval();
        if elapsed < min_interval {
            std::thread::sleep(min_interval - elapsed);
        }
    }

    tracing::info!("Detection thread stopped");
}

/// 1検出周期: 平均化→キャリブレーション→推論→レジストリ→発行
///
/// この順序はループ本体の逐次実行で保証される。世代交代
/// （set_targets＋レコード設置）は単一クリティカルセクションで行い、
/// シリアルループが作りかけのバッファを観測しないようにする。
fn run_detection_cycle<D: DetectorPort, S: SegmenterPort>(
    detector: &Arc<Mutex<D>>,
    segmenter: &Arc<Mutex<S>>,
    shared: &SharedState,
    config: &DetectionConfig,
    dish: &mut PetriDish,
    stats: &mut StatsCollector,
) -> DomainResult<Option<usize>> {
    let average_started = Instant::now();
    let averaged = {
        let buffer = shared.frame_buffer.lock().unwrap();
        buffer.average()
    };
    let Some(averaged) = averaged else {
        return Ok(None);
    };
    stats.record_duration(StatKind::Average, average_started.elapsed());

    let zones = shared.exclusion_zones.lock().unwrap().snapshot();
    dish.set_diameter(*shared.dish_diameter_mm.lock().unwrap());

    let calibration_started = Instant::now();
    let mask = {
        let mut guard = segmenter.lock().unwrap();
        guard.segment(&averaged)?
    };
    let calibration = dish.calibrate(mask)?;
    stats.record_duration(StatKind::Calibration, calibration_started.elapsed());

    let inference_started = Instant::now();
    let detections = {
        let mut guard = detector.lock().unwrap();
        guard.infer(&averaged, config.score_threshold)?
    };
    stats.record_duration(StatKind::Inference, inference_started.elapsed());

    let colonies = build_registry(
        &detections,
        averaged.width,
        averaged.height,
        config.score_threshold,
        &calibration,
        &zones,
    );

    let boxes: Vec<Rectangle> = colonies.iter().map(|c| c.pixel_box()).collect();
    let targets: Vec<Point> = colonies.iter().map(|c| c.physical_offset()).collect();
    let count = colonies.len();

    {
        let mut session = shared.session.lock().unwrap();
        session.set_targets(&targets);
        *shared.pending_record.lock().unwrap() = Some(GenerationRecord {
            generation: session.generation(),
            boxes: boxes.clone(),
            targets,
            corrections: Vec::new(),
            frame: averaged,
        });
    }

    *shared.last_boxes.lock().unwrap() = boxes;

    Ok(Some(count))
}

/// Serialスレッドのメインループ
///
/// タイムアウト付きの行読み取りでブロックし、タイムアウトごとに
/// シャットダウンを確認する。トランスポート障害では読み取りを
/// 止めず、連続失敗が閾値に達したらバックオフ付きで再接続を試みる。
pub(crate) fn serial_thread<L: SerialLink, P: PersistencePort>(
    link: Arc<Mutex<L>>,
    persistence: Arc<Mutex<P>>,
    shared: Arc<SharedState>,
    state: RuntimeState,
    mut recovery: RecoveryState,
) {
    tracing::info!("Serial thread started");

    while state.is_running() {
        let read_result = {
            let mut guard = link.lock().unwrap();
            guard.read_line()
        };

        let line = match read_result {
            Ok(Some(line)) => {
                recovery.record_success();
                line
            }
            Ok(None) => continue, // タイムアウト: シャットダウン確認へ戻る
            Err(e) => {
                tracing::warn!("Transport read failed: {}", e);
                if recovery.record_error() {
                    attempt_reconnect(&link, &mut recovery);
                } else {
                    std::thread::sleep(Duration::from_millis(10));
                }
                continue;
            }
        };

        dispatch_device_line(&line, &link, &persistence, &shared);
    }

    tracing::info!("Serial thread stopped");
}

/// 装置からの1行をセッションへディスパッチする
///
/// handle_lineと応答の書き込みを同じセッション臨界区間で行う。
/// 世代交代(set_targets)が引き込みと送信の間に割り込むと、旧世代の
/// PT行が新世代の配達として流れてしまうため。
fn dispatch_device_line<L: SerialLink, P: PersistencePort>(
    line: &str,
    link: &Arc<Mutex<L>>,
    persistence: &Arc<Mutex<P>>,
    shared: &SharedState,
) {
    let completed = {
        let mut session = shared.session.lock().unwrap();
        let outcome = session.handle_line(line);

        if let Some(reply) = outcome.reply.as_deref() {
            let write_result = {
                let mut guard = link.lock().unwrap();
                guard.write_line(reply)
            };
            if let Err(e) = write_result {
                // 送信失敗してもカーソルは戻さない。再送は装置側の
                // 次のENTERに任せるベストエフォート方針。
                tracing::warn!("Transport write failed for {:?}: {}", reply, e);
            }
        }

        if outcome.completed {
            Some((session.generation(), session.corrections().to_vec()))
        } else {
            None
        }
    };

    if let Some((generation, corrections)) = completed {
        finish_generation(generation, corrections, persistence, shared);
    }
}

/// Syncedした世代のレコードに補正列を添えて永続化する
fn finish_generation<P: PersistencePort>(
    generation: u64,
    corrections: Vec<Point>,
    persistence: &Arc<Mutex<P>>,
    shared: &SharedState,
) {
    // 世代が一致する場合だけ取り出す。Synced直後に次の世代が発行されて
    // いたら、そのレコードは新世代のものなので手を付けない。
    let record = {
        let mut pending = shared.pending_record.lock().unwrap();
        match pending.as_ref().map(|r| r.generation) {
            Some(g) if g == generation => pending.take(),
            Some(g) => {
                tracing::warn!(
                    "Pending record generation {} does not match synced generation {}, leaving it",
                    g,
                    generation
                );
                None
            }
            None => {
                tracing::warn!(
                    "Generation {} synced but no pending record to persist",
                    generation
                );
                None
            }
        }
    };
    let Some(mut record) = record else {
        return;
    };

    record.corrections = corrections;

    let result = {
        let mut guard = persistence.lock().unwrap();
        guard.save_generation(&record)
    };
    match result {
        Ok(()) => tracing::info!(
            "Generation {} record persisted ({} corrections)",
            generation,
            record.corrections.len()
        ),
        Err(e) => tracing::error!("Failed to persist generation {}: {}", generation, e),
    }
}

/// バックオフ付きの再接続試行
fn attempt_reconnect<L: SerialLink>(link: &Arc<Mutex<L>>, recovery: &mut RecoveryState) {
    let backoff = recovery.current_backoff();
    tracing::info!(
        "Attempting serial reconnect #{} (backoff {:?})",
        recovery.total_reconnects() + 1,
        backoff
    );
    std::thread::sleep(backoff);
    recovery.record_reconnect_attempt();

    let result = {
        let mut guard = link.lock().unwrap();
        guard.reconnect()
    };
    match result {
        Ok(()) => {
            tracing::info!("Serial link reconnected");
            recovery.record_success();
        }
        Err(e) => {
            tracing::warn!("Reconnect failed: {}", e);
        }
    }
}
