/// 永続化アダプタ
///
/// 同期完了した世代を、タイムスタンプキーのディレクトリに
/// 予測（YOLO形式）・補正列・フレームPNGとして書き出す。

use crate::domain::{DomainError, DomainResult, GenerationRecord, PersistencePort, FRAME_CHANNELS};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// ファイル永続化アダプタ
pub struct FilePersistenceAdapter {
    output_dir: PathBuf,
}

impl FilePersistenceAdapter {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn record_dir(&self, record: &GenerationRecord) -> PathBuf {
        // コロン・ピリオドを含まないタイムスタンプキー
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S-%3f");
        self.output_dir
            .join(format!("{}_gen{:04}", stamp, record.generation))
    }
}

impl PersistencePort for FilePersistenceAdapter {
    fn save_generation(&mut self, record: &GenerationRecord) -> DomainResult<()> {
        let dir = self.record_dir(record);
        std::fs::create_dir_all(&dir).map_err(|e| {
            DomainError::Persistence(format!("Failed to create record directory: {}", e))
        })?;

        // 予測ボックス（class x y w h、ピクセル単位）
        let predictions: String = record
            .boxes
            .iter()
            .map(|b| format!("0 {} {} {} {}\n", b.x, b.y, b.w, b.h))
            .collect();
        std::fs::write(dir.join("predictions.txt"), predictions)
            .map_err(|e| DomainError::Persistence(format!("Failed to write predictions: {}", e)))?;

        // 送信ターゲットと装置の補正（物理座標[mm]）
        let targets: String = record
            .targets
            .iter()
            .map(|p| format!("{:.4},{:.4}\n", p.x, p.y))
            .collect();
        std::fs::write(dir.join("targets.txt"), targets)
            .map_err(|e| DomainError::Persistence(format!("Failed to write targets: {}", e)))?;

        let corrections: String = record
            .corrections
            .iter()
            .map(|p| format!("{:.4},{:.4}\n", p.x, p.y))
            .collect();
        std::fs::write(dir.join("corrections.txt"), corrections)
            .map_err(|e| DomainError::Persistence(format!("Failed to write corrections: {}", e)))?;

        // フレーム（BGR→RGBに入れ替えてPNG）
        let mut rgb = Vec::with_capacity(record.frame.data.len());
        for px in record.frame.data.chunks_exact(FRAME_CHANNELS) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }

        let img = image::RgbImage::from_raw(record.frame.width, record.frame.height, rgb)
            .ok_or_else(|| {
                DomainError::Persistence("Frame buffer size mismatch for PNG encode".to_string())
            })?;
        img.save(dir.join("frame.png"))
            .map_err(|e| DomainError::Persistence(format!("Failed to write frame PNG: {}", e)))?;

        tracing::info!(
            "Generation {} saved to {}",
            record.generation,
            dir.display()
        );

        Ok(())
    }
}

/// 保存を行わない永続化アダプタ（persistence.enabled = false 用）
pub struct NullPersistenceAdapter;

impl NullPersistenceAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullPersistenceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistencePort for NullPersistenceAdapter {
    fn save_generation(&mut self, record: &GenerationRecord) -> DomainResult<()> {
        tracing::debug!(
            "Persistence disabled, dropping generation {} record",
            record.generation
        );
        Ok(())
    }
}

/// 保存内容をメモリに蓄えるアダプタ（テストハーネス用）
pub struct RecordingPersistenceAdapter {
    records: Arc<Mutex<Vec<GenerationRecord>>>,
}

impl RecordingPersistenceAdapter {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 保存済みレコードへの共有ハンドル
    pub fn records(&self) -> Arc<Mutex<Vec<GenerationRecord>>> {
        Arc::clone(&self.records)
    }
}

impl Default for RecordingPersistenceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistencePort for RecordingPersistenceAdapter {
    fn save_generation(&mut self, record: &GenerationRecord) -> DomainResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Frame, Point, Rectangle};

    fn record() -> GenerationRecord {
        GenerationRecord {
            generation: 3,
            boxes: vec![Rectangle::new(10.0, 20.0, 5.0, 6.0)],
            targets: vec![Point::new(1.5, -2.5)],
            corrections: vec![Point::new(1.4999, -2.5001)],
            frame: Frame::filled(8, 8, [30, 60, 90]),
        }
    }

    #[test]
    fn test_file_persistence_writes_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = FilePersistenceAdapter::new(dir.path());

        adapter.save_generation(&record()).unwrap();

        // gen0003のディレクトリが1つでき、中に4ファイルある
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(entries.len(), 1);

        let record_dir = entries[0].path();
        assert!(record_dir
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with("_gen0003"));

        let corrections =
            std::fs::read_to_string(record_dir.join("corrections.txt")).unwrap();
        assert_eq!(corrections, "1.4999,-2.5001\n");

        let predictions =
            std::fs::read_to_string(record_dir.join("predictions.txt")).unwrap();
        assert_eq!(predictions, "0 10 20 5 6\n");

        assert!(record_dir.join("targets.txt").exists());
        assert!(record_dir.join("frame.png").exists());
    }

    #[test]
    fn test_recording_persistence_accumulates() {
        let mut adapter = RecordingPersistenceAdapter::new();
        let records = adapter.records();

        adapter.save_generation(&record()).unwrap();
        adapter.save_generation(&record()).unwrap();

        assert_eq!(records.lock().unwrap().len(), 2);
        assert_eq!(records.lock().unwrap()[0].generation, 3);
    }
}
