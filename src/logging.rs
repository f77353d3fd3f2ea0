/// ログ・トレーシング基盤
///
/// tracingを使用した統一的なログ出力。非同期ファイル出力
/// （tracing-appender）でワーカーループへの影響を抑える。

use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ログシステムを初期化
///
/// # Arguments
/// - `log_level`: ログレベル（"info", "debug", "trace"等）
/// - `json_format`: JSON形式で出力するか
/// - `log_dir`: ログファイル出力先（None = 標準出力）
///
/// # Returns
/// - `Some(WorkerGuard)` - プログラム終了まで保持必須（Drop時にログスレッド終了）
/// - `None` - 標準出力モード、または既にsubscriberが設定済み
pub fn init_logging(
    log_level: &str,
    json_format: bool,
    log_dir: Option<PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    match log_dir {
        Some(dir) => {
            // ファイル出力（非同期）
            if let Err(e) = std::fs::create_dir_all(&dir) {
                eprintln!("Failed to create log directory {}: {}", dir.display(), e);
                return None;
            }

            let file_appender = tracing_appender::rolling::daily(dir, "colony_picker.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let subscriber = tracing_subscriber::registry().with(env_filter);

            let result = if json_format {
                subscriber
                    .with(fmt::layer().json().with_writer(non_blocking))
                    .try_init()
            } else {
                subscriber
                    .with(
                        fmt::layer()
                            .with_target(true)
                            .with_thread_ids(true)
                            .with_ansi(false) // ファイル出力時はANSIエスケープ無効
                            .with_writer(non_blocking),
                    )
                    .try_init()
            };

            if result.is_err() {
                return None;
            }

            info!(
                "Logging initialized (async file): level={}, format={}",
                log_level,
                if json_format { "json" } else { "text" }
            );
            Some(guard)
        }
        None => {
            // 標準出力（デバッグ用）
            let subscriber = tracing_subscriber::registry().with(env_filter);

            let result = if json_format {
                subscriber.with(fmt::layer().json()).try_init()
            } else {
                subscriber
                    .with(fmt::layer().with_target(true).with_thread_ids(true))
                    .try_init()
            };

            if result.is_ok() {
                info!(
                    "Logging initialized (stdout): level={}, format={}",
                    log_level,
                    if json_format { "json" } else { "text" }
                );
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_stdout() {
        // 標準出力モード（複数回呼んでもパニックしない）
        let guard = init_logging("debug", false, None);
        assert!(guard.is_none());

        tracing::info!("Test log message");
    }

    #[test]
    fn test_init_logging_file() {
        let temp_dir = std::env::temp_dir().join("colony_picker_test_logs");

        // グローバルsubscriberが既に設定されている場合はスキップ
        let guard = init_logging("info", false, Some(temp_dir.clone()));

        if guard.is_none() {
            return;
        }

        assert!(temp_dir.exists());

        tracing::info!("Test file log");

        // guardをDropしてログをフラッシュ
        drop(guard);

        let log_files: Vec<_> = std::fs::read_dir(&temp_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(!log_files.is_empty(), "Log file should be created");

        std::fs::remove_dir_all(temp_dir).ok();
    }
}
