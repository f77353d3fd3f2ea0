/// モックシリアルアダプタ
///
/// テスト・装置なし運転用のインメモリ半二重リンク。
/// `RemoteDevice`ハンドルが装置側を演じ、受信行の注入と
/// ホスト送信行の観測ができる。

use crate::domain::{DomainResult, SerialLink};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// モックシリアルアダプタ（ホスト側）
pub struct MockSerialAdapter {
    inbound: Arc<Mutex<VecDeque<String>>>,
    outbound: Arc<Mutex<Vec<String>>>,
}

/// 装置側ハンドル（テストハーネス用）
#[derive(Clone)]
pub struct RemoteDevice {
    inbound: Arc<Mutex<VecDeque<String>>>,
    outbound: Arc<Mutex<Vec<String>>>,
}

impl MockSerialAdapter {
    /// 装置ハンドルなしで作成（装置なし運転: 何も受信しない）
    pub fn new() -> Self {
        Self::with_remote().0
    }

    /// 装置側ハンドルと対で作成
    pub fn with_remote() -> (Self, RemoteDevice) {
        let inbound = Arc::new(Mutex::new(VecDeque::new()));
        let outbound = Arc::new(Mutex::new(Vec::new()));

        let adapter = Self {
            inbound: Arc::clone(&inbound),
            outbound: Arc::clone(&outbound),
        };
        let remote = RemoteDevice { inbound, outbound };

        (adapter, remote)
    }
}

impl Default for MockSerialAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialLink for MockSerialAdapter {
    fn read_line(&mut self) -> DomainResult<Option<String>> {
        if let Some(line) = self.inbound.lock().unwrap().pop_front() {
            return Ok(Some(line));
        }

        // 実機の読み取りタイムアウトを粗く模す
        std::thread::sleep(Duration::from_millis(2));
        Ok(None)
    }

    fn write_line(&mut self, line: &str) -> DomainResult<()> {
        tracing::debug!("MockSerial: host -> device {:?}", line);
        self.outbound.lock().unwrap().push(line.to_string());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn reconnect(&mut self) -> DomainResult<()> {
        tracing::info!("MockSerial: reconnected");
        Ok(())
    }
}

impl RemoteDevice {
    /// 装置からホストへ1行送る
    pub fn send_line(&self, line: &str) {
        self.inbound.lock().unwrap().push_back(line.to_string());
    }

    /// ホストが送った行のコピー
    pub fn sent_lines(&self) -> Vec<String> {
        self.outbound.lock().unwrap().clone()
    }

    /// ホストが指定本数を送るまで待つ（テスト用ポーリング）
    pub fn wait_for_sent(&self, count: usize, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.outbound.lock().unwrap().len() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}
