//! Frame pump with latest-frame-wins backpressure.
//!
//! The render loop submits a snapshot every tick; the pump keeps at most one
//! exchange in flight and collapses everything captured in the meantime into
//! a single pending slot. Network cadence is therefore set by service
//! round-trip time while capture cadence stays tied to the display, and the
//! service always sees the freshest frame instead of a growing backlog.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;

use crate::client::{Exchange, Snapshot};
use crate::session::{FeedbackItem, SharedSession};

/// 容量 1 のメールボックス。挿入は常に置き換えで、待っていた古い
/// フレームは捨てられる。キューにしないこと。
#[derive(Debug, Default)]
pub struct FrameSlot {
    frame: Option<Snapshot>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self { frame: None }
    }

    /// 格納する。置き換えられた古いフレームを返す
    pub fn put(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        self.frame.replace(snapshot)
    }

    pub fn take(&mut self) -> Option<Snapshot> {
        self.frame.take()
    }

    pub fn clear(&mut self) {
        self.frame = None;
    }

    pub fn len(&self) -> usize {
        usize::from(self.frame.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }
}

/// in-flight フラグと保留スロットは必ず同じロックの下で遷移させる。
/// 別々に守ると submit と完了処理の間で取りこぼしが起きる。
#[derive(Debug, Default)]
struct Gate {
    in_flight: bool,
    pending: FrameSlot,
}

/// 交換回数の集計。メインループの統計行で読む
#[derive(Debug, Default)]
pub struct PumpStats {
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    /// 保留スロットで上書きされて捨てられたフレーム数
    pub coalesced: AtomicU64,
}

impl PumpStats {
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.completed.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.coalesced.load(Ordering::Relaxed),
        )
    }
}

pub struct FramePump<E: Exchange> {
    exchange: Arc<E>,
    session: SharedSession,
    gate: Arc<Mutex<Gate>>,
    running: Arc<AtomicBool>,
    runtime: Handle,
    feedback_tx: Sender<Vec<FeedbackItem>>,
    stats: Arc<PumpStats>,
}

impl<E: Exchange> FramePump<E> {
    pub fn new(
        exchange: Arc<E>,
        session: SharedSession,
        feedback_tx: Sender<Vec<FeedbackItem>>,
        running: Arc<AtomicBool>,
        runtime: Handle,
    ) -> Self {
        Self {
            exchange,
            session,
            gate: Arc::new(Mutex::new(Gate::default())),
            running,
            runtime,
            feedback_tx,
            stats: Arc::new(PumpStats::default()),
        }
    }

    pub fn stats(&self) -> &PumpStats {
        &self.stats
    }

    pub fn in_flight(&self) -> bool {
        self.gate.lock().unwrap().in_flight
    }

    pub fn pending_len(&self) -> usize {
        self.gate.lock().unwrap().pending.len()
    }

    /// 1 フレームの送信要求。交換中なら保留スロットへ (上書き)、
    /// 空いていればワーカーを起こして即送信する
    pub fn submit(&self, snapshot: Snapshot) {
        let mut gate = self.gate.lock().unwrap();
        if gate.in_flight {
            if gate.pending.put(snapshot).is_some() {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }
        gate.in_flight = true;
        gate.pending.clear();
        drop(gate);

        self.spawn_worker(snapshot);
    }

    fn spawn_worker(&self, first: Snapshot) {
        let exchange = self.exchange.clone();
        let session = self.session.clone();
        let gate = self.gate.clone();
        let running = self.running.clone();
        let feedback_tx = self.feedback_tx.clone();
        let stats = self.stats.clone();

        self.runtime.spawn(async move {
            let mut frame = first;
            loop {
                let result = exchange.exchange(frame).await;

                if !running.load(Ordering::SeqCst) {
                    // Torn down while the request was out: drop the result
                    // and whatever was waiting.
                    let mut gate = gate.lock().unwrap();
                    gate.pending.clear();
                    gate.in_flight = false;
                    return;
                }

                match result {
                    Ok(analysis) => {
                        let feedback = analysis.feedback.clone();
                        session.lock().unwrap().apply(analysis);
                        // The narrator reacts on every applied response, even
                        // when the content repeats; its repeat cap depends on
                        // seeing each one.
                        let _ = feedback_tx.send(feedback);
                        stats.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                        eprintln!("[pump] exchange failed: {err}");
                    }
                }

                let mut gate = gate.lock().unwrap();
                match gate.pending.take() {
                    // Still marked in flight; go straight into the next
                    // exchange with the freshest frame.
                    Some(next) => frame = next,
                    None => {
                        gate.in_flight = false;
                        return;
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ExchangeError, SnapshotFormat};
    use crate::session::{Analysis, SessionState};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Duration;

    /// Scripted exchange: sleeps for a fixed round trip, records which
    /// frames it saw (tagged by their first byte) and how many exchanges
    /// overlapped.
    struct FakeExchange {
        active: AtomicUsize,
        max_active: AtomicUsize,
        sent: Mutex<Vec<u8>>,
        round_trip: Duration,
        fail: bool,
    }

    impl FakeExchange {
        fn ok(round_trip: Duration) -> Self {
            Self {
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                round_trip,
                fail: false,
            }
        }

        fn failing(round_trip: Duration) -> Self {
            Self { fail: true, ..Self::ok(round_trip) }
        }

        fn sent_tags(&self) -> Vec<u8> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Exchange for FakeExchange {
        fn exchange(
            &self,
            snapshot: Snapshot,
        ) -> impl std::future::Future<Output = Result<Analysis, ExchangeError>> + Send {
            async move {
                let tag = snapshot.data[0];
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_active.fetch_max(now, Ordering::SeqCst);
                self.sent.lock().unwrap().push(tag);

                tokio::time::sleep(self.round_trip).await;
                self.active.fetch_sub(1, Ordering::SeqCst);

                if self.fail {
                    return Err(ExchangeError::BadStatus(
                        reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    ));
                }
                Ok(Analysis {
                    keypoints: Vec::new(),
                    feedback: vec![FeedbackItem {
                        message: format!("frame {tag}"),
                        keypoint_index: None,
                        from_part: None,
                        to_part: None,
                    }],
                    score: Some(f64::from(tag)),
                    status: "ok".to_string(),
                })
            }
        }
    }

    fn snap(tag: u8) -> Snapshot {
        Snapshot::new(vec![tag], SnapshotFormat::Jpeg)
    }

    fn make_pump<E: Exchange>(
        exchange: Arc<E>,
    ) -> (
        FramePump<E>,
        Receiver<Vec<FeedbackItem>>,
        Arc<AtomicBool>,
        SharedSession,
    ) {
        let session = SessionState::shared("tree_pose");
        let (tx, rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let pump = FramePump::new(exchange, session.clone(), tx, running.clone(), Handle::current());
        (pump, rx, running, session)
    }

    async fn drain(pump: &FramePump<impl Exchange>) {
        while pump.in_flight() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_frame_slot_holds_at_most_one() {
        let mut slot = FrameSlot::new();
        assert_eq!(slot.len(), 0);
        assert!(slot.is_empty());

        assert!(slot.put(snap(1)).is_none());
        assert_eq!(slot.len(), 1);

        // Inserting again displaces, never queues
        let displaced = slot.put(snap(2));
        assert_eq!(displaced.unwrap().data, vec![1]);
        assert_eq!(slot.len(), 1);

        assert_eq!(slot.take().unwrap().data, vec![2]);
        assert_eq!(slot.len(), 0);
        assert!(slot.take().is_none());

        slot.put(snap(3));
        slot.clear();
        assert!(slot.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_at_most_one_exchange_in_flight() {
        let fake = Arc::new(FakeExchange::ok(Duration::from_millis(20)));
        let (pump, _rx, _running, _session) = make_pump(fake.clone());

        for tag in 0..10 {
            pump.submit(snap(tag));
            assert!(pump.pending_len() <= 1);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drain(&pump).await;

        assert_eq!(fake.max_active.load(Ordering::SeqCst), 1);
        // Plenty of frames went out, just never two at once
        assert!(fake.sent_tags().len() >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_latest_frame_wins_coalescing() {
        let fake = Arc::new(FakeExchange::ok(Duration::from_millis(60)));
        let (pump, rx, _running, session) = make_pump(fake.clone());

        pump.submit(snap(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Captured while frame 1 is still in flight: 2 then 3.
        // 3 must displace 2, and go out right after 1 completes.
        pump.submit(snap(2));
        pump.submit(snap(3));
        assert_eq!(pump.pending_len(), 1);

        drain(&pump).await;

        assert_eq!(fake.sent_tags(), vec![1, 3]);
        let (completed, failed, coalesced) = pump.stats().snapshot();
        assert_eq!(completed, 2);
        assert_eq!(failed, 0);
        assert_eq!(coalesced, 1);

        // Both applied in completion order; frame 3 is what remains
        assert_eq!(session.lock().unwrap().score, Some(3.0));
        let narrated: Vec<_> = rx.try_iter().collect();
        assert_eq!(narrated.len(), 2);
        assert_eq!(narrated[1][0].message, "frame 3");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_failure_leaves_session_unchanged() {
        let fake = Arc::new(FakeExchange::failing(Duration::from_millis(10)));
        let (pump, rx, _running, session) = make_pump(fake.clone());

        {
            let mut state = session.lock().unwrap();
            state.status = "previous good state".to_string();
            state.score = Some(50.0);
        }

        pump.submit(snap(7));
        drain(&pump).await;

        let state = session.lock().unwrap();
        assert_eq!(state.status, "previous good state");
        assert_eq!(state.score, Some(50.0));
        assert!(state.feedback.is_empty());
        drop(state);

        let (completed, failed, _) = pump.stats().snapshot();
        assert_eq!(completed, 0);
        assert_eq!(failed, 1);
        assert!(rx.try_recv().is_err(), "no narration on a failed cycle");

        // The pump stays usable for the next cycle
        pump.submit(snap(8));
        drain(&pump).await;
        assert_eq!(pump.stats().snapshot().1, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_results_after_stop_are_discarded() {
        let fake = Arc::new(FakeExchange::ok(Duration::from_millis(40)));
        let (pump, rx, running, session) = make_pump(fake.clone());

        pump.submit(snap(1));
        tokio::time::sleep(Duration::from_millis(10)).await;
        pump.submit(snap(2)); // parked in the slot

        // Teardown happens while frame 1 is still out
        running.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(80)).await;

        let state = session.lock().unwrap();
        assert_eq!(state.score, None, "late result must not be applied");
        assert!(state.feedback.is_empty());
        drop(state);

        assert!(rx.try_recv().is_err());
        assert!(!pump.in_flight());
        assert_eq!(pump.pending_len(), 0, "parked frame is dropped on stop");
        assert_eq!(fake.sent_tags(), vec![1], "the parked frame is never sent");
    }
}
