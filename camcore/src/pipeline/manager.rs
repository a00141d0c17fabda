use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use api::response::PipelineState;
use bytes::Bytes;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::transcoder::{Outcome, Transcoder};
use super::{Clock, Segment, SystemClock};
use crate::config::RecorderConfig;
use crate::error::SessionError;
use crate::{metrics, new_broadcast_channel};

#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    Started {
        device_id: String,
        path: PathBuf,
        attempt: u32,
    },
    Failed {
        device_id: String,
        reason: String,
    },
    RestartScheduled {
        device_id: String,
        attempt: u32,
        delay: Duration,
    },
    Exhausted {
        device_id: String,
        failures: u32,
    },
    /// A retired transcoder has finished writing `path`.
    Finished {
        device_id: String,
        path: PathBuf,
    },
}

enum Command {
    Start {
        device_id: String,
        reply: oneshot::Sender<Result<PathBuf, SessionError>>,
    },
    Write {
        device_id: String,
        frame: Bytes,
    },
    Stop {
        device_id: String,
        reply: oneshot::Sender<bool>,
    },
    Exited {
        device_id: String,
        generation: u64,
        path: PathBuf,
        outcome: Outcome,
    },
    Restart {
        device_id: String,
        generation: u64,
    },
    Info {
        reply: oneshot::Sender<Vec<api::response::Pipeline>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

struct Pipeline {
    state: PipelineState,
    segment: Segment,
    path: PathBuf,
    sink: Option<mpsc::Sender<Bytes>>,
    generation: u64,
    failures: u32,
    started_at: Instant,
    written: u64,
    dropped: u64,
}

impl Pipeline {
    fn drop_frame(&mut self, device_id: &str, why: &str) {
        self.dropped += 1;
        metrics::DROPPED.inc();
        if self.dropped % 100 == 1 {
            warn!(
                device = device_id,
                dropped = self.dropped,
                state = ?self.state,
                "{}, dropping frames",
                why
            );
        } else {
            trace!(device = device_id, "{}, frame dropped", why);
        }
    }
}

/// Handle to the pipeline worker.
#[derive(Clone, Debug)]
pub struct PipelineManager {
    sender: mpsc::Sender<Command>,
    event_sender: broadcast::Sender<PipelineEvent>,
}

impl PipelineManager {
    pub fn new(cfg: RecorderConfig) -> Self {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: RecorderConfig, clock: Arc<dyn Clock>) -> Self {
        let (sender, recv) = mpsc::channel(1024);
        let event_sender = new_broadcast_channel!(64);
        let worker = Worker {
            root: PathBuf::from(&cfg.root),
            transcoder: Arc::new(Transcoder::new(&cfg)),
            cfg,
            clock,
            pipelines: HashMap::new(),
            tasks: Vec::new(),
            next_generation: 0,
            sender: sender.downgrade(),
            event_sender: event_sender.clone(),
        };
        tokio::spawn(worker.run(recv));
        PipelineManager {
            sender,
            event_sender,
        }
    }

    pub fn subscribe_event(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_sender.subscribe()
    }

    /// Start recording `device_id` unless it already is. Returns the output
    /// path of the running transcoder.
    pub async fn start(&self, device_id: String) -> Result<PathBuf, SessionError> {
        let (reply, recv) = oneshot::channel();
        let closed = || SessionError::PipelineStart {
            device: device_id.clone(),
            source: std::io::Error::other("pipeline manager stopped"),
        };
        self.sender
            .send(Command::Start {
                device_id: device_id.clone(),
                reply,
            })
            .await
            .map_err(|_| closed())?;
        recv.await.map_err(|_| closed())?
    }

    /// Queue a frame for `device_id`, starting its pipeline on first use.
    /// Never waits and never fails; overflow drops the frame.
    pub fn write_frame(&self, device_id: String, frame: Bytes) {
        if let Err(e) = self.sender.try_send(Command::Write { device_id, frame }) {
            metrics::DROPPED.inc();
            if let TrySendError::Full(Command::Write { device_id, .. }) = e {
                trace!(device = device_id, "pipeline manager busy, frame dropped");
            }
        }
    }

    /// Close the sink and let the transcoder finish. False when there was
    /// nothing to stop.
    pub async fn stop(&self, device_id: String) -> bool {
        let (reply, recv) = oneshot::channel();
        if self
            .sender
            .send(Command::Stop { device_id, reply })
            .await
            .is_err()
        {
            return false;
        }
        recv.await.unwrap_or(false)
    }

    pub async fn info(&self) -> Vec<api::response::Pipeline> {
        let (reply, recv) = oneshot::channel();
        if self.sender.send(Command::Info { reply }).await.is_err() {
            return vec![];
        }
        recv.await.unwrap_or_default()
    }

    /// Stop every pipeline and wait for the transcoders to exit.
    pub async fn shutdown(&self) {
        let (reply, recv) = oneshot::channel();
        if self.sender.send(Command::Shutdown { reply }).await.is_ok() {
            let _ = recv.await;
        }
    }
}

struct Worker {
    cfg: RecorderConfig,
    root: PathBuf,
    transcoder: Arc<Transcoder>,
    clock: Arc<dyn Clock>,
    pipelines: HashMap<String, Pipeline>,
    tasks: Vec<JoinHandle<()>>,
    next_generation: u64,
    sender: mpsc::WeakSender<Command>,
    event_sender: broadcast::Sender<PipelineEvent>,
}

impl Worker {
    async fn run(mut self, mut recv: mpsc::Receiver<Command>) {
        while let Some(command) = recv.recv().await {
            match command {
                Command::Start { device_id, reply } => {
                    let _ = reply.send(self.start(&device_id).await);
                }
                Command::Write { device_id, frame } => self.write(device_id, frame).await,
                Command::Stop { device_id, reply } => {
                    let _ = reply.send(self.stop(&device_id));
                }
                Command::Exited {
                    device_id,
                    generation,
                    path,
                    outcome,
                } => self.exited(device_id, generation, path, outcome),
                Command::Restart {
                    device_id,
                    generation,
                } => self.restart(device_id, generation).await,
                Command::Info { reply } => {
                    let _ = reply.send(self.info());
                }
                Command::Shutdown { reply } => {
                    self.shutdown().await;
                    let _ = reply.send(());
                }
            }
        }
        debug!("pipeline worker stopped");
    }

    async fn start(&mut self, device_id: &str) -> Result<PathBuf, SessionError> {
        if let Some(pipeline) = self.pipelines.get(device_id) {
            if pipeline.state == PipelineState::Active {
                return Ok(pipeline.path.clone());
            }
        }
        // An errored or exhausted pipeline is reinitialized from scratch.
        if let Some(old) = self.pipelines.remove(device_id) {
            debug!(device = device_id, state = ?old.state, "pipeline reinitialized");
        }
        let pipeline = self.launch(device_id, 0).await?;
        let path = pipeline.path.clone();
        self.pipelines.insert(device_id.to_string(), pipeline);
        Ok(path)
    }

    async fn write(&mut self, device_id: String, frame: Bytes) {
        let rollover = match self.pipelines.get(&device_id) {
            Some(pipeline) => {
                self.cfg.rollover
                    && pipeline.state == PipelineState::Active
                    && Segment::at(self.clock.now()) != pipeline.segment
            }
            None => {
                match self.launch(&device_id, 0).await {
                    Ok(pipeline) => {
                        self.pipelines.insert(device_id.clone(), pipeline);
                    }
                    Err(e) => {
                        error!(device = device_id, "{}, frame dropped", e);
                        metrics::DROPPED.inc();
                        return;
                    }
                }
                false
            }
        };
        if rollover {
            self.rollover(&device_id).await;
        }

        let Some(pipeline) = self.pipelines.get_mut(&device_id) else {
            metrics::DROPPED.inc();
            return;
        };
        let active = pipeline.state == PipelineState::Active;
        let result = match pipeline.sink.as_ref().filter(|_| active) {
            Some(sink) => sink.try_send(frame),
            None => {
                pipeline.drop_frame(&device_id, "pipeline not active");
                return;
            }
        };
        match result {
            Ok(()) => pipeline.written += 1,
            Err(TrySendError::Full(_)) => pipeline.drop_frame(&device_id, "transcoder is behind"),
            Err(TrySendError::Closed(_)) => pipeline.drop_frame(&device_id, "transcoder gone"),
        }
    }

    /// Close the current hour's file and continue in a new one.
    async fn rollover(&mut self, device_id: &str) {
        let Some(old) = self.pipelines.remove(device_id) else {
            return;
        };
        info!(
            device = device_id,
            path = %old.path.display(),
            "hour changed, rolling over recording"
        );
        drop(old.sink);
        match self.launch(device_id, old.failures).await {
            Ok(pipeline) => {
                self.pipelines.insert(device_id.to_string(), pipeline);
            }
            Err(e) => error!(device = device_id, "{}", e),
        }
    }

    fn stop(&mut self, device_id: &str) -> bool {
        match self.pipelines.remove(device_id) {
            Some(pipeline) => {
                info!(
                    device = device_id,
                    state = ?pipeline.state,
                    written = pipeline.written,
                    dropped = pipeline.dropped,
                    "pipeline stopped"
                );
                // Dropping the sink closes the transcoder's input.
                drop(pipeline.sink);
                true
            }
            None => false,
        }
    }

    async fn launch(&mut self, device_id: &str, failures: u32) -> Result<Pipeline, SessionError> {
        let start_error = |source| SessionError::PipelineStart {
            device: device_id.to_string(),
            source,
        };
        let segment = Segment::at(self.clock.now());
        let path = output_path(&self.root, device_id, segment)
            .await
            .map_err(start_error)?;
        let child = self.transcoder.spawn(&path).map_err(start_error)?;

        let (sink, frames) = mpsc::channel(self.cfg.sink_capacity);
        self.next_generation += 1;
        let generation = self.next_generation;

        let transcoder = self.transcoder.clone();
        let reporter = self.sender.upgrade();
        let device = device_id.to_string();
        let task_path = path.clone();
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(tokio::spawn(async move {
            let outcome = transcoder.feed(&device, child, frames).await;
            if let Some(reporter) = reporter {
                let _ = reporter
                    .send(Command::Exited {
                        device_id: device,
                        generation,
                        path: task_path,
                        outcome,
                    })
                    .await;
            }
        }));

        metrics::PIPELINE.inc();
        info!(
            device = device_id,
            path = %path.display(),
            attempt = failures + 1,
            "pipeline active"
        );
        let _ = self.event_sender.send(PipelineEvent::Started {
            device_id: device_id.to_string(),
            path: path.clone(),
            attempt: failures + 1,
        });
        Ok(Pipeline {
            state: PipelineState::Active,
            segment,
            path,
            sink: Some(sink),
            generation,
            failures,
            started_at: Instant::now(),
            written: 0,
            dropped: 0,
        })
    }

    fn exited(&mut self, device_id: String, generation: u64, path: PathBuf, outcome: Outcome) {
        metrics::PIPELINE.dec();
        let current = self
            .pipelines
            .get(&device_id)
            .is_some_and(|pipeline| pipeline.generation == generation);
        match outcome {
            Outcome::Failed(reason) if current => {
                let stable_after = self.cfg.stable_after();
                if let Some(pipeline) = self.pipelines.get_mut(&device_id) {
                    // a long enough run starts a new failure streak
                    if pipeline.started_at.elapsed() >= stable_after {
                        pipeline.failures = 0;
                    }
                }
                self.fail(device_id, reason)
            }
            outcome => {
                if let Outcome::Failed(reason) = outcome {
                    debug!(device = device_id, reason, "retired transcoder failed");
                }
                info!(device = device_id, path = %path.display(), "recording finished");
                let _ = self
                    .event_sender
                    .send(PipelineEvent::Finished { device_id, path });
            }
        }
    }

    /// Tear the pipeline down and either schedule a restart or give up.
    fn fail(&mut self, device_id: String, reason: String) {
        let Some(pipeline) = self.pipelines.get_mut(&device_id) else {
            return;
        };
        error!(
            device = device_id,
            "{}",
            SessionError::PipelineRuntime {
                device: device_id.clone(),
                reason: reason.clone(),
            }
        );
        let _ = self.event_sender.send(PipelineEvent::Failed {
            device_id: device_id.clone(),
            reason,
        });

        pipeline.sink = None;
        pipeline.state = PipelineState::Error;
        pipeline.failures += 1;

        if pipeline.failures > self.cfg.max_restarts {
            pipeline.state = PipelineState::Stopped;
            warn!(
                device = device_id,
                failures = pipeline.failures,
                "transcoder keeps failing, recording stopped until the device reconnects"
            );
            let _ = self.event_sender.send(PipelineEvent::Exhausted {
                device_id,
                failures: pipeline.failures,
            });
            return;
        }

        let delay = self.cfg.restart_delay();
        let generation = pipeline.generation;
        let attempt = pipeline.failures + 1;
        info!(device = device_id, attempt, ?delay, "transcoder restart scheduled");
        let _ = self.event_sender.send(PipelineEvent::RestartScheduled {
            device_id: device_id.clone(),
            attempt,
            delay,
        });
        if let Some(sender) = self.sender.upgrade() {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = sender
                    .send(Command::Restart {
                        device_id,
                        generation,
                    })
                    .await;
            });
        }
    }

    async fn restart(&mut self, device_id: String, generation: u64) {
        let failures = match self.pipelines.get_mut(&device_id) {
            Some(pipeline)
                if pipeline.generation == generation
                    && pipeline.state == PipelineState::Error =>
            {
                pipeline.state = PipelineState::Starting;
                pipeline.failures
            }
            // stopped, restarted or replaced in the meantime
            _ => return,
        };
        match self.launch(&device_id, failures).await {
            Ok(pipeline) => {
                self.pipelines.insert(device_id, pipeline);
            }
            Err(e) => {
                if let Some(pipeline) = self.pipelines.get_mut(&device_id) {
                    pipeline.state = PipelineState::Error;
                }
                self.fail(device_id, e.to_string());
            }
        }
    }

    fn info(&self) -> Vec<api::response::Pipeline> {
        let mut infos: Vec<_> = self
            .pipelines
            .iter()
            .map(|(device_id, pipeline)| api::response::Pipeline {
                device_id: device_id.clone(),
                state: pipeline.state,
                path: pipeline.path.to_string_lossy().to_string(),
                failures: pipeline.failures,
                written: pipeline.written,
                dropped: pipeline.dropped,
            })
            .collect();
        infos.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        infos
    }

    async fn shutdown(&mut self) {
        let devices: Vec<String> = self.pipelines.keys().cloned().collect();
        for device_id in devices {
            self.stop(&device_id);
        }
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        info!("all pipelines stopped");
    }
}

/// `{root}/{device}/{date}/{HH}.mp4`, creating directories. An existing file
/// for the same hour is kept and a numbered sibling is used instead.
async fn output_path(root: &Path, device_id: &str, segment: Segment) -> std::io::Result<PathBuf> {
    let dir = segment.dir(root, device_id);
    tokio::fs::create_dir_all(&dir).await?;
    let mut n = 0;
    loop {
        let path = dir.join(segment.file_name(n));
        if !tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }
        n += 1;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::clock::ManualClock;
    use chrono::{Local, TimeZone};

    const DEVICE: &str = "AA:BB:CC:DD:EE:FF";

    fn shell(root: &Path, script: &str) -> RecorderConfig {
        RecorderConfig {
            root: root.to_string_lossy().to_string(),
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                script.to_string(),
                "{output}".to_string(),
            ],
            sink_capacity: 16,
            restart_delay: 100,
            max_restarts: 3,
            stable_after: 30,
            stop_timeout: 2000,
            rollover: true,
        }
    }

    fn frame(n: u8) -> Bytes {
        Bytes::from(vec![0xFF, 0xD8, n, n, 0xFF, 0xD9])
    }

    async fn next_event(events: &mut broadcast::Receiver<PipelineEvent>) -> PipelineEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for pipeline event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_frames_are_recorded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PipelineManager::new(shell(dir.path(), "exec cat > \"$0\""));
        let mut events = manager.subscribe_event();

        for n in 1..=3 {
            manager.write_frame(DEVICE.to_string(), frame(n));
        }

        let path = match next_event(&mut events).await {
            PipelineEvent::Started { path, attempt, .. } => {
                assert_eq!(attempt, 1);
                path
            }
            other => panic!("unexpected event {other:?}"),
        };
        assert!(path.starts_with(dir.path().join("AA_BB_CC_DD_EE_FF")));

        let infos = manager.info().await;
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].state, PipelineState::Active);
        assert_eq!(infos[0].written, 3);

        assert!(manager.stop(DEVICE.to_string()).await);
        assert_eq!(
            next_event(&mut events).await,
            PipelineEvent::Finished {
                device_id: DEVICE.to_string(),
                path: path.clone()
            }
        );

        let expected: Vec<u8> = (1..=3).flat_map(|n| frame(n).to_vec()).collect();
        assert_eq!(std::fs::read(&path).unwrap(), expected);
        assert!(manager.info().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_without_pipeline_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PipelineManager::new(shell(dir.path(), "exec cat > \"$0\""));
        assert!(!manager.stop("nobody".to_string()).await);
        assert!(!manager.stop("nobody".to_string()).await);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_active() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PipelineManager::new(shell(dir.path(), "exec cat > \"$0\""));
        let a = manager.start(DEVICE.to_string()).await.unwrap();
        let b = manager.start(DEVICE.to_string()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(manager.info().await.len(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_no_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = shell(dir.path(), "");
        cfg.program = "/nonexistent/transcoder".to_string();
        let manager = PipelineManager::new(cfg);

        let err = manager.start(DEVICE.to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::PipelineStart { .. }));

        manager.write_frame(DEVICE.to_string(), frame(1));
        assert!(manager.info().await.is_empty());
    }

    #[tokio::test]
    async fn test_single_failure_restarts_once_after_delay() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("fail-once");
        std::fs::write(&marker, b"").unwrap();
        let script = format!(
            "if [ -e '{m}' ]; then rm '{m}'; exit 1; fi; exec cat > \"$0\"",
            m = marker.display()
        );
        let manager = PipelineManager::new(shell(dir.path(), &script));
        let mut events = manager.subscribe_event();

        manager.write_frame(DEVICE.to_string(), frame(1));

        assert!(matches!(
            next_event(&mut events).await,
            PipelineEvent::Started { attempt: 1, .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            PipelineEvent::Failed { .. }
        ));
        let failed_at = Instant::now();
        assert_eq!(
            next_event(&mut events).await,
            PipelineEvent::RestartScheduled {
                device_id: DEVICE.to_string(),
                attempt: 2,
                delay: Duration::from_millis(100),
            }
        );
        assert!(matches!(
            next_event(&mut events).await,
            PipelineEvent::Started { attempt: 2, .. }
        ));
        assert!(failed_at.elapsed() >= Duration::from_millis(90));

        // no further attempts
        let quiet = tokio::time::timeout(Duration::from_millis(400), events.recv()).await;
        assert!(quiet.is_err());
        let infos = manager.info().await;
        assert_eq!(infos[0].state, PipelineState::Active);
        assert_eq!(infos[0].failures, 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_restarts_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = shell(dir.path(), "exit 1");
        cfg.max_restarts = 2;
        cfg.restart_delay = 20;
        let manager = PipelineManager::new(cfg);
        let mut events = manager.subscribe_event();

        manager.write_frame(DEVICE.to_string(), frame(1));

        let mut started = 0;
        loop {
            match next_event(&mut events).await {
                PipelineEvent::Started { .. } => started += 1,
                PipelineEvent::Exhausted { failures, .. } => {
                    assert_eq!(failures, 3);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(started, 3);

        // frames are dropped, not retried, until the pipeline is stopped
        manager.write_frame(DEVICE.to_string(), frame(2));
        let infos = manager.info().await;
        assert_eq!(infos[0].state, PipelineState::Stopped);
        assert_eq!(infos[0].dropped, 1);

        assert!(manager.stop(DEVICE.to_string()).await);
        manager.write_frame(DEVICE.to_string(), frame(3));
        assert!(matches!(
            next_event(&mut events).await,
            PipelineEvent::Started { attempt: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_respawns_after_stable_run_are_bounded() {
        let dir = tempfile::tempdir().unwrap();
        // runs past stable_after, then turns its date directory into a file
        // so every respawn fails before spawning
        let mut cfg = shell(
            dir.path(),
            "sleep 1.3; d=$(dirname \"$0\"); rm -rf \"$d\"; touch \"$d\"; exit 1",
        );
        cfg.max_restarts = 2;
        cfg.restart_delay = 50;
        cfg.stable_after = 1;
        let manager = PipelineManager::new(cfg);
        let mut events = manager.subscribe_event();

        manager.write_frame(DEVICE.to_string(), frame(1));

        let mut scheduled = Vec::new();
        loop {
            match next_event(&mut events).await {
                PipelineEvent::RestartScheduled { attempt, .. } => {
                    scheduled.push(attempt);
                    assert!(scheduled.len() <= 2, "restarts not bounded: {scheduled:?}");
                }
                PipelineEvent::Exhausted { failures, .. } => {
                    assert_eq!(failures, 3);
                    break;
                }
                _ => {}
            }
        }
        assert_eq!(scheduled, vec![2, 3]);

        let infos = manager.info().await;
        assert_eq!(infos[0].state, PipelineState::Stopped);
        assert_eq!(infos[0].failures, 3);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_slow_transcoder_drops_newest_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = shell(dir.path(), "sleep 1");
        cfg.sink_capacity = 2;
        let manager = PipelineManager::new(cfg);

        let big = Bytes::from(vec![0xFFu8; 256 * 1024]);
        for _ in 0..10 {
            manager.write_frame(DEVICE.to_string(), big.clone());
        }
        let infos = manager.info().await;
        assert_eq!(infos[0].written + infos[0].dropped, 10);
        assert!(infos[0].dropped >= 5, "dropped {}", infos[0].dropped);
        manager.stop(DEVICE.to_string()).await;
    }

    #[tokio::test]
    async fn test_hour_boundary_rolls_over() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Local.with_ymd_and_hms(2024, 5, 1, 10, 59, 59).unwrap());
        let manager = PipelineManager::with_clock(
            shell(dir.path(), "exec cat > \"$0\""),
            Arc::new(clock.clone()),
        );
        let mut events = manager.subscribe_event();

        manager.write_frame(DEVICE.to_string(), frame(1));
        let first = match next_event(&mut events).await {
            PipelineEvent::Started { path, .. } => path,
            other => panic!("unexpected event {other:?}"),
        };
        assert!(first.ends_with("AA_BB_CC_DD_EE_FF/2024-05-01/10.mp4"));

        clock.set(Local.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap());
        manager.write_frame(DEVICE.to_string(), frame(2));

        let mut second = None;
        let mut finished = None;
        while second.is_none() || finished.is_none() {
            match next_event(&mut events).await {
                PipelineEvent::Started { path, .. } => second = Some(path),
                PipelineEvent::Finished { path, .. } => finished = Some(path),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(second.unwrap().ends_with("AA_BB_CC_DD_EE_FF/2024-05-01/11.mp4"));
        assert_eq!(finished.unwrap(), first);
        assert_eq!(std::fs::read(&first).unwrap(), frame(1).to_vec());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_same_hour_restart_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let manager = PipelineManager::with_clock(
            shell(dir.path(), "exec cat > \"$0\""),
            Arc::new(clock),
        );
        let mut events = manager.subscribe_event();
        let first = manager.start(DEVICE.to_string()).await.unwrap();
        manager.write_frame(DEVICE.to_string(), frame(1));
        manager.stop(DEVICE.to_string()).await;
        // wait until the first file is closed
        while !matches!(next_event(&mut events).await, PipelineEvent::Finished { .. }) {}

        let second = manager.start(DEVICE.to_string()).await.unwrap();
        assert!(first.ends_with("08.mp4"));
        assert!(second.ends_with("08-1.mp4"));
        manager.shutdown().await;
    }
}
