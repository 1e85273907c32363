//! Run/stop lifecycle of the pipeline and its processing thread.
//!
//! The controller lives on the host's control thread. Each run moves the
//! [`SpeedPipeline`] and the opened [`VideoSource`] onto one processing
//! thread; the control side only flips a stop flag and joins. Results flow
//! back over channels: speed events, annotated frames (latest wins) and
//! status updates.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::config::{Calibration, PipelineConfig};
use crate::error::{BoxError, ConfigError, PipelineError};
use crate::log::{LogEntry, LogSender, LogWorker, SpeedLog};

use super::detector::Detector;
use super::events::{AnnotatedFrame, PipelineState, SpeedEvent, StatusUpdate};
use super::pipeline::{FrameReport, SpeedPipeline};
use super::source::{Frame, SourceDescriptor, SourceGuard, SourceOpener};

/// Status updates kept for the host; the oldest is replaced when full.
const STATUS_QUEUE: usize = 16;

/// How long a finished run waits for the speed log to reach its writer.
const LOG_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a run ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` was called
    Requested,
    EndOfStream,
    /// The source failed to deliver a frame
    ReadFailure(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("stop requested"),
            Self::EndOfStream => f.write_str("end of stream"),
            Self::ReadFailure(err) => write!(f, "read failure: {err}"),
        }
    }
}

/// Counters for one finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    /// Speed events produced, including any the event channel dropped
    pub events_emitted: u64,
    /// Events not queued because the host left the event channel full
    pub events_dropped: u64,
    /// Annotated frames replaced before the presentation layer took them
    pub frames_dropped: u64,
    pub stop_reason: StopReason,
}

struct Shared {
    state: Mutex<PipelineState>,
    stop: AtomicBool,
    status: Sender<StatusUpdate>,
    status_evict: Receiver<StatusUpdate>,
}

impl Shared {
    fn set_state(&self, state: PipelineState, message: impl Into<String>) {
        let message = message.into();
        *self.state.lock() = state;
        info!(?state, %message, "pipeline state changed");

        let mut update = StatusUpdate { state, message };
        loop {
            match self.status.try_send(update) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    let _ = self.status_evict.try_recv();
                    update = returned;
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}

/// Requests a cooperative stop from any thread.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Ask the processing loop to stop before its next frame. Does not wait.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }
}

#[derive(Clone)]
struct Outlets {
    events: Sender<SpeedEvent>,
    frames: Sender<AnnotatedFrame>,
    frames_evict: Receiver<AnnotatedFrame>,
    log: Option<LogSender>,
}

struct WorkerOutcome<D: Detector> {
    pipeline: SpeedPipeline<D>,
    /// `None` when the source never opened; `start` already reported it
    result: Option<Result<RunSummary, PipelineError>>,
}

struct Worker {
    shared: Arc<Shared>,
    opener: Arc<dyn SourceOpener>,
    outlets: Outlets,
    descriptor: SourceDescriptor,
}

impl Worker {
    fn run<D: Detector>(
        self,
        mut pipeline: SpeedPipeline<D>,
        ready: Sender<Result<(), PipelineError>>,
    ) -> WorkerOutcome<D> {
        let source = match self.opener.open(&self.descriptor) {
            Ok(source) => source,
            Err(cause) => {
                warn!(descriptor = %self.descriptor, %cause, "failed to open video source");
                self.shared
                    .set_state(PipelineState::Stopped, "Failed to open video source!");
                let _ = ready.send(Err(PipelineError::SourceUnavailable {
                    descriptor: self.descriptor.to_string(),
                    cause,
                }));
                return WorkerOutcome {
                    pipeline,
                    result: None,
                };
            }
        };
        let mut source = SourceGuard::new(source);
        self.shared.set_state(PipelineState::Running, "Running");
        let _ = ready.send(Ok(()));

        let mut summary = RunSummary {
            frames_processed: 0,
            events_emitted: 0,
            events_dropped: 0,
            frames_dropped: 0,
            stop_reason: StopReason::Requested,
        };

        let result = loop {
            if self.shared.stop.load(Ordering::Acquire) {
                break Ok(StopReason::Requested);
            }

            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(StopReason::EndOfStream),
                Err(err) => {
                    warn!(%err, "frame read failed, ending run");
                    break Ok(StopReason::ReadFailure(err.to_string()));
                }
            };

            match pipeline.process_frame(&frame) {
                Ok(report) => {
                    summary.frames_processed += 1;
                    self.emit(report, frame, &mut summary);
                }
                Err(err) => {
                    let source: BoxError = err.into();
                    warn!(frame_index = frame.index, error = %source, "detector failed, ending run");
                    break Err(PipelineError::DetectorFailure {
                        frame_index: frame.index,
                        source,
                    });
                }
            }
        };

        self.shared.set_state(PipelineState::Stopping, "Stopping");
        drop(source);

        if let Some(log) = &self.outlets.log {
            if !log.flush(LOG_FLUSH_TIMEOUT) {
                warn!("speed log flush not confirmed");
            }
        }

        let message = match &result {
            Ok(reason) => format!("Stopped ({reason})"),
            Err(err) => format!("Stopped: {err}"),
        };
        info!(
            frames = summary.frames_processed,
            events = summary.events_emitted,
            dropped_events = summary.events_dropped,
            dropped_frames = summary.frames_dropped,
            "run finished"
        );
        self.shared.set_state(PipelineState::Stopped, message);

        WorkerOutcome {
            pipeline,
            result: Some(result.map(|stop_reason| RunSummary {
                stop_reason,
                ..summary
            })),
        }
    }

    fn emit(&self, report: FrameReport, frame: Frame, summary: &mut RunSummary) {
        for event in report.events {
            if let Some(log) = &self.outlets.log {
                if !log.append(LogEntry::from(&event)) {
                    warn!(track = %event.track_id, "log worker gone, entry not written");
                }
            }
            summary.events_emitted += 1;
            match self.outlets.events.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(event)) => {
                    if summary.events_dropped == 0 {
                        warn!("event channel full, dropping new speed events");
                    }
                    summary.events_dropped += 1;
                    debug!(track = %event.track_id, frame_index = event.frame_index, "dropped speed event");
                }
            }
        }

        let mut annotated = AnnotatedFrame {
            frame,
            overlays: report.overlays,
        };
        loop {
            match self.outlets.frames.try_send(annotated) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    // replace the stale frame the presentation layer has not taken
                    if self.outlets.frames_evict.try_recv().is_ok() {
                        summary.frames_dropped += 1;
                        trace!(frame_index = returned.frame.index, "dropped stale annotated frame");
                    }
                    annotated = returned;
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}

/// Owns the run/stop lifecycle of a [`SpeedPipeline`].
///
/// States go `Stopped -> Starting -> Running -> Stopping -> Stopped`. Only
/// the processing thread touches the detector, tracker and video source
/// while a run is active.
pub struct PipelineController<D>
where
    D: Detector + Send + 'static,
{
    pipeline: Option<SpeedPipeline<D>>,
    opener: Arc<dyn SourceOpener>,
    config: PipelineConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<WorkerOutcome<D>>>,
    last_summary: Option<RunSummary>,
    outlets: Outlets,
    events: Receiver<SpeedEvent>,
    frames: Receiver<AnnotatedFrame>,
    status: Receiver<StatusUpdate>,
    log_worker: Option<LogWorker>,
}

impl<D> PipelineController<D>
where
    D: Detector + Send + 'static,
{
    pub fn new(
        detector: D,
        opener: impl SourceOpener + 'static,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (event_tx, events) = crossbeam_channel::bounded(config.event_queue);
        let (frame_tx, frames) = crossbeam_channel::bounded(config.frame_queue);
        let (status_tx, status) = crossbeam_channel::bounded(STATUS_QUEUE);

        Ok(Self {
            pipeline: Some(SpeedPipeline::new(detector, &config)),
            opener: Arc::new(opener),
            shared: Arc::new(Shared {
                state: Mutex::new(PipelineState::Stopped),
                stop: AtomicBool::new(false),
                status: status_tx,
                status_evict: status.clone(),
            }),
            worker: None,
            last_summary: None,
            outlets: Outlets {
                events: event_tx,
                frames: frame_tx,
                frames_evict: frames.clone(),
                log: None,
            },
            events,
            frames,
            status,
            log_worker: None,
            config,
        })
    }

    /// Persist every speed event to `log` from a dedicated writer thread.
    pub fn with_log(mut self, log: Box<dyn SpeedLog + Send>) -> Result<Self, PipelineError> {
        let worker = LogWorker::spawn(log).map_err(PipelineError::Spawn)?;
        self.outlets.log = worker.sender();
        self.log_worker = Some(worker);
        Ok(self)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    /// Speed events, in frame order per track. Holds at most
    /// `event_queue` undelivered events; newer ones are dropped beyond that.
    pub fn events(&self) -> Receiver<SpeedEvent> {
        self.events.clone()
    }

    /// Latest annotated frames. Older frames are replaced when not taken in time.
    pub fn frames(&self) -> Receiver<AnnotatedFrame> {
        self.frames.clone()
    }

    /// The most recent status updates.
    pub fn status(&self) -> Receiver<StatusUpdate> {
        self.status.clone()
    }

    /// The pipeline while no run is active.
    pub fn pipeline(&self) -> Option<&SpeedPipeline<D>> {
        self.pipeline.as_ref()
    }

    /// Summary of the most recently collected run.
    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    /// Open `descriptor` and start processing with `calibration`.
    ///
    /// Returns once the source is open and the pipeline is `Running`, or with
    /// `SourceUnavailable` after it fell back to `Stopped`.
    pub fn start(
        &mut self,
        descriptor: SourceDescriptor,
        calibration: Calibration,
    ) -> Result<(), PipelineError> {
        if self.state() != PipelineState::Stopped {
            return Err(PipelineError::AlreadyRunning);
        }
        // collect a run that ended on its own
        if let Err(err) = self.join_worker() {
            warn!(%err, "previous run ended with an error");
        }
        calibration.validate()?;

        let Some(mut pipeline) = self.pipeline.take() else {
            return Err(PipelineError::WorkerPanicked);
        };
        pipeline.reset(calibration);

        self.shared.stop.store(false, Ordering::Release);
        self.shared
            .set_state(PipelineState::Starting, format!("Opening {descriptor}"));

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let worker = Worker {
            shared: self.shared.clone(),
            opener: self.opener.clone(),
            outlets: self.outlets.clone(),
            descriptor,
        };
        let handle = thread::Builder::new()
            .name("speedtrack-pipeline".into())
            .spawn(move || worker.run(pipeline, ready_tx))
            .map_err(|err| {
                self.shared
                    .set_state(PipelineState::Stopped, "Failed to start processing thread");
                PipelineError::Spawn(err)
            })?;
        self.worker = Some(handle);

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                self.join_worker()?;
                Err(err)
            }
            Err(_) => self.join_worker().and(Err(PipelineError::WorkerPanicked)),
        }
    }

    /// Request a stop and wait for the processing thread to finish.
    ///
    /// Returns `Ok(None)` when no run was active. A detector failure that
    /// ended the run is returned as the error.
    pub fn stop(&mut self) -> Result<Option<RunSummary>, PipelineError> {
        self.shared.stop.store(true, Ordering::Release);
        self.join_worker()
    }

    /// Wait for the current run to end on its own, e.g. at end of stream.
    pub fn wait(&mut self) -> Result<Option<RunSummary>, PipelineError> {
        self.join_worker()
    }

    fn join_worker(&mut self) -> Result<Option<RunSummary>, PipelineError> {
        let Some(handle) = self.worker.take() else {
            return Ok(None);
        };
        match handle.join() {
            Ok(outcome) => {
                self.pipeline = Some(outcome.pipeline);
                let summary = outcome.result.transpose()?;
                self.last_summary = summary.clone();
                Ok(summary)
            }
            Err(_) => {
                self.shared
                    .set_state(PipelineState::Stopped, "Processing thread panicked");
                Err(PipelineError::WorkerPanicked)
            }
        }
    }
}

impl<D> Drop for PipelineController<D>
where
    D: Detector + Send + 'static,
{
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(%err, "pipeline ended with an error during shutdown");
        }
        // the log worker drains once every sender is gone
        self.outlets.log.take();
        self.log_worker.take();
    }
}
