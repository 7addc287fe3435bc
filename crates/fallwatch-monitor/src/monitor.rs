//! Per-frame fall monitoring pipeline.
//!
//! Frame → detector → fall state machine → alert channels. The state
//! machine is owned by the caller (one `FallState` per monitored source);
//! the monitor itself holds no per-source state.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use metrics::{counter, histogram};
use tracing::{debug, info};

use fallwatch_alert::{Alert, AlertDispatcher};
use fallwatch_detect::{FrameDetector, FrameReader, FrameSource};
use fallwatch_models::{
    AlertEvent, Detection, DispatchSummary, FallState, FrameEvent, VideoReport,
};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};

pub const FRAMES_PROCESSED_TOTAL: &str = "fallwatch_frames_processed_total";
pub const FALL_EVENTS_TOTAL: &str = "fallwatch_fall_events_total";
pub const INFERENCE_DURATION_SECONDS: &str = "fallwatch_inference_duration_seconds";

/// Decision for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    /// Event emitted by the state machine, if any
    pub event: Option<AlertEvent>,
    /// Highest "falling" confidence in the frame, qualifying or not
    pub best_falling: f32,
    pub detections: usize,
}

impl FrameOutcome {
    /// Confidence reported to clients: the event's, else the best raw score.
    pub fn confidence(&self) -> f32 {
        self.event.map(|e| e.confidence).unwrap_or(self.best_falling)
    }
}

/// Runs detection and alerting for any number of sources.
#[derive(Clone)]
pub struct FallMonitor {
    detector: Arc<dyn FrameDetector>,
    dispatcher: AlertDispatcher,
    config: MonitorConfig,
}

impl FallMonitor {
    pub fn new(
        detector: Arc<dyn FrameDetector>,
        dispatcher: AlertDispatcher,
        config: MonitorConfig,
    ) -> Self {
        Self {
            detector,
            dispatcher,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn threshold(&self) -> f32 {
        self.config.confidence_threshold
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    /// Run the detector on a blocking thread.
    pub async fn detect(&self, image: DynamicImage) -> MonitorResult<Vec<Detection>> {
        let detector = Arc::clone(&self.detector);
        let start = Instant::now();

        let detections = tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| MonitorError::Task(e.to_string()))??;

        histogram!(INFERENCE_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        for d in &detections {
            debug!(label = %d.label, confidence = d.confidence, "Detection");
        }
        Ok(detections)
    }

    /// Feed one frame of detections to a source's state machine.
    pub fn observe(&self, state: &mut FallState, detections: &[Detection]) -> FrameOutcome {
        let best_falling = detections
            .iter()
            .filter(|d| d.is_falling())
            .map(|d| d.confidence)
            .fold(0.0f32, f32::max);

        let event = state.observe(detections, self.threshold());

        counter!(FRAMES_PROCESSED_TOTAL).increment(1);
        if let Some(event) = event {
            let labels = [("kind", event.kind.as_str().to_string())];
            counter!(FALL_EVENTS_TOTAL, &labels).increment(1);
            info!(kind = %event.kind, confidence = event.confidence, phase = ?state.phase(), "Fall event");
        }

        FrameOutcome {
            event,
            best_falling,
            detections: detections.len(),
        }
    }

    /// Dispatch an alert for an emitted event.
    pub async fn alert(&self, event: AlertEvent, source: &str, frame: Option<u64>) -> DispatchSummary {
        let mut alert = Alert::new(event, source);
        if let Some(frame) = frame {
            alert = alert.with_frame(frame);
        }
        self.dispatcher.dispatch(&alert).await
    }

    /// Full pipeline for a source whose state is exclusively owned by the caller.
    pub async fn process_frame(
        &self,
        state: &mut FallState,
        image: DynamicImage,
        source: &str,
    ) -> MonitorResult<(FrameOutcome, Option<DispatchSummary>)> {
        let detections = self.detect(image).await?;
        let outcome = self.observe(state, &detections);
        let alerts = match outcome.event {
            Some(event) => Some(self.alert(event, source, None).await),
            None => None,
        };
        Ok((outcome, alerts))
    }

    /// Scan a video file with a fresh state machine.
    pub async fn scan_video(&self, path: impl AsRef<Path>, source: &str) -> MonitorResult<VideoReport> {
        let mut reader = FrameReader::open_file(path, self.config.video_max_width).await?;
        self.scan_frames(&mut reader, source).await
    }

    /// Scan a frame sequence with a fresh state machine.
    ///
    /// Every `video_frame_stride`-th frame is analyzed; alerts carry the
    /// frame index.
    pub async fn scan_frames<S: FrameSource>(&self, frames: &mut S, source: &str) -> MonitorResult<VideoReport> {
        let stride = self.config.video_frame_stride.max(1);

        let mut state = FallState::new();
        let mut events = Vec::new();
        let mut frame_index: u64 = 0;
        let mut analyzed: u64 = 0;

        while let Some(frame) = frames.next_frame().await? {
            if frame_index % stride == 0 {
                let detections = self.detect(frame).await?;
                analyzed += 1;

                let outcome = self.observe(&mut state, &detections);
                if let Some(event) = outcome.event {
                    debug!(frame = frame_index, kind = %event.kind, "Video fall event");
                    self.alert(event, source, Some(frame_index)).await;
                    events.push(FrameEvent {
                        frame: frame_index,
                        event,
                    });
                }
            }
            frame_index += 1;
        }

        info!(
            source,
            frames = frame_index,
            analyzed,
            events = events.len(),
            "Video scan complete"
        );

        Ok(VideoReport::processed(frame_index, analyzed, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fallwatch_alert::{AlertChannel, AlertResult};
    use fallwatch_detect::{DetectError, DetectResult};
    use fallwatch_models::AlertKind;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Detector returning a scripted sequence of frames.
    struct Scripted {
        frames: Mutex<Vec<DetectResult<Vec<Detection>>>>,
    }

    impl Scripted {
        fn new(mut frames: Vec<DetectResult<Vec<Detection>>>) -> Arc<Self> {
            frames.reverse();
            Arc::new(Self {
                frames: Mutex::new(frames),
            })
        }
    }

    impl FrameDetector for Scripted {
        fn detect(&self, _image: &DynamicImage) -> DetectResult<Vec<Detection>> {
            self.frames.lock().unwrap().pop().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence).unwrap()
    }

    fn frame() -> DynamicImage {
        DynamicImage::new_rgb8(4, 4)
    }

    /// Blank frames, `remaining` of them.
    struct BlankFrames {
        remaining: usize,
    }

    #[async_trait]
    impl FrameSource for BlankFrames {
        async fn next_frame(&mut self) -> DetectResult<Option<DynamicImage>> {
            if self.remaining == 0 {
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(frame()))
        }
    }

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<Alert>>,
    }

    #[async_trait]
    impl AlertChannel for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn notify(&self, alert: &Alert) -> AlertResult<()> {
            self.sent.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn monitor(detector: Arc<dyn FrameDetector>) -> FallMonitor {
        FallMonitor::new(detector, AlertDispatcher::empty(), MonitorConfig::default())
    }

    #[tokio::test]
    async fn test_process_frame_sequence() {
        let detector = Scripted::new(vec![
            Ok(vec![det("falling", 0.95)]),
            Ok(vec![det("person", 0.99)]),
            Ok(vec![det("falling", 0.9)]),
        ]);
        let monitor = monitor(detector);
        let mut state = FallState::new();

        let (first, alerts) = monitor.process_frame(&mut state, frame(), "cam").await.unwrap();
        assert_eq!(first.event.unwrap().kind, AlertKind::FallStarted);
        assert!(alerts.is_some());

        let (second, alerts) = monitor.process_frame(&mut state, frame(), "cam").await.unwrap();
        assert!(second.event.is_none());
        assert!(alerts.is_none());
        assert_eq!(second.best_falling, 0.0);

        let (third, _) = monitor.process_frame(&mut state, frame(), "cam").await.unwrap();
        assert_eq!(third.event.unwrap().kind, AlertKind::FallEnded);
        assert!(!state.detected());
    }

    #[tokio::test]
    async fn test_detector_error_leaves_state_untouched() {
        let detector = Scripted::new(vec![Err(DetectError::inference("boom"))]);
        let monitor = monitor(detector);
        let mut state = FallState::new();

        let result = monitor.process_frame(&mut state, frame(), "cam").await;
        assert!(matches!(result, Err(MonitorError::Detect(DetectError::Inference(_)))));
        assert_eq!(state, FallState::new());
    }

    #[test]
    fn test_outcome_reports_sub_threshold_confidence() {
        let monitor = monitor(Scripted::new(Vec::new()));
        let mut state = FallState::new();

        let outcome = monitor.observe(&mut state, &[det("falling", 0.6), det("Falling", 0.7)]);
        assert!(outcome.event.is_none());
        assert!((outcome.confidence() - 0.7).abs() < 1e-6);
        assert_eq!(outcome.detections, 2);
    }

    #[tokio::test]
    async fn test_scan_frames_honors_stride_and_frame_indices() {
        // Frames 0, 1 and 2 all qualify; only 0 and 2 reach the detector
        let detector = Scripted::new(vec![
            Ok(vec![det("falling", 0.95)]),
            Ok(vec![det("falling", 0.9)]),
            Ok(vec![det("falling", 0.85)]),
        ]);
        let recording = Arc::new(Recording::default());
        let dispatcher = AlertDispatcher::new(
            vec![recording.clone() as Arc<dyn AlertChannel>],
            Duration::from_secs(1),
        );
        let config = MonitorConfig {
            video_frame_stride: 2,
            ..Default::default()
        };
        let monitor = FallMonitor::new(detector, dispatcher, config);

        let report = monitor
            .scan_frames(&mut BlankFrames { remaining: 3 }, "upload-1")
            .await
            .unwrap();

        assert_eq!(report.frames, 3);
        assert_eq!(report.analyzed_frames, 2);
        let events: Vec<_> = report.events.iter().map(|e| (e.frame, e.event.kind)).collect();
        assert_eq!(
            events,
            vec![(0, AlertKind::FallStarted), (2, AlertKind::FallEnded)]
        );
        assert!((report.events[1].event.confidence - 0.9).abs() < 1e-6);

        let sent = recording.sent.lock().unwrap();
        let frames: Vec<_> = sent.iter().map(|a| (a.source.as_str(), a.frame)).collect();
        assert_eq!(frames, vec![("upload-1", Some(0)), ("upload-1", Some(2))]);
    }

    #[tokio::test]
    async fn test_each_scan_starts_idle() {
        let detector = Scripted::new(vec![
            Ok(vec![det("falling", 0.95)]),
            Ok(vec![det("falling", 0.92)]),
        ]);
        let monitor = monitor(detector);

        // The first upload ends mid-episode
        let first = monitor
            .scan_frames(&mut BlankFrames { remaining: 1 }, "upload-a")
            .await
            .unwrap();
        assert_eq!(first.events[0].event.kind, AlertKind::FallStarted);

        let second = monitor
            .scan_frames(&mut BlankFrames { remaining: 1 }, "upload-b")
            .await
            .unwrap();
        assert_eq!(second.events.len(), 1);
        assert_eq!(second.events[0].event.kind, AlertKind::FallStarted);
    }

    #[tokio::test]
    async fn test_scan_frames_stops_on_detector_error() {
        let detector = Scripted::new(vec![Err(DetectError::inference("boom"))]);
        let monitor = monitor(detector);

        let result = monitor
            .scan_frames(&mut BlankFrames { remaining: 2 }, "upload")
            .await;
        assert!(matches!(result, Err(MonitorError::Detect(DetectError::Inference(_)))));
    }
}
