use crate::error::{Resource, Result, SmileyError};
use crate::frame::Frame;
use crate::pipeline::Detector;
use crate::transform::{RenderTransform, TransformMapper};
use std::time::{Duration, Instant};
use tracing::{Level, debug, info, span, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Escape,
    Character(char),
    Other(String),
}

/// Input delivered by the windowing layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Resized { width: u32, height: u32 },
    CloseRequested,
    KeyDown(Key),
    KeyUp(Key),
}

pub trait EventSource {
    /// Everything that arrived since the last call. Never blocks.
    fn poll_events(&mut self) -> Vec<Event>;
}

pub trait FrameSource {
    /// Blocks until the next frame is available.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Per-frame drawing surface, called in the order upload, background,
/// overlays, present.
pub trait Compositor {
    fn upload_video_frame(&mut self, frame: &Frame) -> Result<()>;
    fn draw_background(&mut self) -> Result<()>;
    fn draw_overlay(&mut self, transform: &RenderTransform) -> Result<()>;
    fn present(&mut self) -> Result<()>;
    fn resize(&mut self, width: u32, height: u32);
}

fn capture_reason(e: &SmileyError) -> String {
    match e {
        SmileyError::Capture(reason) => reason.clone(),
        other => other.to_string(),
    }
}

/// Try the preferred capture device, then any device.
pub fn open_with_fallback<T>(
    preferred: impl FnOnce() -> Result<T>,
    fallback: impl FnOnce() -> Result<T>,
) -> Result<T> {
    match preferred() {
        Ok(source) => Ok(source),
        Err(first) => {
            warn!("Preferred capture device failed ({first}), trying any device");
            fallback().map_err(|e| {
                SmileyError::startup(
                    Resource::Capture,
                    format!(
                        "preferred device: {}; fallback: {}",
                        capture_reason(&first),
                        capture_reason(&e)
                    ),
                )
            })
        }
    }
}

struct FpsCounter {
    window_start: Instant,
    frames: u32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            info!("{:.1} fps", self.frames as f64 / elapsed.as_secs_f64());
            self.window_start = Instant::now();
            self.frames = 0;
        }
    }
}

pub struct FrameLoop<S, D, C> {
    source: S,
    detector: D,
    compositor: C,
    mapper: TransformMapper,
    quit: bool,
    fps: FpsCounter,
}

impl<S: FrameSource, D: Detector, C: Compositor> FrameLoop<S, D, C> {
    pub fn new(source: S, detector: D, compositor: C) -> Self {
        Self {
            source,
            detector,
            compositor,
            mapper: TransformMapper::default(),
            quit: false,
            fps: FpsCounter::new(),
        }
    }

    pub fn with_mapper(mut self, mapper: TransformMapper) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn handle(&mut self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::CloseRequested => {
                    debug!("Close requested");
                    self.quit = true;
                }
                Event::KeyDown(Key::Escape) | Event::KeyDown(Key::Character('q')) => {
                    debug!("Quit key pressed");
                    self.quit = true;
                }
                Event::KeyDown(key) => debug!("Unhandled key {key:?}"),
                Event::KeyUp(_) => {}
                Event::Resized { width, height } => {
                    debug!("Resized to {width}x{height}");
                    self.compositor.resize(width, height);
                }
            }
        }
    }

    /// One acquire, detect, render, present cycle. Returns the number of
    /// faces drawn.
    pub fn iterate(&mut self) -> Result<usize> {
        let get_frame_span = span!(Level::DEBUG, "get_frame");
        let get_frame_guard = get_frame_span.enter();
        let frame = self.source.next_frame()?;
        drop(get_frame_guard);

        let detect_span = span!(Level::DEBUG, "detect");
        let detect_guard = detect_span.enter();
        let faces = self.detector.detect(&frame.to_gray())?;
        drop(detect_guard);

        let render_span = span!(Level::DEBUG, "render");
        let render_guard = render_span.enter();
        let (width, height) = frame.dimensions();
        self.compositor.upload_video_frame(&frame)?;
        self.compositor.draw_background()?;
        for face in &faces {
            trace!("Face at X = {} Y = {}", face.x, face.y);
            let transform = self.mapper.map(face, width, height);
            self.compositor.draw_overlay(&transform)?;
        }
        self.compositor.present()?;
        drop(render_guard);

        self.fps.tick();
        Ok(faces.len())
    }

    /// Poll, handle and iterate until a quit is requested or an iteration
    /// fails.
    pub fn run(&mut self, events: &mut impl EventSource) -> Result<()> {
        while !self.quit {
            let span = span!(Level::INFO, "frame_loop_iter");
            let _guard = span.enter();

            self.handle(events.poll_events());
            if self.quit {
                break;
            }
            self.iterate()?;
        }
        info!("Frame loop stopped");
        Ok(())
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    pub fn compositor(&self) -> &C {
        &self.compositor
    }

    pub fn into_parts(self) -> (S, D, C) {
        (self.source, self.detector, self.compositor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::GrayFrame;
    use crate::shapes::rect::FaceRegion;
    use approx::assert_relative_eq;
    use image::RgbImage;
    use std::collections::VecDeque;

    struct FakeSource {
        remaining: usize,
    }

    impl FrameSource for FakeSource {
        fn next_frame(&mut self) -> Result<Frame> {
            if self.remaining == 0 {
                return Err(SmileyError::Capture("device unplugged".into()));
            }
            self.remaining -= 1;
            Ok(Frame::from_rgb(RgbImage::new(640, 480)))
        }
    }

    struct FakeDetector(Vec<FaceRegion>);

    impl Detector for FakeDetector {
        fn detect(&mut self, _gray: &GrayFrame) -> Result<Vec<FaceRegion>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FakeCompositor {
        uploads: usize,
        backgrounds: usize,
        overlays: Vec<RenderTransform>,
        presents: usize,
        sizes: Vec<(u32, u32)>,
    }

    impl Compositor for FakeCompositor {
        fn upload_video_frame(&mut self, _frame: &Frame) -> Result<()> {
            self.uploads += 1;
            Ok(())
        }

        fn draw_background(&mut self) -> Result<()> {
            self.backgrounds += 1;
            Ok(())
        }

        fn draw_overlay(&mut self, transform: &RenderTransform) -> Result<()> {
            self.overlays.push(*transform);
            Ok(())
        }

        fn present(&mut self) -> Result<()> {
            self.presents += 1;
            Ok(())
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.sizes.push((width, height));
        }
    }

    struct FakeEvents(VecDeque<Vec<Event>>);

    impl EventSource for FakeEvents {
        fn poll_events(&mut self) -> Vec<Event> {
            self.0.pop_front().unwrap_or_default()
        }
    }

    fn frame_loop(
        frames: usize,
        faces: Vec<FaceRegion>,
    ) -> FrameLoop<FakeSource, FakeDetector, FakeCompositor> {
        FrameLoop::new(
            FakeSource { remaining: frames },
            FakeDetector(faces),
            FakeCompositor::default(),
        )
    }

    #[test]
    fn test_no_faces_draws_background_only() {
        let mut fl = frame_loop(1, vec![]);
        assert_eq!(fl.iterate().unwrap(), 0);

        let c = fl.compositor();
        assert_eq!(c.uploads, 1);
        assert_eq!(c.backgrounds, 1);
        assert!(c.overlays.is_empty());
        assert_eq!(c.presents, 1);
    }

    #[test]
    fn test_one_face_mapped_to_overlay() {
        let mut fl = frame_loop(1, vec![FaceRegion::new(100, 50, 144, 144)]);
        assert_eq!(fl.iterate().unwrap(), 1);

        let overlays = &fl.compositor().overlays;
        assert_eq!(overlays.len(), 1);
        assert_relative_eq!(overlays[0].translate_x, 2.3375, epsilon = 1e-5);
        assert_relative_eq!(overlays[0].translate_y, 2.691667, epsilon = 1e-5);
        assert_relative_eq!(overlays[0].scale_x, 2.);
    }

    #[test]
    fn test_quit_keys_and_close() {
        for event in [
            Event::CloseRequested,
            Event::KeyDown(Key::Escape),
            Event::KeyDown(Key::Character('q')),
        ] {
            let mut fl = frame_loop(0, vec![]);
            fl.handle(vec![event]);
            assert!(fl.quit_requested());
        }

        let mut fl = frame_loop(0, vec![]);
        fl.handle(vec![
            Event::KeyDown(Key::Character('x')),
            Event::KeyUp(Key::Escape),
            Event::KeyDown(Key::Other("F1".into())),
        ]);
        assert!(!fl.quit_requested());
    }

    #[test]
    fn test_resize_forwarded() {
        let mut fl = frame_loop(0, vec![]);
        fl.handle(vec![Event::Resized {
            width: 800,
            height: 600,
        }]);
        assert_eq!(fl.compositor().sizes, vec![(800, 600)]);
    }

    #[test]
    fn test_run_until_quit() {
        let mut fl = frame_loop(10, vec![FaceRegion::new(10, 10, 72, 72)]);
        let mut events = FakeEvents(VecDeque::from(vec![
            vec![],
            vec![Event::Resized {
                width: 320,
                height: 240,
            }],
            vec![Event::KeyDown(Key::Escape)],
        ]));

        fl.run(&mut events).unwrap();

        let (source, _, c) = fl.into_parts();
        assert_eq!(c.presents, 2);
        assert_eq!(c.overlays.len(), 2);
        assert_eq!(c.sizes, vec![(320, 240)]);
        assert_eq!(source.remaining, 8);
    }

    #[test]
    fn test_capture_loss_ends_run() {
        let mut fl = frame_loop(3, vec![]);
        let mut events = FakeEvents(VecDeque::new());

        let err = fl.run(&mut events).unwrap_err();
        assert!(matches!(err, SmileyError::Capture(_)));
        assert_eq!(fl.compositor().presents, 3);
    }

    #[test]
    fn test_fallback_used_when_preferred_fails() {
        let source = open_with_fallback(
            || Err(SmileyError::Capture("index 0 busy".into())),
            || Ok(FakeSource { remaining: 1 }),
        )
        .unwrap();
        assert_eq!(source.remaining, 1);
    }

    #[test]
    fn test_no_capture_device_is_fatal() {
        let mut fallback_tried = false;
        let result: Result<FakeSource> = open_with_fallback(
            || Err(SmileyError::Capture("index 0 missing".into())),
            || {
                fallback_tried = true;
                Err(SmileyError::Capture("no devices".into()))
            },
        );

        assert!(fallback_tried);
        let err = match result {
            Err(e @ SmileyError::StartupResource { .. }) => e,
            _ => panic!("expected a capture startup error"),
        };
        assert_eq!(
            err.to_string(),
            "failed to initialize capture device: preferred device: index 0 missing; fallback: no devices"
        );
    }
}
