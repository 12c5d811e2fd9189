use smiley_img::error::{Resource, Result, SmileyError};
use smiley_img::frame_loop::{Event, EventSource, Key};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{Key as WinitKey, NamedKey};
use winit::platform::pump_events::{EventLoopExtPumpEvents, PumpStatus};
use winit::window::{Window, WindowAttributes, WindowId};

pub const WINDOW_TITLE: &str = "FaceSmiley";

/// Pumps before giving up on the platform handing us a window.
const MAX_STARTUP_PUMPS: usize = 100;

struct WindowApp {
    attributes: WindowAttributes,
    window: Option<Arc<Window>>,
    create_error: Option<String>,
    events: Vec<Event>,
}

impl ApplicationHandler for WindowApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => self.window = Some(Arc::new(window)),
            Err(e) => self.create_error = Some(e.to_string()),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.events.push(Event::CloseRequested),
            WindowEvent::Resized(size) => self.events.push(Event::Resized {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::KeyboardInput { event, .. } => {
                let key = map_key(&event.logical_key);
                self.events.push(match event.state {
                    ElementState::Pressed => Event::KeyDown(key),
                    ElementState::Released => Event::KeyUp(key),
                });
            }
            _ => {}
        }
    }
}

/// Keys are reported unshifted, so `Q` and `q` are the same key.
pub fn map_key(key: &WinitKey) -> Key {
    match key {
        WinitKey::Named(NamedKey::Escape) => Key::Escape,
        WinitKey::Character(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Character(c.to_ascii_lowercase()),
                _ => Key::Other(s.to_string()),
            }
        }
        other => Key::Other(format!("{other:?}")),
    }
}

/// Resizable desktop window whose events are pumped once per frame.
pub struct DesktopWindow {
    event_loop: EventLoop<()>,
    app: WindowApp,
    window: Arc<Window>,
}

impl DesktopWindow {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let window_err = |e: &dyn std::fmt::Display| SmileyError::startup(Resource::Window, e);

        let mut event_loop = EventLoop::new().map_err(|e| window_err(&e))?;
        let mut app = WindowApp {
            attributes: WindowAttributes::default()
                .with_title(WINDOW_TITLE)
                .with_resizable(true)
                .with_inner_size(PhysicalSize::new(width, height)),
            window: None,
            create_error: None,
            events: Vec::new(),
        };

        for _ in 0..MAX_STARTUP_PUMPS {
            if app.window.is_some() {
                break;
            }
            if let Some(e) = app.create_error.take() {
                return Err(window_err(&e));
            }
            if let PumpStatus::Exit(code) = event_loop.pump_app_events(Some(Duration::ZERO), &mut app) {
                return Err(window_err(&format!("event loop exited with {code}")));
            }
        }

        if let Some(e) = app.create_error.take() {
            return Err(window_err(&e));
        }
        let window = app
            .window
            .clone()
            .ok_or_else(|| window_err(&"window was never created"))?;
        let size = window.inner_size();
        info!("Opened {}x{} window", size.width, size.height);

        Ok(Self {
            event_loop,
            app,
            window,
        })
    }

    pub fn window(&self) -> Arc<Window> {
        self.window.clone()
    }

    pub fn inner_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

impl EventSource for DesktopWindow {
    fn poll_events(&mut self) -> Vec<Event> {
        if let PumpStatus::Exit(code) = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.app)
        {
            debug!("Event loop exited with {code}");
            self.app.events.push(Event::CloseRequested);
        }
        std::mem::take(&mut self.app.events)
    }
}
