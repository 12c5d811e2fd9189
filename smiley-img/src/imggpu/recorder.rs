use super::matrix::{MatrixStack, frustum};
use crate::error::{Result, SmileyError};
use crate::transform::RenderTransform;
use nalgebra::Matrix4;
use std::fmt;

/// Eye-space distance at which overlays are drawn.
pub const OVERLAY_DEPTH: f32 = -10.;
/// Normalized depth of the background quad, just inside the far plane.
pub const BACKGROUND_DEPTH: f32 = 0.9999;
pub const NEAR_PLANE: f32 = 2.;
pub const FAR_PLANE: f32 = 1000.;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Ready,
    UploadingFrame,
    DrawingBackground,
    DrawingOverlays(usize),
    Presented,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Background,
    Overlay,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Draw {
    pub layer: Layer,
    pub mvp: Matrix4<f32>,
}

/// CPU half of the renderer: walks the per-frame state machine, owns the
/// model-view and projection stacks and records one MVP matrix per draw.
#[derive(Debug)]
pub struct DrawRecorder {
    modelview: MatrixStack,
    projection: MatrixStack,
    draws: Vec<Draw>,
    state: RenderState,
    viewport: (u32, u32),
}

impl DrawRecorder {
    pub fn new(width: u32, height: u32) -> Self {
        let mut modelview = MatrixStack::new();
        modelview.translate([0., 0., OVERLAY_DEPTH]);

        let mut recorder = Self {
            modelview,
            projection: MatrixStack::new(),
            draws: Vec::new(),
            state: RenderState::Ready,
            viewport: (1, 1),
        };
        recorder.resize(width, height);
        recorder
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let (w, h) = (width.max(1), height.max(1));
        self.viewport = (w, h);

        let aspect = h as f32 / w as f32;
        self.projection
            .load(frustum(-1., 1., -aspect, aspect, NEAR_PLANE, FAR_PLANE));
    }

    fn check_state(&self, action: &'static str, allowed: bool) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            Err(SmileyError::RenderState {
                action,
                state: self.state.to_string(),
            })
        }
    }

    pub fn begin_frame(&mut self) -> Result<()> {
        self.check_state(
            "upload a frame",
            matches!(self.state, RenderState::Ready | RenderState::Presented),
        )?;
        self.draws.clear();
        self.state = RenderState::UploadingFrame;
        Ok(())
    }

    /*
     * Full-frame quad behind everything else. Both stacks are swapped for
     * identity-like transforms and restored on return, so overlay drawing
     * sees the same base transform it had before.
     */
    pub fn background(&mut self) -> Result<()> {
        self.check_state(
            "draw the background",
            self.state == RenderState::UploadingFrame,
        )?;

        let mut modelview = self.modelview.push();
        modelview.load_identity();
        modelview.translate([0., 0., BACKGROUND_DEPTH]);

        let mut projection = self.projection.push();
        projection.load_identity();

        let mvp = projection.current() * modelview.current();
        drop(projection);
        drop(modelview);

        self.draws.push(Draw {
            layer: Layer::Background,
            mvp,
        });
        self.state = RenderState::DrawingBackground;
        Ok(())
    }

    pub fn overlay(&mut self, transform: &RenderTransform) -> Result<()> {
        let drawn = match self.state {
            RenderState::DrawingBackground => 0,
            RenderState::DrawingOverlays(n) => n,
            _ => return self.check_state("draw an overlay", false),
        };

        let mut modelview = self.modelview.push();
        modelview.translate(transform.translation());
        modelview.scale(transform.scale());
        let mvp = self.projection.current() * modelview.current();
        drop(modelview);

        self.draws.push(Draw {
            layer: Layer::Overlay,
            mvp,
        });
        self.state = RenderState::DrawingOverlays(drawn + 1);
        Ok(())
    }

    /// Close the frame and hand back its draws in submission order.
    pub fn finish(&mut self) -> Result<&[Draw]> {
        self.check_state(
            "present",
            matches!(
                self.state,
                RenderState::DrawingBackground | RenderState::DrawingOverlays(_)
            ),
        )?;
        debug_assert_eq!(self.modelview.depth(), 0);
        debug_assert_eq!(self.projection.depth(), 0);

        self.state = RenderState::Presented;
        Ok(&self.draws)
    }

    /// Drop a frame that could not be presented.
    pub fn discard(&mut self) {
        self.draws.clear();
        self.state = RenderState::Ready;
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn draws(&self) -> &[Draw] {
        &self.draws
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn modelview(&self) -> &MatrixStack {
        &self.modelview
    }

    pub fn projection(&self) -> &MatrixStack {
        &self.projection
    }
}
