use nalgebra::{Matrix4, Vector3};
use std::ops::{Deref, DerefMut};

/// A current transform plus saved states, in the style of a fixed-function
/// matrix stack. Saved states are only reachable through [`MatrixStack::push`],
/// whose guard restores the saved matrix when dropped.
#[derive(Debug, Clone)]
pub struct MatrixStack {
    current: Matrix4<f32>,
    saved: Vec<Matrix4<f32>>,
    pushes: usize,
    pops: usize,
}

pub struct Pushed<'a> {
    stack: &'a mut MatrixStack,
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixStack {
    pub fn new() -> Self {
        Self {
            current: Matrix4::identity(),
            saved: Vec::new(),
            pushes: 0,
            pops: 0,
        }
    }

    pub fn current(&self) -> &Matrix4<f32> {
        &self.current
    }

    pub fn load_identity(&mut self) {
        self.current = Matrix4::identity();
    }

    pub fn load(&mut self, m: Matrix4<f32>) {
        self.current = m;
    }

    pub fn translate(&mut self, t: [f32; 3]) {
        self.current *= Matrix4::new_translation(&Vector3::from(t));
    }

    pub fn scale(&mut self, s: [f32; 3]) {
        self.current *= Matrix4::new_nonuniform_scaling(&Vector3::from(s));
    }

    pub fn push(&mut self) -> Pushed<'_> {
        self.saved.push(self.current);
        self.pushes += 1;
        Pushed { stack: self }
    }

    fn pop(&mut self) {
        if let Some(m) = self.saved.pop() {
            self.current = m;
            self.pops += 1;
        }
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }

    pub fn pushes(&self) -> usize {
        self.pushes
    }

    pub fn pops(&self) -> usize {
        self.pops
    }
}

impl Deref for Pushed<'_> {
    type Target = MatrixStack;

    fn deref(&self) -> &MatrixStack {
        &*self.stack
    }
}

impl DerefMut for Pushed<'_> {
    fn deref_mut(&mut self) -> &mut MatrixStack {
        &mut *self.stack
    }
}

impl Drop for Pushed<'_> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

/// Perspective frustum mapping eye-space depth `-near..-far` to `0..1`.
pub fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Matrix4<f32> {
    Matrix4::new(
        2. * near / (right - left),
        0.,
        (right + left) / (right - left),
        0.,
        0.,
        2. * near / (top - bottom),
        (top + bottom) / (top - bottom),
        0.,
        0.,
        0.,
        far / (near - far),
        near * far / (near - far),
        0.,
        0.,
        -1.,
        0.,
    )
}
