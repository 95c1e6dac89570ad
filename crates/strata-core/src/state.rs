//! # State Module
//!
//! The inheritable drawing state and the stack that carries it through the
//! traversal.
//!
//! ## Responsibilities
//! - **State**: transform, paint attributes, group effects and the clip region.
//! - **StateStack**: push/pop discipline and `reinherit_top` merging.
//!
//! Paint attributes are stored as `Option`s: `None` means "not specified
//! here", so a declared state can be merged over an inherited one. Group
//! effects (opacity, filter, clip-path, mask) are never inherited.

use std::fmt;
use std::rc::Rc;

use crate::filters::FilterDefinition;
use crate::transform::Affine;
use crate::types::{Color, ColorSpace, NodeId};
use crate::units::Length;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Paint {
    None,
    Color(Color),
    CurrentColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl FillRule {
    pub fn to_tiny_skia(self) -> tiny_skia::FillRule {
        match self {
            FillRule::NonZero => tiny_skia::FillRule::Winding,
            FillRule::EvenOdd => tiny_skia::FillRule::EvenOdd,
        }
    }
}

/// Inheritable paint properties.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PaintProps {
    pub fill: Option<Paint>,
    pub fill_opacity: Option<f32>,
    pub fill_rule: Option<FillRule>,
    pub stroke: Option<Paint>,
    pub stroke_opacity: Option<f32>,
    pub stroke_width: Option<Length>,
    pub current_color: Option<Color>,
}

impl PaintProps {
    /// Declared values win; unspecified ones fall back to `inherited`.
    pub fn inherit_from(&self, inherited: &PaintProps) -> PaintProps {
        PaintProps {
            fill: self.fill.or(inherited.fill),
            fill_opacity: self.fill_opacity.or(inherited.fill_opacity),
            fill_rule: self.fill_rule.or(inherited.fill_rule),
            stroke: self.stroke.or(inherited.stroke),
            stroke_opacity: self.stroke_opacity.or(inherited.stroke_opacity),
            stroke_width: self.stroke_width.or(inherited.stroke_width),
            current_color: self.current_color.or(inherited.current_color),
        }
    }

    /// Effective fill color, black unless told otherwise.
    pub fn fill_color(&self) -> Option<Color> {
        let color = self.resolve(self.fill.unwrap_or(Paint::Color(Color::BLACK)))?;
        Some(color.with_opacity(self.fill_opacity.unwrap_or(1.0)))
    }

    /// Effective stroke color, none unless told otherwise.
    pub fn stroke_color(&self) -> Option<Color> {
        let color = self.resolve(self.stroke.unwrap_or(Paint::None))?;
        Some(color.with_opacity(self.stroke_opacity.unwrap_or(1.0)))
    }

    fn resolve(&self, paint: Paint) -> Option<Color> {
        match paint {
            Paint::None => None,
            Paint::Color(c) => Some(c),
            Paint::CurrentColor => Some(self.current_color.unwrap_or(Color::BLACK)),
        }
    }

    pub fn stroke_width(&self) -> Length {
        self.stroke_width.unwrap_or(Length::px(1.0))
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule.unwrap_or_default()
    }
}

/// Device-space coverage mask, shared between frames until narrowed.
#[derive(Clone)]
pub struct ClipRegion(pub Rc<tiny_skia::Mask>);

impl ClipRegion {
    pub fn mask(&self) -> &tiny_skia::Mask {
        &self.0
    }
}

impl fmt::Debug for ClipRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClipRegion({}x{})", self.0.width(), self.0.height())
    }
}

/// How a declared state is merged into the top of the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InheritMode {
    /// Ordinary parent/child inheritance.
    #[default]
    Normal,
    /// Drawing through an indirection: the enclosing indirection already
    /// realized group effects, so the target's own are dropped.
    Dominate,
}

#[derive(Debug, Clone)]
pub struct State {
    pub affine: Affine,
    pub paint: PaintProps,
    pub opacity: f32,
    pub filter: Option<Rc<FilterDefinition>>,
    pub clip_path: Option<NodeId>,
    pub mask: Option<NodeId>,
    /// Device-space coverage everything drawn in this scope is limited to.
    pub clip: Option<ClipRegion>,
    pub cond_true: bool,
    pub overflow: Option<bool>,
    pub color_interpolation_filters: Option<ColorSpace>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            affine: Affine::IDENTITY,
            paint: PaintProps::default(),
            opacity: 1.0,
            filter: None,
            clip_path: None,
            mask: None,
            clip: None,
            cond_true: true,
            overflow: None,
            color_interpolation_filters: None,
        }
    }
}

impl State {
    /// Merges `declared` over `inherited`.
    ///
    /// The declared transform applies first, the inherited one after.
    pub fn inherit(declared: &State, inherited: &State, mode: InheritMode) -> State {
        let (opacity, filter, clip_path, mask) = match mode {
            InheritMode::Normal => (
                declared.opacity,
                declared.filter.clone(),
                declared.clip_path,
                declared.mask,
            ),
            InheritMode::Dominate => (1.0, None, None, None),
        };
        State {
            affine: Affine::multiply(&declared.affine, &inherited.affine),
            paint: declared.paint.inherit_from(&inherited.paint),
            opacity,
            filter,
            clip_path,
            mask,
            clip: inherited.clip.clone(),
            cond_true: declared.cond_true,
            overflow: declared.overflow,
            color_interpolation_filters: declared
                .color_interpolation_filters
                .or(inherited.color_interpolation_filters),
        }
    }

    /// True when drawing this scope needs its own layer to realize effects.
    pub fn has_group_effects(&self) -> bool {
        self.opacity < 1.0
            || self.filter.is_some()
            || self.clip_path.is_some()
            || self.mask.is_some()
    }
}

/// The state stack. Never empty: the bottom frame is the render's
/// initial state.
#[derive(Debug)]
pub struct StateStack {
    frames: Vec<State>,
}

impl StateStack {
    pub fn new(initial: State) -> Self {
        Self {
            frames: vec![initial],
        }
    }

    /// Pushes a copy of the top frame.
    pub fn push(&mut self) {
        let copy = self.top().clone();
        self.frames.push(copy);
    }

    /// Pops the top frame.
    ///
    /// # Panics
    /// Popping the bottom frame is a traversal bug and panics.
    pub fn pop(&mut self) {
        assert!(self.frames.len() > 1, "state stack underflow");
        self.frames.pop();
    }

    pub fn top(&self) -> &State {
        // The constructor seeds one frame and `pop` never removes it.
        &self.frames[self.frames.len() - 1]
    }

    pub fn top_mut(&mut self) -> &mut State {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Replaces the top frame with `declared` merged over it.
    ///
    /// The top's current contents act as the inherited state. Right after
    /// a push this is the parent's state, plus anything the caller composed
    /// in between (an indirection's offset transform, for example).
    pub fn reinherit_top(&mut self, declared: &State, mode: InheritMode) {
        let merged = State::inherit(declared, self.top(), mode);
        *self.top_mut() = merged;
    }
}
