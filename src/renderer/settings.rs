//! Pipeline Settings
//!
//! This module defines the configuration consumed by
//! [`RenderPipeline`](crate::renderer::RenderPipeline) at construction.
//!
//! The core choice is [`SortPolicy`], which selects between state-minimising
//! ordering and depth-sorted transparency.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use saga::renderer::{PipelineSettings, SortPolicy, StereoMode};
//!
//! // Default: depth-sorted transparency, 16-bit depth keys, mono
//! let settings = PipelineSettings::default();
//!
//! // Pure state sorting for a scene with no translucency
//! let settings = PipelineSettings {
//!     sort_policy: SortPolicy::StateSort,
//!     ..Default::default()
//! };
//!
//! // Loaded from JSON, validated before use
//! let settings = PipelineSettings::from_json(r#"{ "stereo": "QuadBuffer" }"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};

// ---------------------------------------------------------------------------
// SortPolicy
// ---------------------------------------------------------------------------

/// How the sort stage orders culled items.
///
/// | Policy      | Transparent items        | Opaque items              |
/// |-------------|--------------------------|---------------------------|
/// | `StateSort` | mixed in, by state       | by state                  |
/// | `DepthSort` | back-to-front, blended   | cull order, bracketed     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortPolicy {
    /// Minimise device state changes. Transparent geometry is not separated.
    StateSort,
    /// Opaque items first in traversal order, then transparent items
    /// back-to-front inside a single blended block.
    #[default]
    DepthSort,
}

// ---------------------------------------------------------------------------
// StateSlot
// ---------------------------------------------------------------------------

/// A piece of device state the state sort can group by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateSlot {
    Lights,
    Texture0,
    Texture1,
    Texture2,
    Texture3,
    VertexShader,
    FragmentShader,
    Material,
    Fog,
    Polygon,
    Line,
    Point,
    Blend,
    Depth,
    Stencil,
    ClipPlanes,
}

impl StateSlot {
    /// Default priority order, most significant first.
    pub const DEFAULT_PRIORITY: [StateSlot; 16] = [
        StateSlot::Lights,
        StateSlot::Texture0,
        StateSlot::Texture1,
        StateSlot::Texture2,
        StateSlot::Texture3,
        StateSlot::VertexShader,
        StateSlot::FragmentShader,
        StateSlot::Material,
        StateSlot::Fog,
        StateSlot::Polygon,
        StateSlot::Line,
        StateSlot::Point,
        StateSlot::Blend,
        StateSlot::Depth,
        StateSlot::Stencil,
        StateSlot::ClipPlanes,
    ];

    /// Texture unit index for the texture slots.
    #[must_use]
    pub fn texture_unit(self) -> Option<usize> {
        match self {
            Self::Texture0 => Some(0),
            Self::Texture1 => Some(1),
            Self::Texture2 => Some(2),
            Self::Texture3 => Some(3),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// StereoMode
// ---------------------------------------------------------------------------

/// Stereo presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StereoMode {
    #[default]
    Mono,
    /// Both eyes every frame into separate hardware back buffers.
    QuadBuffer,
    /// One eye per frame, alternating. Needs only a single back buffer.
    AlternateFrame,
}

// ---------------------------------------------------------------------------
// PipelineSettings
// ---------------------------------------------------------------------------

/// Configuration for a [`RenderPipeline`](crate::renderer::RenderPipeline).
///
/// | Field                          | Default        |
/// |--------------------------------|----------------|
/// | `sort_policy`                  | `DepthSort`    |
/// | `depth_sort_bits`              | `16`           |
/// | `state_priority`               | see [`StateSlot::DEFAULT_PRIORITY`] |
/// | `stereo`                       | `Mono`         |
/// | `eye_separation`               | `0.065`        |
/// | `clear_color`                  | black, opaque  |
/// | `initial_item_capacity`        | `256`          |
/// | `initial_instruction_capacity` | `1024`         |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub sort_policy: SortPolicy,
    /// Width of the quantised depth key used for transparent items.
    pub depth_sort_bits: u32,
    /// State-sort comparison order, most significant first. Must name every
    /// [`StateSlot`] exactly once.
    pub state_priority: Vec<StateSlot>,
    pub stereo: StereoMode,
    /// Distance between the eyes in world units.
    pub eye_separation: f32,
    pub clear_color: [f32; 4],
    pub initial_item_capacity: usize,
    pub initial_instruction_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sort_policy: SortPolicy::default(),
            depth_sort_bits: 16,
            state_priority: StateSlot::DEFAULT_PRIORITY.to_vec(),
            stereo: StereoMode::default(),
            eye_separation: 0.065,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            initial_item_capacity: 256,
            initial_instruction_capacity: 1024,
        }
    }
}

impl PipelineSettings {
    /// Parses and validates settings. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=24).contains(&self.depth_sort_bits) {
            return Err(PipelineError::InvalidDepthBits(self.depth_sort_bits));
        }

        if self.state_priority.len() != StateSlot::DEFAULT_PRIORITY.len() {
            return Err(PipelineError::InvalidStatePriority(format!(
                "expected {} slots, got {}",
                StateSlot::DEFAULT_PRIORITY.len(),
                self.state_priority.len()
            )));
        }
        for slot in StateSlot::DEFAULT_PRIORITY {
            if !self.state_priority.contains(&slot) {
                return Err(PipelineError::InvalidStatePriority(format!(
                    "missing {slot:?}"
                )));
            }
        }
        Ok(())
    }
}
