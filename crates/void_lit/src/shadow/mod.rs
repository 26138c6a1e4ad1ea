//! Shadow code generation
//!
//! ```text
//! ShadowSettings ──► ShadowCoordCaps ──► CoordStrategy ──► shadowCoord
//!        │                                                    │
//!        └─────────► ShadowSampler (dispatch) ◄───────────────┘
//!                          │
//!                          ▼
//!                 getShadow{slot}() -> float
//! ```
//!
//! The resolver and the dispatcher are tables keyed on the light type and the
//! shadow algorithm. [`pass`] keeps the shadow-map render pass consistent with
//! what the sampling side expects to read.

pub mod cascade;
pub mod coord;
pub mod dispatch;
pub mod pass;

pub use cascade::{select_cascade, MAX_CASCADES};
pub use coord::{resolve_shadow_coord, CoordStrategy, ShadowCoordCaps, ShadowCoordInput};
pub use dispatch::{select_sampler, SearchArea, ShadowSampler};
pub use pass::{shadow_pass_defines, uses_perspective_depth};
