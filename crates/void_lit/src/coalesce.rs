//! Per-frame coalescing of light-set changes
//!
//! Any number of light changes within a frame produce at most one recompose,
//! at the frame boundary. Until the new variant is compiled the previously
//! active one stays bound.

use crate::cache::ShaderVariantCache;
use crate::key::PermutationKey;
use crate::light::{LightDescriptor, LitOptions};
use crate::{ComposeError, LightComposer};

/// Something about the light set or material changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightSetChange {
    Added,
    Removed,
    Enabled,
    Disabled,
    ShadowChanged,
    ShapeChanged,
    CookieChanged,
    MaterialChanged,
}

/// What happened at a frame boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing changed this frame
    Idle,
    /// Changes resolved to the variant already active
    Unchanged,
    /// Switched to a variant that was already compiled
    Switched(PermutationKey),
    /// Variant was submitted earlier and is still compiling
    Waiting(PermutationKey),
    /// Composed and submitted a new variant
    Submitted(PermutationKey),
}

/// Counters for the coalescer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    pub frames: u64,
    /// Change notifications received
    pub changes: u64,
    /// Frames that recomposed
    pub compositions: u64,
    /// Pending variants promoted to active
    pub promotions: u64,
}

/// Collapses light changes to one recompose per frame
#[derive(Debug, Default)]
pub struct FrameCoalescer {
    dirty: bool,
    active: Option<PermutationKey>,
    pending: Option<PermutationKey>,
    stats: CoalescerStats,
}

impl FrameCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change; nothing is composed until [`Self::end_frame`]
    pub fn notify(&mut self, change: LightSetChange) {
        log::trace!("Light set change: {:?}", change);
        self.dirty = true;
        self.stats.changes += 1;
    }

    /// Whether changes are waiting for the frame boundary
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Variant currently bound for rendering
    pub fn active_key(&self) -> Option<&PermutationKey> {
        self.active.as_ref()
    }

    /// Variant waiting for the compile step
    pub fn pending_key(&self) -> Option<&PermutationKey> {
        self.pending.as_ref()
    }

    pub fn stats(&self) -> &CoalescerStats {
        &self.stats
    }

    /// Frame boundary
    ///
    /// Promotes a pending variant that finished compiling, then, if anything
    /// changed, resolves the current light set to a variant. On error the
    /// active variant is kept and the change is dropped.
    pub fn end_frame(
        &mut self,
        composer: &LightComposer,
        lights: &[LightDescriptor],
        options: &LitOptions,
        cache: &dyn ShaderVariantCache,
    ) -> Result<FrameOutcome, ComposeError> {
        self.stats.frames += 1;
        self.promote(cache);

        if !self.dirty {
            return Ok(FrameOutcome::Idle);
        }
        self.dirty = false;

        let key = composer.permutation_key(lights, options)?;

        if self.active.as_ref() == Some(&key) {
            self.pending = None;
            return Ok(FrameOutcome::Unchanged);
        }
        if cache.is_ready(&key) {
            log::debug!("Switching to compiled variant {:016x}", key.digest());
            self.active = Some(key.clone());
            self.pending = None;
            return Ok(FrameOutcome::Switched(key));
        }
        if cache.contains(&key) {
            self.pending = Some(key.clone());
            return Ok(FrameOutcome::Waiting(key));
        }

        let shader = composer.compose(lights, options)?;
        cache.submit(shader);
        self.stats.compositions += 1;
        self.pending = Some(key.clone());
        Ok(FrameOutcome::Submitted(key))
    }

    fn promote(&mut self, cache: &dyn ShaderVariantCache) {
        let ready = self.pending.as_ref().map_or(false, |key| cache.is_ready(key));
        if ready {
            self.active = self.pending.take();
            self.stats.promotions += 1;
        }
    }
}
