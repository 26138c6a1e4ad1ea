//! Shader variant cache
//!
//! The composer never compiles. Composed programs are handed to a
//! [`ShaderVariantCache`]; the compile step marks them ready when it is done,
//! which may be frames later. [`VariantRegistry`] is the in-process
//! implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::assemble::ComposedShader;
use crate::key::PermutationKey;

/// Seam between the composer and whatever compiles and stores variants
pub trait ShaderVariantCache: Send + Sync {
    /// Whether a variant with this key was ever submitted
    fn contains(&self, key: &PermutationKey) -> bool;

    /// Whether the variant is compiled and can be bound
    fn is_ready(&self, key: &PermutationKey) -> bool;

    /// Hand a composed program over for compilation
    fn submit(&self, shader: ComposedShader);
}

/// Unique variant identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantId(u64);

impl VariantId {
    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Compile state of a variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantState {
    /// Submitted, waiting for the compile step
    Pending,
    /// Compiled and bindable
    Ready,
    /// Compile step rejected the program
    Failed(String),
}

/// A registered variant
#[derive(Debug, Clone)]
pub struct VariantEntry {
    pub id: VariantId,
    pub shader: Arc<ComposedShader>,
    pub state: VariantState,
    pub metadata: VariantMetadata,
}

/// Variant metadata
#[derive(Debug, Clone, Default)]
pub struct VariantMetadata {
    /// Submission timestamp (Unix epoch seconds)
    pub submitted_at: u64,
    /// When the variant became ready
    pub ready_at: Option<u64>,
    /// Number of times the same key was submitted again
    pub resubmissions: u32,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

type Listener = Box<dyn Fn(&PermutationKey, &VariantState) + Send + Sync>;

/// In-process variant registry
///
/// Entries are only dropped through [`VariantRegistry::remove`] or
/// [`VariantRegistry::retain`]; the registry never evicts on its own.
pub struct VariantRegistry {
    next_id: AtomicU64,
    entries: RwLock<HashMap<PermutationKey, VariantEntry>>,
    listeners: RwLock<Vec<Listener>>,
}

impl VariantRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a composed program as pending
    ///
    /// Submitting a key that is already present keeps the existing entry and
    /// its state.
    pub fn register(&self, shader: ComposedShader) -> VariantId {
        let key = shader.key.clone();
        let mut entries = self.entries.write();

        if let Some(existing) = entries.get_mut(&key) {
            existing.metadata.resubmissions = existing.metadata.resubmissions.saturating_add(1);
            return existing.id;
        }

        let id = VariantId(self.next_id.fetch_add(1, Ordering::Relaxed));
        entries.insert(
            key.clone(),
            VariantEntry {
                id,
                shader: Arc::new(shader),
                state: VariantState::Pending,
                metadata: VariantMetadata {
                    submitted_at: now_secs(),
                    ..Default::default()
                },
            },
        );
        drop(entries);

        log::debug!("Registered variant {:016x} ({})", key.digest(), key);
        self.notify_listeners(&key, &VariantState::Pending);
        id
    }

    /// Mark a pending variant compiled
    pub fn mark_ready(&self, key: &PermutationKey) -> bool {
        self.set_state(key, VariantState::Ready)
    }

    /// Mark a variant as rejected by the compile step
    pub fn mark_failed(&self, key: &PermutationKey, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        log::error!("Variant {:016x} failed to compile: {}", key.digest(), reason);
        self.set_state(key, VariantState::Failed(reason))
    }

    fn set_state(&self, key: &PermutationKey, state: VariantState) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        if state == VariantState::Ready {
            entry.metadata.ready_at = Some(now_secs());
        }
        entry.state = state.clone();
        drop(entries);

        self.notify_listeners(key, &state);
        true
    }

    /// Get an entry by key
    pub fn get(&self, key: &PermutationKey) -> Option<VariantEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Get the composed program by key
    pub fn shader(&self, key: &PermutationKey) -> Option<Arc<ComposedShader>> {
        self.entries.read().get(key).map(|e| e.shader.clone())
    }

    /// Compile state of a variant
    pub fn state(&self, key: &PermutationKey) -> Option<VariantState> {
        self.entries.read().get(key).map(|e| e.state.clone())
    }

    /// Keys still waiting for the compile step
    pub fn pending_keys(&self) -> Vec<PermutationKey> {
        let mut keys: Vec<_> = self
            .entries
            .read()
            .iter()
            .filter(|(_, e)| e.state == VariantState::Pending)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remove a variant
    pub fn remove(&self, key: &PermutationKey) -> Option<VariantEntry> {
        self.entries.write().remove(key)
    }

    /// Keep only the variants matching `keep`
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&PermutationKey, &VariantEntry) -> bool,
    {
        self.entries.write().retain(|k, e| keep(k, e));
    }

    /// Get total number of variants
    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    /// Add a state change listener
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(&PermutationKey, &VariantState) + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }

    /// Clear all listeners
    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    fn notify_listeners(&self, key: &PermutationKey, state: &VariantState) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener(key, state);
        }
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let entries = self.entries.read();
        let count = |state: &VariantState| entries.values().filter(|e| &e.state == state).count();

        RegistryStats {
            total_variants: entries.len(),
            ready: count(&VariantState::Ready),
            pending: count(&VariantState::Pending),
            failed: entries
                .values()
                .filter(|e| matches!(e.state, VariantState::Failed(_)))
                .count(),
            total_source_bytes: entries.values().map(|e| e.shader.source.len()).sum(),
        }
    }
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderVariantCache for VariantRegistry {
    fn contains(&self, key: &PermutationKey) -> bool {
        self.entries.read().contains_key(key)
    }

    fn is_ready(&self, key: &PermutationKey) -> bool {
        self.entries
            .read()
            .get(key)
            .map_or(false, |e| e.state == VariantState::Ready)
    }

    fn submit(&self, shader: ComposedShader) {
        self.register(shader);
    }
}

/// Registry statistics
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Total number of variants
    pub total_variants: usize,
    pub ready: usize,
    pub pending: usize,
    pub failed: usize,
    /// Total program text bytes
    pub total_source_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::LightDescriptor;
    use crate::{ComposerConfig, LightComposer, LitOptions};
    use std::sync::atomic::AtomicUsize;

    fn composed(lights: &[LightDescriptor]) -> ComposedShader {
        LightComposer::new(ComposerConfig::default())
            .compose(lights, &LitOptions::default())
            .unwrap()
    }

    #[test]
    fn test_register_pending_then_ready() {
        let registry = VariantRegistry::new();
        let shader = composed(&[LightDescriptor::omni()]);
        let key = shader.key.clone();

        registry.register(shader);
        assert!(registry.contains(&key));
        assert!(!registry.is_ready(&key));
        assert_eq!(registry.pending_keys(), vec![key.clone()]);

        assert!(registry.mark_ready(&key));
        assert!(registry.is_ready(&key));
        assert!(registry.get(&key).unwrap().metadata.ready_at.is_some());
    }

    #[test]
    fn test_resubmission_keeps_state() {
        let registry = VariantRegistry::new();
        let shader = composed(&[LightDescriptor::spot()]);
        let key = shader.key.clone();

        let first = registry.register(shader.clone());
        registry.mark_ready(&key);
        let second = registry.register(shader);

        assert_eq!(first, second);
        assert_eq!(registry.state(&key), Some(VariantState::Ready));
        assert_eq!(registry.get(&key).unwrap().metadata.resubmissions, 1);
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_listeners_and_stats() {
        let registry = VariantRegistry::new();
        let events = Arc::new(AtomicUsize::new(0));
        let counter = events.clone();
        registry.add_listener(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let a = composed(&[LightDescriptor::omni()]);
        let b = composed(&[LightDescriptor::directional()]);
        let (ka, kb) = (a.key.clone(), b.key.clone());
        registry.submit(a);
        registry.submit(b);
        registry.mark_ready(&ka);
        registry.mark_failed(&kb, "bad");

        assert_eq!(events.load(Ordering::SeqCst), 4);
        let stats = registry.stats();
        assert_eq!(stats.total_variants, 2);
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 0);
        assert!(stats.total_source_bytes > 0);
    }

    #[test]
    fn test_unknown_key() {
        let registry = VariantRegistry::new();
        let key = composed(&[]).key;
        assert!(!registry.mark_ready(&key));
        assert!(registry.remove(&key).is_none());
    }

    #[test]
    fn test_retain() {
        let registry = VariantRegistry::new();
        registry.submit(composed(&[LightDescriptor::omni()]));
        registry.submit(composed(&[LightDescriptor::spot()]));
        registry.retain(|key, _| key.as_str().contains("spot"));
        assert_eq!(registry.count(), 1);
    }
}
