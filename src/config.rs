//! Reference host configuration.
//!
//! Limits and policies the ABI leaves to the host. Defaults follow the
//! constants below.

// ─── Defaults ──────────────────────────────────────────────────────

/// Value `sload` returns for a slot never written.
pub const DEFAULT_SLOT_VALUE: u64 = 0;

/// Maximum nesting of sub-call frames, top-level frame included.
pub const MAX_CALL_DEPTH: usize = 1024;

/// Largest return buffer the host will copy out of the guest.
pub const MAX_RETURN_LEN: usize = 24_576;

/// Native stack reserved per call frame on the guest thread. Each sub-call
/// nests the trap handler, `catch_unwind` and the callee on that stack.
pub const STACK_PER_FRAME: usize = 128 * 1024;

// ─── Fall-through policy ───────────────────────────────────────────

/// What the host does when a guest entry point returns without calling
/// `return` or `revert`. The ABI leaves this undefined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FallthroughPolicy {
    /// Discard writes and report `HostError::MissingExit` (a failed call
    /// for sub-calls).
    #[default]
    Reject,
    /// Treat as `return` with empty output.
    Commit,
    /// Treat as `revert`.
    Abort,
}

// ─── HostConfig ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostConfig {
    pub default_slot_value: u64,
    pub max_call_depth: usize,
    pub max_return_len: usize,
    pub fallthrough: FallthroughPolicy,
    /// Keep a register snapshot of every trap in the receipt.
    pub record_traps: bool,
    pub stack_per_frame: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            default_slot_value: DEFAULT_SLOT_VALUE,
            max_call_depth: MAX_CALL_DEPTH,
            max_return_len: MAX_RETURN_LEN,
            fallthrough: FallthroughPolicy::default(),
            record_traps: true,
            stack_per_frame: STACK_PER_FRAME,
        }
    }
}

impl HostConfig {
    pub fn with_default_slot_value(mut self, value: u64) -> Self {
        self.default_slot_value = value;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_max_return_len(mut self, len: usize) -> Self {
        self.max_return_len = len;
        self
    }

    pub fn with_fallthrough(mut self, policy: FallthroughPolicy) -> Self {
        self.fallthrough = policy;
        self
    }

    pub fn with_record_traps(mut self, record: bool) -> Self {
        self.record_traps = record;
        self
    }

    pub fn with_stack_per_frame(mut self, bytes: usize) -> Self {
        self.stack_per_frame = bytes;
        self
    }

    /// Stack size of the thread a top-level execution runs on: enough for
    /// `max_call_depth` nested frames plus one for the host itself.
    pub fn guest_stack_size(&self) -> usize {
        self.max_call_depth
            .saturating_add(1)
            .saturating_mul(self.stack_per_frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HostConfig::default();
        assert_eq!(config.default_slot_value, 0);
        assert_eq!(config.max_call_depth, 1024);
        assert_eq!(config.max_return_len, 24_576);
        assert_eq!(config.fallthrough, FallthroughPolicy::Reject);
        assert!(config.record_traps);
        assert_eq!(config.stack_per_frame, STACK_PER_FRAME);
    }

    #[test]
    fn guest_stack_scales_with_depth() {
        let config = HostConfig::default()
            .with_max_call_depth(3)
            .with_stack_per_frame(1000);
        assert_eq!(config.guest_stack_size(), 4000);

        let huge = HostConfig::default().with_max_call_depth(usize::MAX);
        assert_eq!(huge.guest_stack_size(), usize::MAX);
    }

    #[test]
    fn builder_overrides() {
        let config = HostConfig::default()
            .with_default_slot_value(7)
            .with_max_call_depth(2)
            .with_max_return_len(16)
            .with_fallthrough(FallthroughPolicy::Commit)
            .with_record_traps(false);
        assert_eq!(config.default_slot_value, 7);
        assert_eq!(config.max_call_depth, 2);
        assert_eq!(config.max_return_len, 16);
        assert_eq!(config.fallthrough, FallthroughPolicy::Commit);
        assert!(!config.record_traps);
    }
}
