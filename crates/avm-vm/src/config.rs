//! Runtime limits.

use avm_runtime::PidLayout;

use crate::error::ConfigError;

pub const DEFAULT_IDX_BITS: u8 = 16;
pub const DEFAULT_GEN_BITS: u8 = 16;
pub const DEFAULT_INITIAL_HEAP: usize = 4 * 1024;
pub const DEFAULT_MAX_HEAP: usize = 64 * 1024 * 1024;
pub const DEFAULT_MAX_STACK: usize = 64 * 1024;
pub const DEFAULT_MAX_FRAMES: usize = 1024;
pub const DEFAULT_MAX_MAILBOX: usize = 64 * 1024;

/// Per-process limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorConfig {
    pub initial_heap: usize,
    pub max_heap: usize,
    /// Operand stack depth, in values.
    pub max_stack: usize,
    pub max_frames: usize,
    pub max_mailbox: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            initial_heap: DEFAULT_INITIAL_HEAP,
            max_heap: DEFAULT_MAX_HEAP,
            max_stack: DEFAULT_MAX_STACK,
            max_frames: DEFAULT_MAX_FRAMES,
            max_mailbox: DEFAULT_MAX_MAILBOX,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub idx_bits: u8,
    pub gen_bits: u8,
    pub actor: ActorConfig,
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<PidLayout, ConfigError> {
        if self.actor.initial_heap > self.actor.max_heap {
            return Err(ConfigError::HeapLimits {
                initial: self.actor.initial_heap,
                max: self.actor.max_heap,
            });
        }
        PidLayout::new(self.idx_bits, self.gen_bits).ok_or(ConfigError::PidLayout {
            idx_bits: self.idx_bits,
            gen_bits: self.gen_bits,
        })
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idx_bits: DEFAULT_IDX_BITS,
            gen_bits: DEFAULT_GEN_BITS,
            actor: ActorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        let layout = SchedulerConfig::default().validate().unwrap();
        assert_eq!(layout.max_processes(), 1 << 16);
    }

    #[test]
    fn test_bad_layout() {
        let config = SchedulerConfig {
            idx_bits: 24,
            gen_bits: 12,
            ..SchedulerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::PidLayout { idx_bits: 24, gen_bits: 12 })
        );
    }

    #[test]
    fn test_bad_heap_limits() {
        let mut config = SchedulerConfig::default();
        config.actor.initial_heap = config.actor.max_heap + 1;
        assert!(matches!(config.validate(), Err(ConfigError::HeapLimits { .. })));
    }
}
