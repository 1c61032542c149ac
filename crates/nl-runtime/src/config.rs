//! Runtime configuration parameters.

use std::env;
use std::error::Error;
use std::fmt;

use crate::layout::HEADER_ALIGN;

/// What the C ABI does when a request cannot be satisfied.
///
/// The Rust API always returns `Err`; this only governs entry points that
/// have no error channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Report through `std::alloc::handle_alloc_error`, which aborts.
    #[default]
    Abort,
    /// Return a null pointer to the caller.
    ReturnNull,
}

impl ExhaustionPolicy {
    /// Parse `abort` / `null` (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Some(Self::Abort),
            "null" | "return-null" | "return_null" => Some(Self::ReturnNull),
            _ => None,
        }
    }
}

/// Configuration for the runtime allocator.
///
/// Validated with [`validate`](RuntimeConfig::validate); immutable once a
/// runtime has been built from it.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Exhaustion behaviour of unchecked C entry points. Default: `Abort`.
    pub exhaustion: ExhaustionPolicy,

    /// Keep a ledger of live blocks to catch double and mismatched
    /// releases. Default: on in debug builds, off in release builds.
    pub track_allocations: bool,

    /// Alignment of every block in bytes. Default: 16, matching `malloc`.
    ///
    /// Must be a power of two and at least the slice header alignment.
    pub alignment: usize,
}

impl RuntimeConfig {
    /// Default block alignment.
    pub const DEFAULT_ALIGN: usize = 16;

    /// Upper bound on `alignment`.
    pub const MAX_ALIGN: usize = 4096;

    /// Environment variable selecting the [`ExhaustionPolicy`].
    pub const ENV_ON_OOM: &'static str = "NL_RUNTIME_ON_OOM";

    /// Environment variable toggling allocation tracking.
    pub const ENV_TRACK: &'static str = "NL_RUNTIME_TRACK";

    /// Environment variable overriding block alignment.
    pub const ENV_ALIGN: &'static str = "NL_RUNTIME_ALIGN";

    /// Create a config with default values.
    pub fn new() -> Self {
        Self {
            exhaustion: ExhaustionPolicy::default(),
            track_allocations: cfg!(debug_assertions),
            alignment: Self::DEFAULT_ALIGN,
        }
    }

    /// Defaults overridden by `NL_RUNTIME_*` environment variables.
    ///
    /// Unparseable or invalid values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();

        if let Some(raw) = lookup(Self::ENV_ON_OOM) {
            match ExhaustionPolicy::parse(&raw) {
                Some(policy) => config.exhaustion = policy,
                None => tracing::warn!(var = Self::ENV_ON_OOM, value = %raw, "ignoring unknown policy"),
            }
        }

        if let Some(raw) = lookup(Self::ENV_TRACK) {
            match parse_bool(&raw) {
                Some(track) => config.track_allocations = track,
                None => tracing::warn!(var = Self::ENV_TRACK, value = %raw, "ignoring non-boolean value"),
            }
        }

        if let Some(raw) = lookup(Self::ENV_ALIGN) {
            match raw.trim().parse::<usize>() {
                Ok(align) if validate_alignment(align).is_ok() => config.alignment = align,
                _ => tracing::warn!(var = Self::ENV_ALIGN, value = %raw, "ignoring invalid alignment"),
            }
        }

        config
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_alignment(self.alignment)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_alignment(alignment: usize) -> Result<(), ConfigError> {
    if !alignment.is_power_of_two() {
        return Err(ConfigError::AlignmentNotPowerOfTwo { alignment });
    }
    if alignment < HEADER_ALIGN || alignment > RuntimeConfig::MAX_ALIGN {
        return Err(ConfigError::AlignmentOutOfRange {
            alignment,
            min: HEADER_ALIGN,
            max: RuntimeConfig::MAX_ALIGN,
        });
    }
    Ok(())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Errors detected by [`RuntimeConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// `alignment` is not a power of two.
    AlignmentNotPowerOfTwo {
        /// The rejected alignment.
        alignment: usize,
    },
    /// `alignment` is below the slice header alignment or above the cap.
    AlignmentOutOfRange {
        /// The rejected alignment.
        alignment: usize,
        /// Smallest accepted alignment.
        min: usize,
        /// Largest accepted alignment.
        max: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlignmentNotPowerOfTwo { alignment } => {
                write!(f, "alignment {alignment} is not a power of two")
            }
            Self::AlignmentOutOfRange {
                alignment,
                min,
                max,
            } => {
                write!(f, "alignment {alignment} outside [{min}, {max}]")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.alignment, 16);
        assert_eq!(config.exhaustion, ExhaustionPolicy::Abort);
        assert_eq!(config.track_allocations, cfg!(debug_assertions));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("NL_RUNTIME_ON_OOM", "null"),
            ("NL_RUNTIME_TRACK", "yes"),
            ("NL_RUNTIME_ALIGN", "64"),
        ]));
        assert_eq!(config.exhaustion, ExhaustionPolicy::ReturnNull);
        assert!(config.track_allocations);
        assert_eq!(config.alignment, 64);
    }

    #[test]
    fn invalid_env_values_keep_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("NL_RUNTIME_ON_OOM", "explode"),
            ("NL_RUNTIME_TRACK", "maybe"),
            ("NL_RUNTIME_ALIGN", "24"),
        ]));
        let defaults = RuntimeConfig::default();
        assert_eq!(config.exhaustion, defaults.exhaustion);
        assert_eq!(config.track_allocations, defaults.track_allocations);
        assert_eq!(config.alignment, defaults.alignment);
    }

    #[test]
    fn alignment_must_be_power_of_two() {
        let config = RuntimeConfig {
            alignment: 24,
            ..RuntimeConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::AlignmentNotPowerOfTwo { alignment: 24 })
        );
    }

    #[test]
    fn alignment_below_header_is_rejected() {
        let config = RuntimeConfig {
            alignment: 1,
            ..RuntimeConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::AlignmentOutOfRange { alignment: 1, .. })
        ));
    }

    #[test]
    fn policy_parsing() {
        assert_eq!(ExhaustionPolicy::parse("ABORT"), Some(ExhaustionPolicy::Abort));
        assert_eq!(
            ExhaustionPolicy::parse(" return-null "),
            Some(ExhaustionPolicy::ReturnNull)
        );
        assert_eq!(ExhaustionPolicy::parse("retry"), None);
    }
}
