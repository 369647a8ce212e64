//! Driver descriptions bundled with the library.
//!
//! These are embedded at compile time and serve as starting points for
//! virtual devices.

use crate::DriverConfig;

/// Names of the built-in descriptions.
pub static BUILTIN_NAMES: &[&str] = &["null_output", "loopback", "microphone"];

static BUILTIN_TOML: &[(&str, &str)] = &[
    ("null_output", NULL_OUTPUT),
    ("loopback", LOOPBACK),
    ("microphone", MICROPHONE),
];

/// One stereo output stream that discards everything written to it.
const NULL_OUTPUT: &str = r#"
[[devices]]
name = "Null Output"
device_uid = "halrt:null-output"
sample_rate = 44100.0
channel_count = 2

[[devices.streams]]
direction = "output"
"#;

/// Paired input and output at common rates.
const LOOPBACK: &str = r#"
[[devices]]
name = "Loopback"
device_uid = "halrt:loopback"
sample_rate = 48000.0
channel_count = 2
latency = 64
safety_offset = 32
available_sample_rates = [44100.0, 48000.0, { min = 88200.0, max = 96000.0 }]

[[devices.streams]]
direction = "input"
format = "f32"
mute = true

[[devices.streams]]
direction = "output"
format = "f32"
mute = true
"#;

/// Mono input with volume and mute controls.
const MICROPHONE: &str = r#"
[[devices]]
name = "Virtual Microphone"
device_uid = "halrt:microphone"
sample_rate = 48000.0
channel_count = 1
can_be_default_for_system_sounds = false

[[devices.streams]]
direction = "input"
mute = true
"#;

/// All built-in descriptions, in [`BUILTIN_NAMES`] order.
pub fn builtin_configs() -> Vec<DriverConfig> {
    BUILTIN_TOML
        .iter()
        .filter_map(|(_, toml)| DriverConfig::from_toml(toml).ok())
        .collect()
}

/// Look up a built-in description by name (case-insensitive).
///
/// ```rust
/// use halrt_config::builtin_config;
///
/// let config = builtin_config("Loopback").unwrap();
/// assert_eq!(config.devices[0].streams.len(), 2);
/// ```
pub fn builtin_config(name: &str) -> Option<DriverConfig> {
    BUILTIN_TOML
        .iter()
        .find(|(builtin, _)| builtin.eq_ignore_ascii_case(name))
        .and_then(|(_, toml)| DriverConfig::from_toml(toml).ok())
}

/// Whether `name` names a built-in description.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.iter().any(|n| n.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_parse_and_validate() {
        let configs = builtin_configs();
        assert_eq!(configs.len(), BUILTIN_NAMES.len());
        for (name, config) in BUILTIN_NAMES.iter().zip(&configs) {
            assert!(config.validate().is_ok(), "{name} should validate");
            assert_eq!(config.devices.len(), 1);
        }
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert!(builtin_config("MICROPHONE").is_some());
        assert!(builtin_config("nope").is_none());
        assert!(is_builtin("Null_Output"));
        assert!(!is_builtin("custom"));
    }

    #[test]
    fn loopback_declares_rate_range() {
        let config = builtin_config("loopback").unwrap();
        let device = &config.devices[0];
        assert_eq!(device.available_sample_rates.len(), 3);
        assert!(device.available_sample_rates[2].range().contains(96000.0));
        assert!(device.streams.iter().all(|s| s.mute));
    }
}
