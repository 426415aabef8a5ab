//! Config validation: unknown-key detection with Levenshtein suggestions
//! and physical range checks.
//!
//! Unknown keys are found by walking the raw `toml::Value` tree before serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::EngineConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Fields accepted inside every `[sensors.<name>]` table.
const SENSOR_PROFILE_KEYS: &[&str] = &[
    "epcs",
    "reference_epc",
    "sensing_epc",
    "window_seconds",
    "y_range",
];

/// Returns the set of valid dotted key paths for EngineConfig, excluding
/// the per-profile keys under `sensors.<name>`.
///
/// Any new field added to EngineConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "active_sensor",
        // [reader]
        "reader",
        "reader.read_rate",
        "reader.phase_unit",
        "reader.host",
        "reader.port",
        // [buffer]
        "buffer",
        "buffer.buffer_size",
        "buffer.history_capacity",
        // [engine]
        "engine",
        "engine.alignment",
        "engine.metric",
        "engine.tick_interval_ms",
        "engine.track_rssi",
        // [export]
        "export",
        "export.store_data",
        "export.data_dir",
        // [sensors]
        "sensors",
    ];
    keys.iter().copied().collect()
}

/// Recursively collect dotted key paths from a TOML value.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest candidate for an unknown key, if within edit distance 3.
pub fn suggest_correction<'a, I>(unknown: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, usize)> = None;
    for k in candidates {
        let dist = levenshtein(unknown, k);
        if dist <= 3 && best.map_or(true, |(_, best_dist)| dist < best_dist) {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Keys under `sensors.<name>` are checked against the profile field list.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let mut warnings = Vec::new();

    for key in walk_toml_keys(&value, "") {
        let parts: Vec<&str> = key.split('.').collect();
        let suggestion = match parts.as_slice() {
            ["sensors", _profile] => continue,
            ["sensors", profile, field] => {
                if SENSOR_PROFILE_KEYS.contains(field) {
                    continue;
                }
                suggest_correction(field, SENSOR_PROFILE_KEYS.iter().copied())
                    .map(|f| format!("sensors.{profile}.{f}"))
            }
            _ => {
                if known.contains(key.as_str()) {
                    continue;
                }
                suggest_correction(&key, known.iter().copied())
            }
        };
        warnings.push(ValidationWarning {
            message: format!("Unknown config key '{key}'"),
            field: key,
            suggestion,
        });
    }

    warnings
}

// ============================================================================
// Physical Range Validation
// ============================================================================

/// Check values against plausible reader ranges.
///
/// Returns `(errors, warnings)`: errors are impossible values, warnings are
/// legal but unusual settings.
pub fn validate_physical_ranges(config: &EngineConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let rate = config.reader.read_rate;
    if rate.is_finite() && rate > 2_000.0 {
        warnings.push(ValidationWarning {
            field: "reader.read_rate".to_string(),
            message: format!("reader.read_rate {rate} reads/s is above what UHF readers sustain"),
            suggestion: None,
        });
    }

    if config.engine.tick_interval_ms > 1_000 {
        warnings.push(ValidationWarning {
            field: "engine.tick_interval_ms".to_string(),
            message: format!(
                "engine.tick_interval_ms {} is slower than one evaluation per second",
                config.engine.tick_interval_ms
            ),
            suggestion: None,
        });
    }

    for (name, profile) in &config.sensors {
        if profile.window_seconds > 60.0 {
            warnings.push(ValidationWarning {
                field: format!("sensors.{name}.window_seconds"),
                message: format!(
                    "sensors.{name}.window_seconds {} makes every DTW evaluation very slow",
                    profile.window_seconds
                ),
                suggestion: None,
            });
        }
        if profile.epcs.iter().any(|e| e.trim().is_empty()) {
            errors.push(format!("sensors.{name}.epcs contains an empty EPC"));
        }
        if let Some(range) = profile.y_range {
            if !range.is_finite() || range <= 0.0 {
                errors.push(format!("sensors.{name}.y_range must be > 0, got {range}"));
            }
        }
    }

    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("buffer", "buffer"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("read_rte", "read_rate"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [sensors.soil]
            window_seconds = 1.0
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"sensors".to_string()));
        assert!(keys.contains(&"sensors.soil".to_string()));
        assert!(keys.contains(&"sensors.soil.window_seconds".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[reader]
read_rte = 100.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].suggestion.as_deref(), Some("reader.read_rate"));
    }

    #[test]
    fn test_profile_typo_suggests_profile_field() {
        let toml_str = r#"
[sensors.photo]
epcs = ["A", "B"]
window_second = 2.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("sensors.photo.window_seconds")
        );
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
active_sensor = "force"

[reader]
read_rate = 80.0

[engine]
alignment = "interpolation"

[sensors.force]
epcs = ["A", "B"]
reference_epc = "B"
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {warnings:?}");
    }

    #[test]
    fn test_physical_range_defaults_clean() {
        let (errors, warnings) = validate_physical_ranges(&EngineConfig::default());
        assert!(errors.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_physical_range_empty_epc_is_error() {
        let mut config = EngineConfig::default();
        if let Some(profile) = config.sensors.get_mut("soil") {
            profile.epcs.push("  ".to_string());
        }
        let (errors, _) = validate_physical_ranges(&config);
        assert_eq!(errors.len(), 1);
    }
}
