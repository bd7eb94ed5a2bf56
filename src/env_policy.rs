//! Environment variable policy.
//!
//! The interpreter never inherits the host environment. The policy
//! decides what it gets instead; some variables are always stripped.

use std::collections::HashMap;

/// Environment variables that are ALWAYS stripped, even from a fixed environment.
///
/// These change what the interpreter loads or runs before the snippet.
pub const ALWAYS_STRIP: &[&str] = &[
    // Library injection
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_DEBUG",
    "LD_PROFILE",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
    // Interpreter startup
    "PYTHONPATH",
    "PYTHONSTARTUP",
    "PYTHONHOME",
    "PYTHONUSERBASE",
    "PYTHONINSPECT",
    "PYTHONBREAKPOINT",
    "PYTHONEXECUTABLE",
    "PYTHONPLATLIBDIR",
    "PYTHONSAFEPATH",
    "PYTHONWARNINGS",
    // Proxy hijacking
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "http_proxy",
    "https_proxy",
    "all_proxy",
];

/// Output-encoding variables passed by [`EnvPolicy::EncodingOnly`].
pub const ENCODING_VARS: &[(&str, &str)] = &[
    ("PYTHONIOENCODING", "utf-8"),
    ("LANG", "C.UTF-8"),
    ("LC_ALL", "C.UTF-8"),
];

/// Policy for the environment of the interpreter process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvPolicy {
    /// Pass an empty environment.
    Empty,

    /// Pass only output-encoding variables (default).
    ///
    /// Sets: `PYTHONIOENCODING=utf-8`, `LANG=C.UTF-8`, `LC_ALL=C.UTF-8`
    #[default]
    EncodingOnly,

    /// Pass a fixed set of environment variables.
    ///
    /// ALWAYS_STRIP is still applied.
    Fixed(HashMap<String, String>),
}

impl EnvPolicy {
    /// Build the environment to pass to the interpreter.
    pub fn apply(&self) -> HashMap<String, String> {
        let mut result = match self {
            EnvPolicy::Empty => HashMap::new(),

            EnvPolicy::EncodingOnly => ENCODING_VARS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),

            EnvPolicy::Fixed(fixed) => fixed.clone(),
        };

        strip_dangerous(&mut result);

        result
    }

    /// Check if a specific key would be removed by ALWAYS_STRIP.
    pub fn is_forbidden(key: &str) -> bool {
        ALWAYS_STRIP.iter().any(|&s| s.eq_ignore_ascii_case(key))
    }
}

fn strip_dangerous(env: &mut HashMap<String, String>) {
    env.retain(|key, _| !EnvPolicy::is_forbidden(key));
}
