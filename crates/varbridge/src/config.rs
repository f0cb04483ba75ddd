/// Default nesting limit for value conversion.
///
/// Protects against stack overflow on deeply nested host containers like
/// `a = []; for _ in range(10_000): a = [a]`.
pub const DEFAULT_MAX_DEPTH: usize = 200;

/// Default separator between an owner class name and a nested enum name.
pub const DEFAULT_SCOPE_SEPARATOR: &str = "::";

/// Configuration shared by the enum and value bridges.
///
/// Use `BridgeConfig::default()` for the defaults, or build custom settings
/// with the builder methods.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Joins owner and enum names into the registered type name (`Owner::Color`).
    pub scope_separator: String,
    /// Maximum container nesting the value converter descends into.
    pub max_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scope_separator: DEFAULT_SCOPE_SEPARATOR.to_owned(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl BridgeConfig {
    /// Creates a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the owner/enum name separator.
    #[must_use]
    pub fn scope_separator(mut self, separator: impl Into<String>) -> Self {
        self.scope_separator = separator.into();
        self
    }

    /// Sets the maximum conversion nesting depth.
    #[must_use]
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Parses a config from JSON, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
