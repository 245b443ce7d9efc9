/// Parser settings.
///
/// The defaults give Velocity's behaviour; most callers never
/// need anything but [`Config::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub(crate) name: String,
    pub(crate) trim_directive_newlines: bool,
    pub(crate) max_depth: usize,
}

impl Config {
    pub fn new() -> Self {
        Self {
            name: "template".to_string(),
            trim_directive_newlines: true,
            max_depth: 64,
        }
    }

    /// Name shown in diagnostics.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether a newline directly after a directive's closing `)` is swallowed.
    pub fn trim_directive_newlines(mut self, trim: bool) -> Self {
        self.trim_directive_newlines = trim;
        self
    }

    /// Deepest expression nesting the parser accepts before giving up.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
