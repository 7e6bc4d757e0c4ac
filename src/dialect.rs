use serde::{Deserialize, Serialize};

/// How the contents of a bracket expression `[...]` are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassSyntax {
    /// Backslash is an ordinary character inside brackets.
    Posix,
    /// Backslash escapes (`\d`, `\n`, `\]`, ...) are recognised inside brackets.
    #[default]
    Pcre,
}

/// Dialect options for a single `parse` call.
///
/// One parser serves every dialect; the differences are captured here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    /// Let several groups share a name instead of failing with `DuplicateGroupName`.
    pub allow_duplicate_group_names: bool,
    /// Deepest group nesting accepted before `MaxDepthExceeded`.
    pub max_nesting_depth: usize,
    pub class_syntax: ClassSyntax,
}

impl DialectConfig {
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 1000;

    pub fn with_duplicate_group_names(mut self, allow: bool) -> Self {
        self.allow_duplicate_group_names = allow;
        self
    }

    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    pub fn with_class_syntax(mut self, syntax: ClassSyntax) -> Self {
        self.class_syntax = syntax;
        self
    }
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            allow_duplicate_group_names: false,
            max_nesting_depth: Self::DEFAULT_MAX_NESTING_DEPTH,
            class_syntax: ClassSyntax::default(),
        }
    }
}
