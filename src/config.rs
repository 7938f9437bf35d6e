/// Default number of lines kept by the history buffer.
pub const DEFAULT_HISTORY_CAPACITY: usize = 140;

/// Default hard ceiling on the length of one edited line, in bytes.
pub const DEFAULT_MAX_LINE_BYTES: usize = 4096;

/// Tunables for one interactive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Variable holding the `:`-separated executable search path.
    pub search_path_var: String,
    /// Maximum number of lines kept in history.
    pub history_capacity: usize,
    /// The line editor stops reading once the buffer reaches this many bytes.
    pub max_line_bytes: usize,
    /// Text printed before each line is read.
    pub prompt: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            search_path_var: "PATH".to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            prompt: "$ ".to_string(),
        }
    }
}
