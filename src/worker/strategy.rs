use std::fmt;

/// How a task's command is executed.
///
/// The wire carries a free-form `querytype` tag; it is resolved here into a
/// closed set so every execution path is matched exhaustively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// `<shell> -c <command>`
    #[default]
    Shell,
    /// HTTP GET of the URL given as command
    Fetch,
}

impl Strategy {
    /// Resolve a request's query type. Unknown or empty tags run through the
    /// shell. "wget" downloads the same way "curl" does.
    pub fn from_query_type(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "curl" | "wget" => Strategy::Fetch,
            _ => Strategy::Shell,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Shell => "shell",
            Strategy::Fetch => "fetch",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
