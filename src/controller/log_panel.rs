use std::collections::VecDeque;

/// Default number of lines the panel keeps.
pub const DEFAULT_LOG_LIMIT: usize = 300;

/// Marker line written at the start of every compile.
pub const RUN_MARKER: &str = "--- run ---";

/// A bounded list of log lines; the oldest lines are dropped first.
#[derive(Debug, Clone)]
pub struct LogPanel {
    lines: VecDeque<String>,
    limit: usize,
}

impl Default for LogPanel {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LIMIT)
    }
}

impl LogPanel {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Appends a line. Empty text is ignored.
    pub fn push(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.lines.push_back(text);
        while self.lines.len() > self.limit {
            self.lines.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn contains(&self, text: &str) -> bool {
        self.lines.iter().any(|line| line == text)
    }
}
