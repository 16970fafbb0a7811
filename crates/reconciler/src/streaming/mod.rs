//! Splitting raw streamed text into answer and reasoning segments

mod think_parser;

#[cfg(test)]
mod test_utils;

pub use think_parser::ThinkTagParser;

/// One segment of raw streamed text after inline-markup splitting.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Regular answer text
    Text(String),
    /// Reasoning content carried inside `<think>` markup
    Thinking(String),
}
