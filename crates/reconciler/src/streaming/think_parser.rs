use super::Segment;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Buffering state machine that splits text containing inline `<think>`
/// markup into plain and reasoning segments.
///
/// Markers may be split across chunk boundaries byte by byte; any buffer
/// suffix that could still become the marker relevant to the current state
/// is held back and flows into the next call.
#[derive(Debug, Default)]
pub struct ThinkTagParser {
    buffer: String,
    in_think: bool,
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw fragment, returning the segments that became complete.
    pub fn process(&mut self, fragment: &str) -> Vec<Segment> {
        self.buffer.push_str(fragment);

        let mut segments = Vec::new();
        loop {
            let marker = if self.in_think { THINK_CLOSE } else { THINK_OPEN };
            match self.buffer.find(marker) {
                Some(pos) => {
                    if pos > 0 {
                        let before: String = self.buffer.drain(..pos).collect();
                        segments.push(self.segment(before));
                    }
                    self.buffer.drain(..marker.len());
                    self.in_think = !self.in_think;
                }
                None => {
                    let held = held_back_len(&self.buffer, marker);
                    let safe = self.buffer.len() - held;
                    if safe > 0 {
                        let emit: String = self.buffer.drain(..safe).collect();
                        segments.push(self.segment(emit));
                    }
                    break;
                }
            }
        }
        segments
    }

    /// Force-emit whatever is still buffered according to the current state.
    /// Called on stream completion so trailing content is never dropped,
    /// even a partial marker that will now never complete.
    pub fn finish(&mut self) -> Vec<Segment> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.is_empty() {
            Vec::new()
        } else {
            vec![self.segment(rest)]
        }
    }

    /// True while positioned inside `<think>` markup.
    pub fn in_think(&self) -> bool {
        self.in_think
    }

    fn segment(&self, text: String) -> Segment {
        if self.in_think {
            Segment::Thinking(text)
        } else {
            Segment::Text(text)
        }
    }
}

/// Length of the longest buffer suffix that is a proper prefix of `marker`.
/// Markers are ASCII, so the resulting split point is always a char boundary.
fn held_back_len(buffer: &str, marker: &str) -> usize {
    let max = (marker.len() - 1).min(buffer.len());
    for len in (1..=max).rev() {
        let suffix = &buffer.as_bytes()[buffer.len() - len..];
        if marker.as_bytes().starts_with(suffix) {
            return len;
        }
    }
    0
}
