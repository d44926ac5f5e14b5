//! Accumulates canonical stream events into a [`TurnResult`], including the
//! citation renumbering applied to search-grounded answers.

use regex_lite::Regex;

use crate::protocol::canonical::{StreamEvent, TurnResult, Usage};

/// Builds the turn's final result from the event stream. Tool-call events
/// are not its concern; the orchestration loop routes those to the
/// accumulator.
#[derive(Debug, Default)]
pub struct TurnAssembler {
    text: String,
    thinking: String,
    citations: Vec<String>,
    result: TurnResult,
}

impl TurnAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta(text) => self.text.push_str(text),
            StreamEvent::ThinkingDelta(text) => self.thinking.push_str(text),
            StreamEvent::Citation { sources } => self.citations = sources.clone(),
            StreamEvent::Finish(reason) => self.result.finish_reason = Some(*reason),
            StreamEvent::Usage(usage) => self.result.usage.merge(*usage),
            _ => {}
        }
    }

    pub fn merge_usage(&mut self, usage: Usage) {
        self.result.usage.merge(usage);
    }

    /// Reset the text channels for the next cycle of the tool loop while
    /// keeping usage totals. Thinking and citations carry over only from
    /// the final cycle, matching what the user ultimately sees.
    pub fn begin_cycle(&mut self) {
        self.text.clear();
        self.thinking.clear();
        self.citations.clear();
    }

    /// Visible text collected in the current cycle, used for the assistant
    /// message that records issued tool calls.
    #[must_use]
    pub fn cycle_text(&self) -> &str {
        &self.text
    }

    /// Finalize the turn.
    #[must_use]
    pub fn finish(mut self) -> TurnResult {
        if self.citations.is_empty() {
            self.result.text = self.text;
        } else {
            let (text, sources) = renumber_citations(&self.text, &self.citations);
            self.result.text = text;
            self.result.citations = sources;
        }
        if !self.thinking.is_empty() {
            self.result.thinking = Some(self.thinking);
        }
        self.result
    }
}

/// Rewrite `[n]` citation markers to first-use order and reorder the source
/// list to match. Markers pointing past the source list are left alone.
#[must_use]
pub fn renumber_citations(text: &str, sources: &[String]) -> (String, Vec<String>) {
    // regex-lite only fails on an invalid pattern; this one is fixed.
    let Ok(marker) = Regex::new(r"\[(\d+)\]") else {
        return (text.to_string(), sources.to_vec());
    };

    let mut order: Vec<usize> = Vec::new();
    for captures in marker.captures_iter(text) {
        if let Ok(index) = captures[1].parse::<usize>() {
            if index >= 1 && index <= sources.len() && !order.contains(&index) {
                order.push(index);
            }
        }
    }

    let rewritten = marker.replace_all(text, |captures: &regex_lite::Captures<'_>| {
        match captures[1].parse::<usize>() {
            Ok(old) => match order.iter().position(|&o| o == old) {
                Some(new) => format!("[{}]", new + 1),
                None => captures[0].to_string(),
            },
            Err(_) => captures[0].to_string(),
        }
    });

    let reordered: Vec<String> = order.iter().map(|&i| sources[i - 1].clone()).collect();
    (rewritten.into_owned(), reordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::FinishReason;

    #[test]
    fn test_assembles_text_and_finish() {
        let mut assembler = TurnAssembler::new();
        assembler.absorb(&StreamEvent::TextDelta("Hel".into()));
        assembler.absorb(&StreamEvent::TextDelta("lo".into()));
        assembler.absorb(&StreamEvent::Finish(FinishReason::Stop));
        let result = assembler.finish();
        assert_eq!(result.text, "Hello");
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
        assert!(result.thinking.is_none());
    }

    #[test]
    fn test_thinking_collected_separately() {
        let mut assembler = TurnAssembler::new();
        assembler.absorb(&StreamEvent::ThinkingDelta("mull ".into()));
        assembler.absorb(&StreamEvent::ThinkingDelta("it over".into()));
        assembler.absorb(&StreamEvent::TextDelta("42".into()));
        let result = assembler.finish();
        assert_eq!(result.text, "42");
        assert_eq!(result.thinking.as_deref(), Some("mull it over"));
    }

    #[test]
    fn test_usage_merges_across_cycles() {
        let mut assembler = TurnAssembler::new();
        assembler.absorb(&StreamEvent::Usage(Usage {
            input_tokens: Some(10),
            output_tokens: None,
        }));
        assembler.begin_cycle();
        assembler.absorb(&StreamEvent::Usage(Usage {
            input_tokens: None,
            output_tokens: Some(7),
        }));
        let result = assembler.finish();
        assert_eq!(result.usage.input_tokens, Some(10));
        assert_eq!(result.usage.output_tokens, Some(7));
    }

    #[test]
    fn test_renumber_first_use_order() {
        let sources = vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
            "https://c.example".to_string(),
        ];
        let (text, reordered) =
            renumber_citations("Fact [3] and fact [1], again [3].", &sources);
        assert_eq!(text, "Fact [1] and fact [2], again [1].");
        assert_eq!(reordered, vec!["https://c.example", "https://a.example"]);
    }

    #[test]
    fn test_out_of_range_marker_untouched() {
        let sources = vec!["https://a.example".to_string()];
        let (text, reordered) = renumber_citations("See [1] and [9].", &sources);
        assert_eq!(text, "See [1] and [9].");
        assert_eq!(reordered, vec!["https://a.example"]);
    }

    #[test]
    fn test_no_markers_yields_no_sources() {
        let sources = vec!["https://a.example".to_string()];
        let (text, reordered) = renumber_citations("No citations here.", &sources);
        assert_eq!(text, "No citations here.");
        assert!(reordered.is_empty());
    }
}
