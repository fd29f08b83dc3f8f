//! Extraction of delimited reasoning blocks from assistant content.

use regex::Regex;

use crate::error::{CadenceError, Result};

/// Pulls `<think>…</think>`-style blocks out of visible content.
#[derive(Debug, Clone)]
pub struct ReasoningExtractor {
    block: Regex,
    blank_runs: Regex,
}

/// Visible content and side-channel reasoning after extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub content: String,
    pub reasoning: Option<String>,
}

impl ReasoningExtractor {
    pub fn new(open_tag: &str, close_tag: &str) -> Result<Self> {
        let pattern = format!(
            "(?s){}(.*?){}",
            regex::escape(open_tag),
            regex::escape(close_tag)
        );
        let block = Regex::new(&pattern)
            .map_err(|e| CadenceError::Configuration(format!("reasoning delimiters: {e}")))?;
        let blank_runs = Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+")
            .map_err(|e| CadenceError::Configuration(e.to_string()))?;
        Ok(Self { block, blank_runs })
    }

    /// Split `text` into visible content and reasoning. Blocks are joined
    /// with a blank line; empty blocks contribute nothing.
    pub fn extract(&self, text: &str) -> Extracted {
        if !self.block.is_match(text) {
            return Extracted {
                content: text.to_string(),
                reasoning: None,
            };
        }

        let blocks: Vec<&str> = self
            .block
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().trim())
            .filter(|block| !block.is_empty())
            .collect();

        let stripped = self.block.replace_all(text, "");
        let content = self.blank_runs.replace_all(&stripped, "\n\n").trim().to_string();
        let reasoning = (!blocks.is_empty()).then(|| blocks.join("\n\n"));
        Extracted { content, reasoning }
    }
}

impl Default for ReasoningExtractor {
    fn default() -> Self {
        Self::new("<think>", "</think>").expect("static reasoning delimiters are valid")
    }
}
