use tracing::debug;

use crate::models::chat::Message;

/// Trims history to an approximate token budget.
///
/// Token cost is estimated from a fixed characters-per-token ratio; this is
/// not a tokenizer, only a monotonic trimming policy.
#[derive(Debug, Clone, Copy)]
pub struct ContextCompressor {
    chars_per_token: usize,
}

impl ContextCompressor {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    pub fn count_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|msg| self.estimate_tokens(&msg.content))
            .sum()
    }

    /// Most recent messages that fit in `token_budget`, oldest first.
    /// The newest message is always kept, even if it alone is over budget.
    pub fn compress(&self, messages: &[Message], token_budget: usize) -> Vec<Message> {
        let mut total = 0usize;
        let mut kept = 0usize;

        for message in messages.iter().rev() {
            let cost = self.estimate_tokens(&message.content);
            if total + cost > token_budget && kept > 0 {
                break;
            }
            total += cost;
            kept += 1;
        }

        if kept < messages.len() {
            debug!(
                "Compressed history from {} to {} messages (~{} tokens, budget {})",
                messages.len(),
                kept,
                total,
                token_budget
            );
        }

        messages[messages.len() - kept..].to_vec()
    }
}

impl Default for ContextCompressor {
    fn default() -> Self {
        Self::new(4)
    }
}
