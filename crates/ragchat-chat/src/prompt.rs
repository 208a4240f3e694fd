//! Deterministic prompt assembly.
//!
//! Layout: system preamble carrying the excerpts (relevance order, each tagged with its
//! source id), then the conversation history, then the question. When the whole prompt is
//! over the context budget, excerpts are dropped from the least relevant end until it fits.
//! The question and history are never cut.

use ragchat_resolve::RetrievedDocument;

use crate::types::{ChatMessage, Citation};

const PREAMBLE: &str = "You are the AI assistant of a test case management system.\n\n";

const CONTEXT_HEADER: &str = "The following excerpts were retrieved from related documents. \
Answer the user's question based on them.\n\n=== Reference documents ===\n";

const CONTEXT_FOOTER: &str = "===========================\n\n\
Cite the sources you used by their source id (e.g. [source: doc-1]). \
If the excerpts are not sufficient to answer, say so clearly.";

const NO_CONTEXT: &str = "No reference documents were found for this question. \
Do not claim that your answer is based on project documents; answer from general knowledge \
and state that no supporting documents were available.";

/// A prompt ready for the LLM plus the documents that made it in.
#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub messages: Vec<ChatMessage>,
    /// Documents present in the prompt, in relevance order.
    pub included: Vec<RetrievedDocument>,
    /// How many retrieved documents were trimmed to meet the budget.
    pub dropped: usize,
}

impl AssembledPrompt {
    /// Citations for exactly the included documents.
    pub fn citations(&self) -> Vec<Citation> {
        self.included.iter().map(Citation::from).collect()
    }

    /// Prompt size in characters.
    pub fn char_len(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }
}

fn excerpt_block(doc: &RetrievedDocument) -> String {
    format!(
        "[source: {}] {} (relevance {:.2})\n{}\n\n",
        doc.id, doc.origin.title, doc.score, doc.content
    )
}

fn system_prompt(blocks: &[String]) -> String {
    if blocks.is_empty() {
        return format!("{}{}", PREAMBLE, NO_CONTEXT);
    }
    let mut out = String::from(PREAMBLE);
    out.push_str(CONTEXT_HEADER);
    for block in blocks {
        out.push_str(block);
    }
    out.push_str(CONTEXT_FOOTER);
    out
}

/// Build the prompt for one turn. `documents` must already be in relevance order.
pub fn assemble_prompt(
    question: &str,
    history: &[ChatMessage],
    documents: Vec<RetrievedDocument>,
    budget: usize,
) -> AssembledPrompt {
    let fixed: usize = question.chars().count()
        + history.iter().map(|m| m.content.chars().count()).sum::<usize>();
    let blocks: Vec<String> = documents.iter().map(excerpt_block).collect();
    let framing = PREAMBLE.chars().count()
        + CONTEXT_HEADER.chars().count()
        + CONTEXT_FOOTER.chars().count();

    let mut keep = blocks.len();
    let mut excerpt_chars: usize = blocks.iter().map(|b| b.chars().count()).sum();
    while keep > 0 && fixed + framing + excerpt_chars > budget {
        keep -= 1;
        excerpt_chars -= blocks[keep].chars().count();
    }

    let mut included = documents;
    let dropped = included.len() - keep;
    included.truncate(keep);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(&blocks[..keep])));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::user(question));

    AssembledPrompt {
        messages,
        included,
        dropped,
    }
}
