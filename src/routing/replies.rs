//! Interpretation of replies to an open clarification

use std::collections::HashSet;

use crate::config::RepliesSection;
use crate::extraction::Extractor;
use crate::model::{InboundMessage, JobNumber};

/// What a reply to a clarification asks for
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyIntent {
    /// Open a new job instead
    NewJob,
    /// The sender named a job
    JobNumber(JobNumber),
    /// The sender confirmed the previously suggested job
    Affirmative,
    /// None of the above; the reply is routed as an ordinary message
    Unrecognized,
}

#[derive(Debug, Clone)]
pub struct ReplyInterpreter {
    new_job: HashSet<String>,
    affirmative: HashSet<String>,
}

impl ReplyInterpreter {
    pub fn new(replies: &RepliesSection) -> Self {
        let normalize_all =
            |words: &[String]| words.iter().map(|w| normalize(w)).collect::<HashSet<_>>();

        Self {
            new_job: normalize_all(&replies.new_job),
            affirmative: normalize_all(&replies.affirmative),
        }
    }

    /// Checks run in order: new-job directive, job number, affirmative.
    /// Only the reply's own text is read; the subject and the quoted history
    /// repeat the earlier thread.
    pub fn interpret(&self, message: &InboundMessage, extractor: &Extractor) -> ReplyIntent {
        let body = strip_quoted(&message.email_content);
        let normalized = normalize(body);

        if self.new_job.contains(&normalized) {
            return ReplyIntent::NewJob;
        }

        if let Some(job) = extractor.extract_job_number(body) {
            return ReplyIntent::JobNumber(job);
        }

        if self.affirmative.contains(&normalized) || normalized.starts_with("yes") {
            return ReplyIntent::Affirmative;
        }

        ReplyIntent::Unrecognized
    }
}

/// The part of a reply above the quoted history
pub fn strip_quoted(body: &str) -> &str {
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if is_quote_marker(line.trim()) {
            return &body[..offset];
        }
        offset += line.len();
    }
    body
}

fn is_quote_marker(line: &str) -> bool {
    line.starts_with('>')
        || line.starts_with("From:")
        || line.starts_with("-----Original Message-----")
        || (line.starts_with("On ") && line.ends_with("wrote:"))
}

/// Lowercase, collapse whitespace, drop trailing `.`, `!` and `,`
pub fn normalize(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    collapsed
        .trim_end_matches(['.', '!', ','])
        .trim_end()
        .to_string()
}
