//! Questions about a document and answering them from the assembled context.
//!
//! Questions come as `ID=question` lines. Every question is answered by its
//! own completion call; the calls run concurrently and answers keep the
//! question ids.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use tracing::{error, info};

use crate::contract::{Completer, CompletionError};

#[derive(Debug, thiserror::Error)]
pub enum QuestionsError {
    #[error("question line {line} has no '=' separator: {content:?}")]
    MissingSeparator { line: usize, content: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub text: String,
}

/// Parse `ID=question` lines, skipping blank lines.
pub fn parse_questions(raw: &str) -> Result<Vec<Question>, QuestionsError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            let (id, text) = line
                .split_once('=')
                .ok_or_else(|| QuestionsError::MissingSeparator {
                    line: number + 1,
                    content: line.to_owned(),
                })?;
            Ok(Question {
                id: id.trim().to_owned(),
                text: text.trim().to_owned(),
            })
        })
        .collect()
}

pub fn answer_system_prompt(full_context: &str) -> String {
    format!(
        "You answer questions about the article given below. The article may contain \
descriptions of its images and transcriptions of its recordings inside <attachment> tags; \
treat them as part of the article.\n\
### Rules\n\
- Answer with ONE short sentence.\n\
- Use only information from the article.\n\
- Do not repeat the question.\n\
### Article begin\n\
{full_context}\n\
### Article end"
    )
}

/// Answer every question against `full_context`, one completion each.
pub async fn answer_questions<C>(
    full_context: &str,
    questions: &[Question],
    completer: &C,
) -> Result<BTreeMap<String, String>, CompletionError>
where
    C: Completer + ?Sized,
{
    let system_prompt = answer_system_prompt(full_context);
    info!(questions = questions.len(), "Answering questions");

    let answers = try_join_all(questions.iter().map(|question| {
        let system_prompt = &system_prompt;
        async move {
            let answer = completer
                .complete(system_prompt, &question.text)
                .await
                .map_err(|e| {
                    error!(error = %e, id = %question.id, "Failed to answer question");
                    e
                })?;
            info!(id = %question.id, answer = %answer, "Answered question");
            Ok::<_, CompletionError>((question.id.clone(), answer.trim().to_owned()))
        }
    }))
    .await?;

    Ok(answers.into_iter().collect())
}
