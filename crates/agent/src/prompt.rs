use pagebot_core::{Document, QaAnswer};

const DOCUMENT_SEPARATOR: &str = "\n\n";

pub fn render_document(document: &Document) -> String {
    format!("Content: {}\nSource: {}", document.page_content, document.source())
}

/// Stuffs every retrieved document into a single combine prompt.
pub fn stuff_prompt(question: &str, documents: &[Document]) -> String {
    let summaries =
        documents.iter().map(render_document).collect::<Vec<_>>().join(DOCUMENT_SEPARATOR);

    format!(
        "Given the following extracted parts of a long document and a question, \
create a final answer with references (\"SOURCES\").\n\
If you don't know the answer, just say that you don't know. Don't try to make up an answer.\n\
ALWAYS return a \"SOURCES\" part in your answer.\n\n\
QUESTION: {question}\n\
=========\n\
{summaries}\n\
=========\n\
FINAL ANSWER:"
    )
}

/// Splits model output into answer and sources.
///
/// Follows the `SOURCES?:|QUESTION:\s` split (case insensitive) of LangChain's
/// sources chains: output without a `SOURCE:`/`SOURCES:` marker is all answer.
/// Otherwise the answer is the text before the first separator and the
/// sources are the first line of the text up to the next one.
pub fn parse_answer(output: &str) -> QaAnswer {
    let lowered = output.to_ascii_lowercase();
    if !lowered.contains("source:") && !lowered.contains("sources:") {
        return QaAnswer { answer: output.trim().to_owned(), sources: String::new() };
    }

    let Some((start, len)) = next_separator(&lowered, 0) else {
        return QaAnswer { answer: output.trim().to_owned(), sources: String::new() };
    };
    let rest_start = start + len;
    let rest_end = next_separator(&lowered, rest_start).map_or(output.len(), |(next, _)| next);
    let sources = output[rest_start..rest_end].split('\n').next().unwrap_or("").trim().to_owned();

    QaAnswer { answer: output[..start].trim().to_owned(), sources }
}

/// Earliest separator at or after `from`, as `(index, length)`.
fn next_separator(lowered: &str, from: usize) -> Option<(usize, usize)> {
    let haystack = &lowered[from..];
    let sources = ["sources:", "source:"]
        .iter()
        .filter_map(|marker| haystack.find(marker).map(|index| (index, marker.len())));
    let question = haystack.match_indices("question:").find_map(|(index, marker)| {
        let next = haystack[index + marker.len()..].chars().next()?;
        next.is_whitespace().then_some((index, marker.len() + next.len_utf8()))
    });

    sources.chain(question).min_by_key(|(index, _)| *index).map(|(index, len)| (from + index, len))
}
