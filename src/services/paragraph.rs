/// Splits book text into trimmed, non-empty paragraphs.
///
/// Paragraphs are separated by two or more consecutive newlines. Lines holding
/// only spaces or tabs do not separate paragraphs, and the text between
/// separators is kept as is apart from trimming. Source order is preserved.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
