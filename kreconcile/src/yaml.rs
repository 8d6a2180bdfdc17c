//! Lossless splitting of YAML files into documents.
//!
//! `serde_yaml` does not retain comments or formatting, so every document keeps the exact text it
//! was parsed from. A file is modelled as `leading₀ body₀ leading₁ body₁ … trailing`, where each
//! `leading` holds separator lines, blank lines and comment-only documents, and concatenating all
//! parts reproduces the original text.

mod patch;

pub(crate) use self::patch::patch;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

pub const SEPARATOR: &str = "---\n";

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub leading: String,
    pub body: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SplitFile {
    pub documents: Vec<Document>,
    pub trailing: String,
}

impl SplitFile {
    /// Reassemble the original text.
    pub fn render(&self) -> String {
        let mut buf = String::new();
        for doc in &self.documents {
            buf.push_str(&doc.leading);
            buf.push_str(&doc.body);
        }
        buf.push_str(&self.trailing);
        buf
    }
}

pub(crate) fn is_separator(line: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    let rest = match line.strip_prefix("---").or_else(|| line.strip_prefix("...")) {
        Some(rest) => rest,
        None => return false,
    };
    let rest = rest.trim_start();
    rest.is_empty() || (rest.starts_with('#') && rest.len() < line.len() - 3)
}

fn is_blank(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line.starts_with('%')
    })
}

pub fn split(text: &str) -> anyhow::Result<SplitFile> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    let mut separator = "";
    for line in text.split_inclusive('\n') {
        if is_separator(line) {
            segments.push((separator, &text[start..offset]));
            separator = line;
            start = offset + line.len();
        }
        offset += line.len();
    }
    segments.push((separator, &text[start..]));

    let mut file = SplitFile::default();
    let mut pending = String::new();
    for (index, (separator, content)) in segments.into_iter().enumerate() {
        pending.push_str(separator);

        let value = if is_blank(content) {
            Value::Null
        } else {
            serde_yaml::from_str::<Value>(content)
                .with_context(|| format!("parsing document {index}"))?
        };

        if value.is_null() {
            pending.push_str(content);
            continue;
        }

        // Comments above the first line of content stay with the document even when it is
        // re-serialized.
        let (comments, body) = content.split_at(comment_prefix_len(content));
        pending.push_str(comments);
        file.documents.push(Document {
            leading: std::mem::take(&mut pending),
            body: body.to_owned(),
            value,
        });
    }
    file.trailing = pending;

    Ok(file)
}

fn comment_prefix_len(content: &str) -> usize {
    content
        .split_inclusive('\n')
        .take_while(|line| is_blank(line))
        .map(str::len)
        .sum()
}

/// `text` without its separator lines.
pub(crate) fn without_separators(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !is_separator(line))
        .collect()
}

/// Parse a stream of documents, skipping empty ones.
pub fn parse_stream(text: &str) -> anyhow::Result<Vec<Value>> {
    Ok(split(text)?
        .documents
        .into_iter()
        .map(|doc| doc.value)
        .collect())
}

pub fn from_str<T>(s: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned,
{
    serde_yaml::from_str(s).map_err(Into::into)
}

pub fn to_string<T>(value: &T) -> anyhow::Result<String>
where
    T: serde::Serialize,
{
    serde_yaml::to_string(value).map_err(Into::into)
}

/// Append `text` to `buf`, making sure `buf` ends on a line boundary first.
pub(crate) fn push_line_aligned(buf: &mut String, text: &str) {
    if !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }
    buf.push_str(text);
}
