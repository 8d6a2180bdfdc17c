//! Targeted edits of a document's source text.
//!
//! The block structure of a document is scanned into spans, and the differences between the value
//! the text parsed to and the modified value become edits at those spans. Text outside the changed
//! nodes, comments included, is kept as it was. Flow collections, block scalars and scalars
//! spanning several lines are opaque to the scanner and are replaced whole when they change.
//!
//! Anchors, aliases, tags, complex keys and tab indentation are not modelled: [`patch`] gives up
//! on them. Every patched text is parsed again and must produce the modified value.

use std::{fmt::Write as _, ops::Range};

use serde_yaml::{Mapping, Value};

/// Rewrite `text`, which parsed to `original`, so that it parses to `modified`.
///
/// Returns `None` when the change cannot be expressed as edits of the existing text.
pub(crate) fn patch(text: &str, original: &Mapping, modified: &Mapping) -> Option<String> {
    let mut text = text.to_owned();
    if !text.ends_with('\n') {
        text.push('\n');
    }

    let scanner = Scanner::new(&text)?;
    let Node::Mapping { indent, entries } = scanner.document()? else {
        return None;
    };

    let mut patcher = Patcher {
        text: &text,
        edits: Vec::new(),
    };
    patcher.mapping(indent, &entries, original, modified)?;
    let patched = patcher.apply()?;

    let reparsed = serde_yaml::from_str::<Value>(&patched).ok()?;
    (reparsed.as_mapping() == Some(modified)).then_some(patched)
}

#[derive(Debug)]
enum Node {
    /// A scalar on a single line, without its comment.
    Scalar(Range<usize>),
    /// Flow collections, block scalars and multi-line scalars.
    Opaque(Range<usize>),
    /// Nothing after the `:` or `-`.
    Empty,
    Mapping { indent: usize, entries: Vec<Entry> },
    Sequence { indent: usize, items: Vec<Item> },
}

#[derive(Debug)]
struct Entry {
    key: Value,
    /// Start of the entry's line, or of the key when it shares the line with a `-`.
    start: usize,
    compact: bool,
    /// Just past the `:`.
    colon: usize,
    /// End of the entry's last line, before the line break.
    end: usize,
    /// Start of the line following the entry.
    next: usize,
    value: Node,
}

#[derive(Debug)]
struct Item {
    /// Start of the item's line, or of the `-` when it shares the line with another one.
    start: usize,
    compact: bool,
    dash: usize,
    end: usize,
    next: usize,
    value: Node,
}

#[derive(Debug, Clone, Copy)]
struct Line {
    start: usize,
    /// End of the line's text, before the line break.
    end: usize,
    next: usize,
    indent: usize,
    blank: bool,
    /// Neither blank nor a comment.
    content: bool,
}

struct Scanner<'a> {
    text: &'a str,
    lines: Vec<Line>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Option<Self> {
        let mut lines = Vec::new();
        let mut start = 0;
        for raw in text.split_inclusive('\n') {
            let next = start + raw.len();
            let line = raw.trim_end_matches(['\n', '\r']);
            let trimmed = line.trim_start_matches(' ');
            let blank = trimmed.trim().is_empty();
            let content = !blank && !trimmed.starts_with('#');
            if content && trimmed.starts_with('\t') {
                return None;
            }
            lines.push(Line {
                start,
                end: start + line.len(),
                next,
                indent: line.len() - trimmed.len(),
                blank,
                content,
            });
            start = next;
        }
        Some(Scanner { text, lines })
    }

    /// Line `i` from byte column `col`.
    fn rest(&self, i: usize, col: usize) -> &'a str {
        let line = self.lines[i];
        self.text.get(line.start + col..line.end).unwrap_or_default()
    }

    fn next_content(&self, from: usize) -> Option<usize> {
        (from..self.lines.len()).find(|&i| self.lines[i].content)
    }

    fn document(&self) -> Option<Node> {
        let first = self.next_content(0)?;
        let (node, last) = self.block(first, self.lines[first].indent)?;
        self.next_content(last + 1).is_none().then_some(node)
    }

    /// A block collection whose first entry starts at column `col` of line `i`.
    /// Returns the node and the index of its last line.
    fn block(&self, i: usize, col: usize) -> Option<(Node, usize)> {
        if is_item(self.rest(i, col)) {
            self.sequence(i, col)
        } else {
            self.mapping(i, col)
        }
    }

    fn mapping(&self, first: usize, indent: usize) -> Option<(Node, usize)> {
        let mut entries = Vec::new();
        let mut i = first;
        let last = loop {
            let line = self.lines[i];
            let (key, colon) = parse_key(self.rest(i, indent))?;
            let (value, last) = self.value(i, indent + colon, indent, true)?;
            let compact = line.indent != indent;
            entries.push(Entry {
                key,
                start: if compact { line.start + indent } else { line.start },
                compact,
                colon: line.start + indent + colon,
                end: self.lines[last].end,
                next: self.lines[last].next,
                value,
            });

            match self.next_content(last + 1) {
                Some(next)
                    if self.lines[next].indent == indent && !is_item(self.rest(next, indent)) =>
                {
                    i = next
                }
                Some(next) if self.lines[next].indent > indent => return None,
                _ => break last,
            }
        };
        Some((Node::Mapping { indent, entries }, last))
    }

    fn sequence(&self, first: usize, indent: usize) -> Option<(Node, usize)> {
        let mut items = Vec::new();
        let mut i = first;
        let last = loop {
            let line = self.lines[i];
            let after_dash = self.rest(i, indent + 1);
            let col = indent + 1 + (after_dash.len() - after_dash.trim_start_matches(' ').len());
            let rest = self.rest(i, col);

            let (value, last) = if is_item(rest) {
                self.sequence(i, col)?
            } else if parse_key(rest).is_some() {
                self.mapping(i, col)?
            } else {
                self.value(i, indent + 1, indent, false)?
            };
            let compact = line.indent != indent;
            items.push(Item {
                start: if compact { line.start + indent } else { line.start },
                compact,
                dash: line.start + indent,
                end: self.lines[last].end,
                next: self.lines[last].next,
                value,
            });

            match self.next_content(last + 1) {
                Some(next)
                    if self.lines[next].indent == indent && is_item(self.rest(next, indent)) =>
                {
                    i = next
                }
                Some(next) if self.lines[next].indent > indent => return None,
                _ => break last,
            }
        };
        Some((Node::Sequence { indent, items }, last))
    }

    /// The value starting at column `col` of line `i`, inside a collection at `indent`.
    /// A mapping value may be a sequence at the mapping's own indentation.
    fn value(
        &self,
        i: usize,
        col: usize,
        indent: usize,
        in_mapping: bool,
    ) -> Option<(Node, usize)> {
        let rest = self.rest(i, col);
        let content = strip_comment(rest);

        if content.is_empty() {
            return match self.next_content(i + 1) {
                Some(next)
                    if self.lines[next].indent > indent
                        || (in_mapping
                            && self.lines[next].indent == indent
                            && is_item(self.rest(next, indent))) =>
                {
                    self.block(next, self.lines[next].indent)
                }
                _ => Some((Node::Empty, i)),
            };
        }

        if content.starts_with(['&', '*', '!', '?', '%', '@', '`']) {
            return None;
        }

        let start = self.lines[i].start + col + (rest.len() - rest.trim_start().len());
        let last = self.continuation(i, indent, content.starts_with(['|', '>']));
        let node = if last > i {
            Node::Opaque(start..self.lines[last].end)
        } else if content.starts_with(['|', '>', '[', '{']) {
            Node::Opaque(start..start + content.len())
        } else {
            Node::Scalar(start..start + content.len())
        };
        Some((node, last))
    }

    /// The last line of a value starting on line `i`, extended over the lines indented past
    /// `indent` that follow it. Comment lines only belong to block scalars.
    fn continuation(&self, i: usize, indent: usize, block_scalar: bool) -> usize {
        let mut last = i;
        for (j, line) in self.lines.iter().enumerate().skip(i + 1) {
            if line.blank || (!line.content && !block_scalar) {
                continue;
            }
            if line.indent <= indent {
                break;
            }
            last = j;
        }
        last
    }
}

fn is_item(s: &str) -> bool {
    s == "-" || s.starts_with("- ")
}

/// Index of the quote closing the quoted scalar at the start of `s`.
fn closing_quote(s: &str, quote: char) -> Option<usize> {
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' if quote == '"' => {
                chars.next();
            }
            c if c == quote => {
                // '' is an escaped quote in single quoted scalars
                if quote == '\'' && s[i + 1..].starts_with('\'') {
                    chars.next();
                    continue;
                }
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

/// `s` trimmed and without its trailing comment.
fn strip_comment(s: &str) -> &str {
    let s = s.trim();
    let from = match s.chars().next() {
        Some(quote @ ('"' | '\'')) => closing_quote(s, quote).map_or(0, |end| end + 1),
        _ => 0,
    };
    let comment = s[from..]
        .match_indices('#')
        .map(|(i, _)| from + i)
        .find(|&i| i == 0 || s[..i].ends_with([' ', '\t']));
    match comment {
        Some(i) => s[..i].trim_end(),
        None => s,
    }
}

/// The key at the start of `s` and the offset just past its `:`.
fn parse_key(s: &str) -> Option<(Value, usize)> {
    let token_end = match s.chars().next()? {
        quote @ ('"' | '\'') => closing_quote(s, quote)? + 1,
        '-' | '?' | ':' | ',' | '[' | ']' | '{' | '}' | '#' | '&' | '*' | '!' | '|' | '>' | '%'
        | '@' | '`' => return None,
        _ => {
            let mut from = 0;
            loop {
                let i = from + s[from..].find(':')?;
                if s[..i].contains(" #") {
                    return None;
                }
                let after = &s[i + 1..];
                if after.is_empty() || after.starts_with([' ', '\t']) {
                    break i;
                }
                from = i + 1;
            }
        }
    };

    let colon = token_end + (s[token_end..].len() - s[token_end..].trim_start_matches(' ').len());
    let after = s[colon..].strip_prefix(':')?;
    if !(after.is_empty() || after.starts_with([' ', '\t'])) {
        return None;
    }

    let token = s[..token_end].trim_end();
    if token == "<<" {
        return None;
    }
    let key = serde_yaml::from_str::<Value>(token).ok()?;
    match key {
        Value::Mapping(_) | Value::Sequence(_) | Value::Tagged(_) => None,
        key => Some((key, colon + 1)),
    }
}

struct Edit {
    range: Range<usize>,
    text: String,
}

struct Patcher<'a> {
    text: &'a str,
    edits: Vec<Edit>,
}

impl Patcher<'_> {
    fn edit(&mut self, range: Range<usize>, text: impl Into<String>) {
        self.edits.push(Edit {
            range,
            text: text.into(),
        });
    }

    /// Edit the text of `node` from `old` to `new`. Leaves no edits behind when it cannot.
    fn node(&mut self, node: &Node, old: &Value, new: &Value) -> Option<()> {
        if old == new {
            return Some(());
        }
        let mark = self.edits.len();
        let edited = self.node_inner(node, old, new);
        if edited.is_none() {
            self.edits.truncate(mark);
        }
        edited
    }

    fn node_inner(&mut self, node: &Node, old: &Value, new: &Value) -> Option<()> {
        match (node, old, new) {
            (Node::Mapping { indent, entries }, Value::Mapping(old), Value::Mapping(new)) => {
                self.mapping(*indent, entries, old, new)
            }
            (Node::Sequence { indent, items }, Value::Sequence(old), Value::Sequence(new)) => {
                self.sequence(*indent, items, old, new)
            }
            (Node::Scalar(range) | Node::Opaque(range), _, _) => {
                let text = inline(&self.text[range.clone()], new)?;
                self.edit(range.clone(), text);
                Some(())
            }
            _ => None,
        }
    }

    fn mapping(
        &mut self,
        indent: usize,
        entries: &[Entry],
        old: &Mapping,
        new: &Mapping,
    ) -> Option<()> {
        if entries.len() != old.len() || !entries.iter().zip(old.keys()).all(|(e, k)| e.key == *k)
        {
            return None;
        }
        let kept_old = old.keys().filter(|key| new.contains_key(*key));
        let kept_new = new.keys().filter(|key| old.contains_key(*key));
        if !kept_old.eq(kept_new) {
            return None;
        }

        for (entry, (key, value)) in entries.iter().zip(old) {
            match new.get(key) {
                Some(new_value) => {
                    if self.node(&entry.value, value, new_value).is_none() {
                        let text = entry_value(indent, new_value)?;
                        self.edit(entry.colon..entry.end, text);
                    }
                }
                None if entry.compact => return None,
                None => self.edit(entry.start..entry.next, ""),
            }
        }

        // Added keys go in front of the next kept key, or after the last entry.
        let mut pending = String::new();
        for (key, value) in new {
            match entries.iter().find(|entry| entry.key == *key) {
                None => pending.push_str(&new_entry(indent, key, value)?),
                Some(entry) if !pending.is_empty() => {
                    if entry.compact {
                        return None;
                    }
                    self.edit(entry.start..entry.start, std::mem::take(&mut pending));
                }
                Some(_) => {}
            }
        }
        if !pending.is_empty() {
            let last = entries.last()?;
            self.edit(last.next..last.next, pending);
        }
        Some(())
    }

    fn sequence(&mut self, indent: usize, items: &[Item], old: &[Value], new: &[Value]) -> Option<()> {
        if items.len() != old.len() {
            return None;
        }

        for ((item, old), new) in items.iter().zip(old).zip(new) {
            if self.node(&item.value, old, new).is_none() {
                self.edit(item.dash..item.end, sequence_item(indent, new)?);
            }
        }

        let kept = old.len().min(new.len());
        if kept < items.len() {
            let first = &items[kept];
            if kept == 0 || first.compact {
                return None;
            }
            self.edit(first.start..items.last()?.next, "");
        }

        if kept < new.len() {
            let last = items.last()?;
            let pad = " ".repeat(indent);
            let mut text = String::new();
            for value in &new[kept..] {
                let _ = writeln!(text, "{pad}{}", sequence_item(indent, value)?);
            }
            self.edit(last.next..last.next, text);
        }
        Some(())
    }

    fn apply(mut self) -> Option<String> {
        self.edits
            .sort_by_key(|edit| (edit.range.start, edit.range.end));
        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;
        for edit in &self.edits {
            if edit.range.start < cursor {
                return None;
            }
            out.push_str(&self.text[cursor..edit.range.start]);
            out.push_str(&edit.text);
            cursor = edit.range.end;
        }
        out.push_str(&self.text[cursor..]);
        Some(out)
    }
}

/// Non-empty collections, which render in block style.
fn is_block(value: &Value) -> bool {
    match value {
        Value::Mapping(mapping) => !mapping.is_empty(),
        Value::Sequence(sequence) => !sequence.is_empty(),
        _ => false,
    }
}

fn render(value: &Value) -> Option<String> {
    let text = serde_yaml::to_string(value).ok()?;
    Some(text.trim_end_matches('\n').to_owned())
}

/// `text` with every line after the first indented by `pad` spaces.
fn hang(text: &str, pad: usize) -> String {
    text.lines()
        .collect::<Vec<_>>()
        .join(&format!("\n{}", " ".repeat(pad)))
}

/// `value` on a single line in place of the scalar `original`, keeping its quoting style.
fn inline(original: &str, value: &Value) -> Option<String> {
    if is_block(value) {
        return None;
    }
    if let Value::String(s) = value {
        if !s.contains(['\n', '\r']) {
            if original.starts_with('"') {
                return Some(double_quoted(s));
            }
            if original.starts_with('\'') {
                return Some(format!("'{}'", s.replace('\'', "''")));
            }
        }
    }
    let text = render(value)?;
    (!text.contains('\n')).then_some(text)
}

fn double_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// The text following the `:` of a key at column `indent` holding `value`.
fn entry_value(indent: usize, value: &Value) -> Option<String> {
    let text = render(value)?;
    Some(if is_block(value) {
        format!("\n{}{}", " ".repeat(indent + 2), hang(&text, indent + 2))
    } else {
        format!(" {}", hang(&text, indent))
    })
}

/// Whole lines adding `key: value` to a mapping at column `indent`.
fn new_entry(indent: usize, key: &Value, value: &Value) -> Option<String> {
    let mut mapping = Mapping::new();
    mapping.insert(key.clone(), value.clone());
    let text = render(&Value::Mapping(mapping))?;
    let pad = " ".repeat(indent);
    Some(text.lines().map(|line| format!("{pad}{line}\n")).collect())
}

/// An item of a sequence at column `indent`, starting at its `-`.
fn sequence_item(indent: usize, value: &Value) -> Option<String> {
    Some(format!("- {}", hang(&render(value)?, indent + 2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(text: &str) -> Mapping {
        serde_yaml::from_str(text).unwrap()
    }

    /// Patch `text` with `f` applied to its value.
    fn patched(text: &str, f: impl FnOnce(&mut Mapping)) -> Option<String> {
        let original = mapping(text);
        let mut modified = original.clone();
        f(&mut modified);
        patch(text, &original, &modified)
    }

    fn get<'a>(root: &'a mut Mapping, path: &[&str]) -> &'a mut Value {
        let (first, rest) = path.split_first().unwrap();
        rest.iter()
            .fold(root.get_mut(*first).unwrap(), |value, key| {
                value.get_mut(*key).unwrap()
            })
    }

    const WORKLOAD: &str = "\
kind: Deployment # workload kind
spec:
  # scale here
  replicas: 3
  template:
    spec:
      containers:
        - name: web
          image: \"nginx:1.25\"
";

    #[test]
    fn changed_scalars_keep_their_surroundings() {
        let text = patched(WORKLOAD, |root| {
            root.insert("kind".into(), "StatefulSet".into());
        })
        .unwrap();
        assert_eq!(text, WORKLOAD.replace("Deployment", "StatefulSet"));

        let text = patched("a: 1\n  # about a\nb: 2\n", |root| {
            root.insert("a".into(), 2.into());
        })
        .unwrap();
        assert_eq!(text, "a: 2\n  # about a\nb: 2\n");
    }

    #[test]
    fn quoting_is_kept() {
        let text = patched(WORKLOAD, |root| {
            let containers = get(root, &["spec", "template", "spec", "containers"]);
            containers[0]["image"] = "nginx:1.26".into();
        })
        .unwrap();
        assert_eq!(text, WORKLOAD.replace("nginx:1.25", "nginx:1.26"));
    }

    #[test]
    fn added_keys() {
        let text = patched("metadata:\n  name: web # name\nspec: {}\n", |root| {
            let labels = mapping("app: web\n");
            get(root, &["metadata"])
                .as_mapping_mut()
                .unwrap()
                .insert("labels".into(), Value::Mapping(labels));
        })
        .unwrap();
        assert_eq!(
            text,
            "metadata:\n  name: web # name\n  labels:\n    app: web\nspec: {}\n"
        );

        let text = patched("kind: A # a\n", |root| {
            root.insert("metadata".into(), Value::Mapping(mapping("name: a\n")));
        })
        .unwrap();
        assert_eq!(text, "kind: A # a\nmetadata:\n  name: a\n");
    }

    #[test]
    fn added_keys_before_kept_ones() {
        let text = patched("b: 2 # two\n", |root| {
            let mut reordered = Mapping::new();
            reordered.insert("a".into(), 1.into());
            reordered.insert("b".into(), 2.into());
            *root = reordered;
        })
        .unwrap();
        assert_eq!(text, "a: 1\nb: 2 # two\n");
    }

    #[test]
    fn removed_keys() {
        let text = patched("a: 1\nb:\n  c: 2\n# about c\nc: 3 # three\n", |root| {
            root.shift_remove("b");
        })
        .unwrap();
        assert_eq!(text, "a: 1\n# about c\nc: 3 # three\n");
    }

    #[test]
    fn empty_and_flow_values_become_blocks() {
        let text = patched("metadata:\n  labels:\nkind: A\n", |root| {
            *get(root, &["metadata", "labels"]) = Value::Mapping(mapping("a: b\n"));
        })
        .unwrap();
        assert_eq!(text, "metadata:\n  labels:\n    a: b\nkind: A\n");

        let text = patched("metadata: {} # none\n", |root| {
            *get(root, &["metadata"]) = Value::Mapping(mapping("a: b\n"));
        })
        .unwrap();
        assert_eq!(text, "metadata:\n  a: b\n");
    }

    #[test]
    fn blocks_become_scalars() {
        let text = patched("spec:\n  a: 1 # x\nkind: A\n", |root| {
            root.insert("spec".into(), "none".into());
        })
        .unwrap();
        assert_eq!(text, "spec: none\nkind: A\n");
    }

    #[test]
    fn sequences() {
        let text = patched("args:\n- one # first\n", |root| {
            get(root, &["args"])
                .as_sequence_mut()
                .unwrap()
                .push("two".into());
        })
        .unwrap();
        assert_eq!(text, "args:\n- one # first\n- two\n");

        let text = patched("args:\n  - one\n  - two # second\n  - three\n", |root| {
            get(root, &["args"]).as_sequence_mut().unwrap().truncate(1);
        })
        .unwrap();
        assert_eq!(text, "args:\n  - one\n");

        let text = patched("ports:\n- port: 80 # http\n  name: http\n", |root| {
            get(root, &["ports"])[0]["port"] = 8080.into();
        })
        .unwrap();
        assert_eq!(text, "ports:\n- port: 8080 # http\n  name: http\n");
    }

    #[test]
    fn missing_final_newline() {
        let text = patched("kind: A", |root| {
            root.insert("kind".into(), "B".into());
        })
        .unwrap();
        assert_eq!(text, "kind: B\n");
    }

    #[test]
    fn unsupported_documents() {
        for text in ["a: &x 1\nb: *x\n", "{a: 1}\n", "? a\n: 1\n"] {
            let original = mapping(text);
            let mut modified = original.clone();
            modified.insert("c".into(), 2.into());
            assert_eq!(patch(text, &original, &modified), None, "{text}");
        }
    }
}
