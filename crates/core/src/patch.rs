//! Character-level text patches, the storage format of page history.
//!
//! Every committed change stores the patch that turns the previous title and
//! content into the new ones. [`diff`] produces such a patch, [`apply`] replays
//! it, and [`Patch::encode`] / [`Patch::decode`] move it in and out of its
//! textual form:
//!
//! ```text
//! @@ -1,2 +1,8 @@
//!  Hi
//! + there
//! ```
//!
//! Each hunk header gives the source and target coordinates, followed by one
//! line per fragment: `' '` unchanged context, `'-'` deletion, `'+'`
//! insertion. Fragment text is percent-encoded so it never contains a raw
//! newline.

use std::fmt::{self, Write as _};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{Algorithm, ChangeTag, TextDiff};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Unchanged characters kept as context on either side of an edit.
pub const PATCH_MARGIN: usize = 4;

/// ASCII punctuation that is written verbatim in encoded fragment text.
const UNESCAPED_PUNCTUATION: &str = " ;,/?:@&=+$-_.!~*'()#";

static HUNK_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@$").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// What a fragment does to the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equal,
    Delete,
    Insert,
}

impl Op {
    fn prefix(self) -> char {
        match self {
            Self::Equal => ' ',
            Self::Delete => '-',
            Self::Insert => '+',
        }
    }
}

/// A run of text that is kept, removed, or added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub op: Op,
    pub text: String,
}

impl Fragment {
    pub fn new(op: Op, text: impl Into<String>) -> Self {
        Self {
            op,
            text: text.into(),
        }
    }

    fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Compute a cleaned-up edit script turning `base` into `target`.
///
/// Concatenating the `Equal` and `Delete` fragments gives back `base`;
/// concatenating the `Equal` and `Insert` fragments gives `target`.
pub fn diff_fragments(base: &str, target: &str) -> Vec<Fragment> {
    if base == target {
        if base.is_empty() {
            return Vec::new();
        }
        return vec![Fragment::new(Op::Equal, base)];
    }

    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_chars(base, target);

    let mut fragments: Vec<Fragment> = Vec::new();
    for change in diff.iter_all_changes() {
        let op = match change.tag() {
            ChangeTag::Equal => Op::Equal,
            ChangeTag::Delete => Op::Delete,
            ChangeTag::Insert => Op::Insert,
        };
        push_merged(&mut fragments, op, change.value());
    }

    cleanup_semantic(&mut fragments);
    fragments
}

fn push_merged(fragments: &mut Vec<Fragment>, op: Op, text: &str) {
    if text.is_empty() {
        return;
    }
    match fragments.last_mut() {
        Some(last) if last.op == op => last.text.push_str(text),
        _ => fragments.push(Fragment::new(op, text)),
    }
}

// ---------------------------------------------------------------------------
// Semantic cleanup
// ---------------------------------------------------------------------------

/// Remove short equalities that are dwarfed by the edits around them, then
/// slide the remaining edits onto natural word and line boundaries.
///
/// A raw character diff of two prose paragraphs is full of one-letter
/// "matches" that carry no meaning (`mouse` → `sofas` shares an `o` and an
/// `s`). Folding those into the surrounding edits gives a shorter script that
/// reads the way a person would describe the change.
pub fn cleanup_semantic(fragments: &mut Vec<Fragment>) {
    let mut changed = false;
    // Indices of equalities still under consideration.
    let mut equalities: Vec<usize> = Vec::new();
    // Char length of the most recent equality, if it may still be folded.
    let mut last_equality: Option<usize> = None;
    let (mut inserted_before, mut deleted_before) = (0usize, 0usize);
    let (mut inserted_after, mut deleted_after) = (0usize, 0usize);

    let mut pointer = 0;
    while pointer < fragments.len() {
        let len = fragments[pointer].char_len();
        match fragments[pointer].op {
            Op::Equal => {
                equalities.push(pointer);
                inserted_before = inserted_after;
                deleted_before = deleted_after;
                inserted_after = 0;
                deleted_after = 0;
                last_equality = Some(len);
            }
            op => {
                if op == Op::Insert {
                    inserted_after += len;
                } else {
                    deleted_after += len;
                }

                if let (Some(equality_len), Some(&at)) = (last_equality, equalities.last()) {
                    if equality_len <= inserted_before.max(deleted_before)
                        && equality_len <= inserted_after.max(deleted_after)
                    {
                        let text = fragments[at].text.clone();
                        fragments.insert(at, Fragment::new(Op::Delete, text));
                        fragments[at + 1].op = Op::Insert;

                        // Drop this equality and re-examine the one before it.
                        equalities.pop();
                        equalities.pop();
                        inserted_before = 0;
                        deleted_before = 0;
                        inserted_after = 0;
                        deleted_after = 0;
                        last_equality = None;
                        changed = true;

                        pointer = equalities.last().map_or(0, |&i| i + 1);
                        continue;
                    }
                }
            }
        }
        pointer += 1;
    }

    if changed {
        cleanup_merge(fragments);
    }
    cleanup_semantic_lossless(fragments);
}

/// Normalize an edit script: every run of edits between two equalities
/// becomes at most one deletion followed by one insertion, with any shared
/// prefix or suffix moved out into the neighbouring equalities.
pub fn cleanup_merge(fragments: &mut Vec<Fragment>) {
    let mut merged: Vec<Fragment> = Vec::with_capacity(fragments.len());
    let mut deleted = String::new();
    let mut inserted = String::new();
    let mut carry = String::new();

    for fragment in fragments.drain(..) {
        match fragment.op {
            Op::Delete => deleted.push_str(&fragment.text),
            Op::Insert => inserted.push_str(&fragment.text),
            Op::Equal => {
                flush_edits(&mut merged, &mut deleted, &mut inserted, &mut carry);
                carry.push_str(&fragment.text);
                push_equal(&mut merged, std::mem::take(&mut carry));
            }
        }
    }
    flush_edits(&mut merged, &mut deleted, &mut inserted, &mut carry);
    push_equal(&mut merged, carry);

    *fragments = merged;
}

fn flush_edits(
    merged: &mut Vec<Fragment>,
    deleted: &mut String,
    inserted: &mut String,
    carry: &mut String,
) {
    if !deleted.is_empty() && !inserted.is_empty() {
        let prefix = common_prefix_bytes(deleted, inserted);
        if prefix > 0 {
            push_equal(merged, deleted[..prefix].to_string());
            deleted.drain(..prefix);
            inserted.drain(..prefix);
        }

        let suffix = common_suffix_bytes(deleted, inserted);
        if suffix > 0 {
            let split = inserted.len() - suffix;
            carry.insert_str(0, &inserted[split..]);
            inserted.truncate(split);
            deleted.truncate(deleted.len() - suffix);
        }
    }

    if !deleted.is_empty() {
        merged.push(Fragment::new(Op::Delete, std::mem::take(deleted)));
    }
    if !inserted.is_empty() {
        merged.push(Fragment::new(Op::Insert, std::mem::take(inserted)));
    }
}

fn push_equal(merged: &mut Vec<Fragment>, text: String) {
    if text.is_empty() {
        return;
    }
    match merged.last_mut() {
        Some(last) if last.op == Op::Equal => last.text.push_str(&text),
        _ => merged.push(Fragment::new(Op::Equal, text)),
    }
}

/// Byte length of the longest common prefix, always on a char boundary.
fn common_prefix_bytes(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

/// Byte length of the longest common suffix, always on a char boundary.
fn common_suffix_bytes(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.len_utf8())
        .sum()
}

/// Slide single edits surrounded by equalities sideways so they start and
/// end on the most natural boundary (blank line, line break, whitespace,
/// punctuation). The text each side describes is unchanged.
fn cleanup_semantic_lossless(fragments: &mut Vec<Fragment>) {
    let mut pointer = 1;
    while pointer + 1 < fragments.len() {
        if fragments[pointer - 1].op != Op::Equal || fragments[pointer + 1].op != Op::Equal {
            pointer += 1;
            continue;
        }

        let mut before: Vec<char> = fragments[pointer - 1].text.chars().collect();
        let mut edit: Vec<char> = fragments[pointer].text.chars().collect();
        let mut after: Vec<char> = fragments[pointer + 1].text.chars().collect();

        // Shift the edit as far left as it will go.
        let shared = before
            .iter()
            .rev()
            .zip(edit.iter().rev())
            .take_while(|(x, y)| x == y)
            .count();
        if shared > 0 {
            let common: Vec<char> = edit[edit.len() - shared..].to_vec();
            before.truncate(before.len() - shared);
            edit.truncate(edit.len() - shared);
            edit.splice(0..0, common.iter().copied());
            after.splice(0..0, common);
        }

        // Then step right one character at a time, keeping the best split.
        let mut best = (before.clone(), edit.clone(), after.clone());
        let mut best_score = boundary_score(&before, &edit) + boundary_score(&edit, &after);
        while !edit.is_empty() && !after.is_empty() && edit[0] == after[0] {
            let c = edit.remove(0);
            before.push(c);
            edit.push(after.remove(0));
            let score = boundary_score(&before, &edit) + boundary_score(&edit, &after);
            if score >= best_score {
                best_score = score;
                best = (before.clone(), edit.clone(), after.clone());
            }
        }

        let best_before: String = best.0.into_iter().collect();
        if fragments[pointer - 1].text != best_before {
            let best_edit: String = best.1.into_iter().collect();
            let best_after: String = best.2.into_iter().collect();

            if best_before.is_empty() {
                fragments.remove(pointer - 1);
                pointer -= 1;
            } else {
                fragments[pointer - 1].text = best_before;
            }
            fragments[pointer].text = best_edit;
            if best_after.is_empty() {
                fragments.remove(pointer + 1);
                pointer = pointer.saturating_sub(1);
            } else {
                fragments[pointer + 1].text = best_after;
            }
        }
        pointer += 1;
    }
}

/// How good a split point between `one` and `two` is (higher is better).
fn boundary_score(one: &[char], two: &[char]) -> u32 {
    let (Some(&c1), Some(&c2)) = (one.last(), two.first()) else {
        // Edges of the text are the best boundaries of all.
        return 6;
    };

    let non_alnum1 = !c1.is_alphanumeric();
    let non_alnum2 = !c2.is_alphanumeric();
    let whitespace1 = non_alnum1 && c1.is_whitespace();
    let whitespace2 = non_alnum2 && c2.is_whitespace();
    let line_break1 = whitespace1 && (c1 == '\n' || c1 == '\r');
    let line_break2 = whitespace2 && (c2 == '\n' || c2 == '\r');
    let blank_line1 = line_break1 && (one.ends_with(&['\n', '\n']) || one.ends_with(&['\n', '\r', '\n']));
    let blank_line2 = line_break2
        && (two.starts_with(&['\n', '\n'])
            || two.starts_with(&['\n', '\r', '\n'])
            || two.starts_with(&['\r', '\n', '\n'])
            || two.starts_with(&['\r', '\n', '\r', '\n']));

    if blank_line1 || blank_line2 {
        5
    } else if line_break1 || line_break2 {
        4
    } else if non_alnum1 && !whitespace1 && whitespace2 {
        3
    } else if whitespace1 || whitespace2 {
        2
    } else if non_alnum1 || non_alnum2 {
        1
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Hunks and patches
// ---------------------------------------------------------------------------

/// One contiguous region of change, with surrounding context.
///
/// `start1`/`length1` locate the region in the source text, `start2`/`length2`
/// in the target text. Offsets and lengths count chars, not bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
    pub fragments: Vec<Fragment>,
}

impl Hunk {
    fn new(start1: usize, start2: usize) -> Self {
        Self {
            start1,
            start2,
            length1: 0,
            length2: 0,
            fragments: Vec::new(),
        }
    }

    fn push(&mut self, fragment: Fragment) {
        let len = fragment.char_len();
        match fragment.op {
            Op::Equal => {
                self.length1 += len;
                self.length2 += len;
            }
            Op::Delete => self.length1 += len,
            Op::Insert => self.length2 += len,
        }
        self.fragments.push(fragment);
    }

    /// The text this hunk expects to find.
    pub fn source_text(&self) -> String {
        self.fragments
            .iter()
            .filter(|f| f.op != Op::Insert)
            .map(|f| f.text.as_str())
            .collect()
    }

    /// The text this hunk leaves behind.
    pub fn target_text(&self) -> String {
        self.fragments
            .iter()
            .filter(|f| f.op != Op::Delete)
            .map(|f| f.text.as_str())
            .collect()
    }
}

/// An ordered list of hunks transforming one text into another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    hunks: Vec<Hunk>,
}

impl Patch {
    /// Group an edit script into hunks with [`PATCH_MARGIN`] chars of context.
    ///
    /// Equalities short enough to be covered by the context of both
    /// neighbouring edits stay inside a single hunk.
    pub fn from_fragments(fragments: &[Fragment]) -> Self {
        let mut hunks = Vec::new();
        let mut current: Option<Hunk> = None;
        let (mut pos1, mut pos2) = (0usize, 0usize);
        let last = fragments.len().saturating_sub(1);

        for (i, fragment) in fragments.iter().enumerate() {
            let len = fragment.char_len();
            match fragment.op {
                Op::Equal => {
                    if let Some(mut hunk) = current.take() {
                        if len <= 2 * PATCH_MARGIN && i != last {
                            hunk.push(fragment.clone());
                            current = Some(hunk);
                        } else {
                            let context: String =
                                fragment.text.chars().take(PATCH_MARGIN).collect();
                            hunk.push(Fragment::new(Op::Equal, context));
                            hunks.push(hunk);
                        }
                    }
                }
                Op::Delete | Op::Insert => {
                    let hunk = current.get_or_insert_with(|| {
                        let context = match i.checked_sub(1).map(|p| &fragments[p]) {
                            Some(prev) if prev.op == Op::Equal => tail_chars(&prev.text, PATCH_MARGIN),
                            _ => String::new(),
                        };
                        let n = context.chars().count();
                        let mut hunk = Hunk::new(pos1 - n, pos2 - n);
                        if n > 0 {
                            hunk.push(Fragment::new(Op::Equal, context));
                        }
                        hunk
                    });
                    hunk.push(fragment.clone());
                }
            }

            if fragment.op != Op::Insert {
                pos1 += len;
            }
            if fragment.op != Op::Delete {
                pos2 += len;
            }
        }

        if let Some(hunk) = current {
            hunks.push(hunk);
        }
        Self { hunks }
    }

    pub fn hunks(&self) -> &[Hunk] {
        &self.hunks
    }

    /// `true` when applying the patch leaves the text unchanged.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Apply the patch to `base`.
    ///
    /// Application is exact: each hunk's source text must sit at its target
    /// coordinate in the partially patched text. Anything else means the
    /// patch was computed against a different base.
    pub fn apply(&self, base: &str) -> Result<String, CoreError> {
        let mut text: Vec<char> = base.chars().collect();

        for hunk in &self.hunks {
            let expected: Vec<char> = hunk.source_text().chars().collect();
            let start = hunk.start2;
            let mismatch = || {
                CoreError::PatchApply(format!(
                    "hunk at char {} does not match the base text",
                    start.saturating_add(1)
                ))
            };
            let end = start.checked_add(expected.len()).ok_or_else(mismatch)?;

            if end > text.len() || text[start..end] != expected[..] {
                return Err(mismatch());
            }
            text.splice(start..end, hunk.target_text().chars());
        }

        Ok(text.into_iter().collect())
    }

    /// Serialize to the textual patch format.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for hunk in &self.hunks {
            let _ = writeln!(
                out,
                "@@ -{} +{} @@",
                coords(hunk.start1, hunk.length1),
                coords(hunk.start2, hunk.length2)
            );
            for fragment in &hunk.fragments {
                out.push(fragment.op.prefix());
                escape_into(&mut out, &fragment.text);
                out.push('\n');
            }
        }
        out
    }

    /// Parse the textual patch format.
    pub fn decode(text: &str) -> Result<Self, CoreError> {
        let mut hunks = Vec::new();
        let mut lines = text.split('\n').peekable();

        while let Some(line) = lines.next() {
            if line.is_empty() {
                continue;
            }
            let caps = HUNK_HEADER_RE
                .captures(line)
                .ok_or_else(|| CoreError::PatchApply(format!("invalid hunk header '{line}'")))?;
            let (start1, length1) = parse_coords(&caps[1], caps.get(2).map(|m| m.as_str()))?;
            let (start2, length2) = parse_coords(&caps[3], caps.get(4).map(|m| m.as_str()))?;

            let mut hunk = Hunk::new(start1, start2);
            while let Some(next) = lines.peek() {
                let mut chars = next.chars();
                let op = match chars.next() {
                    Some(' ') => Op::Equal,
                    Some('-') => Op::Delete,
                    Some('+') => Op::Insert,
                    Some('@') | None => break,
                    Some(other) => {
                        return Err(CoreError::PatchApply(format!(
                            "invalid fragment prefix '{other}'"
                        )))
                    }
                };
                hunk.push(Fragment::new(op, unescape(chars.as_str())?));
                lines.next();
            }

            if hunk.length1 != length1 || hunk.length2 != length2 {
                return Err(CoreError::PatchApply(format!(
                    "hunk declares {length1}/{length2} chars but carries {}/{}",
                    hunk.length1, hunk.length2
                )));
            }
            hunks.push(hunk);
        }

        Ok(Self { hunks })
    }

    /// Flatten into display hunks for the presentation layer.
    pub fn display(&self) -> Vec<DiffHunk> {
        self.hunks
            .iter()
            .map(|hunk| DiffHunk {
                start: hunk.start2 + 1,
                segments: hunk
                    .fragments
                    .iter()
                    .map(|f| DiffSegment {
                        kind: match f.op {
                            Op::Equal => ChangeKind::Unchanged,
                            Op::Delete => ChangeKind::Removed,
                            Op::Insert => ChangeKind::Added,
                        },
                        text: f.text.clone(),
                    })
                    .collect(),
            })
            .collect()
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn tail_chars(text: &str, n: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(n)).collect()
}

fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{length}", start + 1),
    }
}

fn parse_coords(start: &str, length: Option<&str>) -> Result<(usize, usize), CoreError> {
    let bad = || CoreError::PatchApply(format!("invalid hunk coordinates '{start}'"));
    let start: usize = start.parse().map_err(|_| bad())?;
    match length {
        None => Ok((start.checked_sub(1).ok_or_else(bad)?, 1)),
        Some("0") => Ok((start, 0)),
        Some(length) => {
            let length: usize = length.parse().map_err(|_| bad())?;
            Ok((start.checked_sub(1).ok_or_else(bad)?, length))
        }
    }
}

fn escape_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || UNESCAPED_PUNCTUATION.contains(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                let _ = write!(out, "%{byte:02X}");
            }
        }
    }
}

fn unescape(text: &str) -> Result<String, CoreError> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = text
                .get(i + 1..i + 3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| {
                    CoreError::PatchApply(format!("invalid escape sequence at byte {i}"))
                })?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out)
        .map_err(|_| CoreError::PatchApply("escaped text is not valid UTF-8".into()))
}

// ---------------------------------------------------------------------------
// Display types
// ---------------------------------------------------------------------------

/// The type of a segment in a rendered diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Unchanged,
}

/// A run of text in a rendered diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffSegment {
    pub kind: ChangeKind,
    pub text: String,
}

/// One hunk of a rendered diff; `start` is the 1-based char offset in the
/// resulting text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffHunk {
    pub start: usize,
    pub segments: Vec<DiffSegment>,
}

// ---------------------------------------------------------------------------
// Codec entry points
// ---------------------------------------------------------------------------

/// Patch turning `base` into `target`.
pub fn diff(base: &str, target: &str) -> Patch {
    Patch::from_fragments(&diff_fragments(base, target))
}

/// Apply `patch` to `base`.
pub fn apply(base: &str, patch: &Patch) -> Result<String, CoreError> {
    patch.apply(base)
}

/// Serialize a patch.
pub fn encode(patch: &Patch) -> String {
    patch.encode()
}

/// Parse a serialized patch.
pub fn decode(text: &str) -> Result<Patch, CoreError> {
    Patch::decode(text)
}

/// Decode `patch_text` and apply it to `base`; the history replay step.
pub fn apply_encoded(base: &str, patch_text: &str) -> Result<String, CoreError> {
    decode(patch_text)?.apply(base)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
