/// Source-text helpers shared by the parser adapters.
///
/// Both backends hand out some constructs only as raw text (attribute
/// groups, trait adaptations, string literals with their quotes), so the
/// normalisation lives here once instead of in each adapter.
use super::{Attribute, AttributeGroup, Comment, CommentKind, Loc, Point, TraitAdaptation, Visibility};

/// Maps byte offsets to zero-based row/column pairs.
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        let mut line_starts = vec![0];
        for (idx, byte) in content.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx as u32 + 1);
            }
        }
        Self { line_starts }
    }

    pub fn point(&self, offset: u32) -> Point {
        let row = self.line_starts.partition_point(|&start| start <= offset) - 1;
        Point::new(row as u32, offset - self.line_starts[row])
    }

    pub fn loc(&self, start: u32, end: u32) -> Loc {
        Loc::new(self.point(start), self.point(end))
    }
}

/// Build a [`Comment`] from raw comment text, dropping trailing line breaks.
///
/// Some grammars include the newline that terminates a `//` comment in the
/// token.  The end position is pulled back so that it points at the last
/// character of the comment itself.
pub fn make_comment(raw: &str, loc: Loc) -> Comment {
    let value = raw.trim_end_matches(['\r', '\n']);
    let mut end = loc.end;
    if value.len() != raw.len() {
        let last_line = value.rsplit('\n').next().unwrap_or(value);
        let rows = value.matches('\n').count() as u32;
        let column = if rows == 0 {
            loc.start.column + last_line.len() as u32
        } else {
            last_line.len() as u32
        };
        end = Point::new(loc.start.row + rows, column);
    }

    let kind = if value.starts_with("/**") {
        CommentKind::Doc
    } else if value.starts_with("/*") {
        CommentKind::Block
    } else {
        CommentKind::Line
    };

    Comment {
        kind,
        value: value.to_string(),
        loc: Loc::new(loc.start, end),
    }
}

/// Strip the quotes from a PHP string literal.
///
/// Escapes are resolved only for the quote character itself and `\\`;
/// that is enough for the identifiers and labels test discovery cares
/// about.  Heredoc/nowdoc and unrecognised forms are returned unchanged.
pub fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let Some(first) = raw.chars().next() else {
        return String::new();
    };
    if raw.len() < 2 || !(first == '\'' || first == '"') || !raw.ends_with(first) {
        return raw.to_string();
    }

    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(&next) = chars.peek()
            && (next == first || next == '\\')
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

/// Split `text` on `separator` at nesting depth zero, ignoring separators
/// inside quotes, parentheses and brackets.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ if c == separator && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Parse the text of one `#[…]` attribute group.
///
/// ```text
/// #[Test, DataProvider('additionProvider')]
/// #[\PHPUnit\Framework\Attributes\Group(name: 'slow')]
/// ```
pub fn parse_attribute_group(text: &str, loc: Option<Loc>) -> AttributeGroup {
    let inner = text
        .trim()
        .strip_prefix("#[")
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(text);

    let attributes = split_top_level(inner, ',')
        .into_iter()
        .filter_map(parse_attribute)
        .collect();

    AttributeGroup { attributes, loc }
}

fn parse_attribute(text: &str) -> Option<Attribute> {
    let text = text.trim();
    let (name, args) = match text.find('(') {
        Some(open) => {
            let args = text[open + 1..].strip_suffix(')').unwrap_or(&text[open + 1..]);
            (&text[..open], args)
        }
        None => (text, ""),
    };

    let name = name.trim().trim_start_matches('\\');
    if name.is_empty() {
        return None;
    }

    let arguments = split_top_level(args, ',')
        .into_iter()
        .map(|arg| unquote(strip_argument_name(arg.trim())))
        .collect();

    Some(Attribute {
        name: name.to_string(),
        arguments,
    })
}

/// `name: 'value'` → `'value'`.  A `::` (class constant) is not a name.
fn strip_argument_name(arg: &str) -> &str {
    let ident_len = arg
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(arg.len());
    let rest = &arg[ident_len..];
    if ident_len > 0 && rest.starts_with(':') && !rest.starts_with("::") {
        rest[1..].trim_start()
    } else {
        arg
    }
}

/// Parse one trait adaptation clause (without the trailing `;`).
///
/// ```text
/// A::foo insteadof B, C
/// A::foo as bar
/// foo as protected bar
/// foo as private
/// ```
pub fn parse_trait_adaptation(text: &str) -> Option<TraitAdaptation> {
    let text = text.trim().trim_end_matches(';').trim();
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let (reference, rest) = tokens.split_first()?;
    let keyword = rest.first()?.to_ascii_lowercase();

    let (trait_name, method) = match reference.split_once("::") {
        Some((t, m)) => (Some(t.trim_start_matches('\\').to_string()), m.to_string()),
        None => (None, reference.to_string()),
    };

    match keyword.as_str() {
        "insteadof" => {
            let insteadof = rest[1..]
                .join(" ")
                .split(',')
                .map(|s| s.trim().trim_start_matches('\\').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            Some(TraitAdaptation::Precedence {
                trait_name: trait_name?,
                method,
                insteadof,
            })
        }
        "as" => {
            let mut visibility = None;
            let mut alias = None;
            for token in &rest[1..] {
                match token.to_ascii_lowercase().as_str() {
                    "public" => visibility = Some(Visibility::Public),
                    "protected" => visibility = Some(Visibility::Protected),
                    "private" => visibility = Some(Visibility::Private),
                    _ => alias = Some(token.to_string()),
                }
            }
            Some(TraitAdaptation::Alias {
                trait_name,
                method,
                alias,
                visibility,
            })
        }
        _ => None,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
