//! Splitting of a `Key: value` header block from the text that follows it.
//!
//! Used for both piped cron output and the DATA section of an SMTP session.
//! This is intentionally much looser than RFC 5322: no encoded words, no
//! structured fields, just lines up to the first blank one.

/// Header fields and body lines of a mail-shaped text.
#[derive(Debug, Default, PartialEq)]
pub struct HeaderBlock {
    /// Header fields in input order, names as written
    pub fields: Vec<(String, String)>,
    /// Lines after the header block, terminators removed
    pub body: Vec<String>,
}

impl HeaderBlock {
    /// Split `text` into header fields and body lines.
    ///
    /// The header block ends at the first empty line, which is dropped. If
    /// the first line is not a header the whole text is body. A non-header
    /// line inside the block ends the block and becomes the first body line.
    pub fn parse(text: &str) -> Self {
        let mut block = HeaderBlock::default();
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(|c: char| c == ' ' || c == '\t') {
                if let Some((_, value)) = block.fields.last_mut() {
                    let folded = line.trim();
                    if !folded.is_empty() {
                        if !value.is_empty() {
                            value.push(' ');
                        }
                        value.push_str(folded);
                    }
                    continue;
                }
            }

            match split_field(line) {
                Some((name, value)) => block.fields.push((name, value)),
                None => {
                    block.body.push(line.to_string());
                    break;
                }
            }
        }

        block.body.extend(lines.map(str::to_string));
        block
    }

    /// First value of the named field, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body lines joined with `\n`.
    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }
}

/// Split a `Key: value` line on its first colon.
///
/// The key must be non-empty and contain no whitespace once trimmed.
fn split_field(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();

    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }

    Some((name.to_string(), value.trim().to_string()))
}
