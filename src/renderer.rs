use std::fmt::{self, Write};

use crate::importer::ContentItem;

/// The line that separates documents inside a bundle.
pub const DELIMITER: &str = "* * *";

/// What a message line equal to [`DELIMITER`] is rewritten to, so message
/// bodies cannot cut a bundle in two.
const ESCAPED_DELIMITER: &str = r"\* \* \*";

/// Collapse a value onto one line before it is interpolated into a heading or
/// metadata line. A line break there could forge a delimiter or a title.
pub(crate) fn single_line(value: &str) -> String {
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append the Markdown for a single content item.
///
/// Every non-empty fragment ends with a blank line, so the fragments of one
/// message can be concatenated as they are. Unsupported items write nothing;
/// reporting them is up to the caller.
pub fn render_item<W: Write>(out: &mut W, item: &ContentItem) -> fmt::Result {
    match item {
        ContentItem::Text(text) if text.is_empty() => Ok(()),
        ContentItem::Text(text) => {
            for (i, line) in text.split('\n').enumerate() {
                if i > 0 {
                    out.write_char('\n')?;
                }
                if line.trim_end_matches('\r') == DELIMITER {
                    out.write_str(ESCAPED_DELIMITER)?;
                } else {
                    out.write_str(line)?;
                }
            }
            out.write_str("\n\n")
        }
        ContentItem::ImageAssetPointer {
            pointer,
            size_bytes,
            width,
            height,
        } => {
            writeln!(out, "Image: {}", single_line(pointer))?;
            writeln!(out, "Size: {size_bytes} bytes")?;
            writeln!(out, "Dimensions: {width}x{height}")?;
            writeln!(out)
        }
        ContentItem::Unsupported { .. } => Ok(()),
    }
}
