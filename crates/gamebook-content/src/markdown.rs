//! Markdown section text rendered to plain text.

use pulldown_cmark::{Event, Parser, TagEnd};

/// Renders `markdown` to plain text: inline markup is dropped, blocks are
/// separated by a blank line and list items start on their own line.
#[must_use]
pub fn to_plain_text(markdown: &str) -> String {
    let mut out = String::with_capacity(markdown.len());

    for event in Parser::new(markdown) {
        match event {
            Event::Text(text) | Event::Code(text) => out.push_str(&text),
            Event::SoftBreak => out.push(' '),
            Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::CodeBlock) => {
                out.push_str("\n\n");
            }
            Event::End(TagEnd::Item) => out.push('\n'),
            Event::Rule => out.push_str("\n\n"),
            _ => {}
        }
    }

    out.trim_end().to_owned()
}
