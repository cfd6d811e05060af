//! GitHub-flavoured markdown to Jira wiki markup.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag};

/// Renders a GFM document as Jira wiki markup.
///
/// Covers the constructs issue bodies actually use: headings, emphasis,
/// lists, links, images, code, quotes and tables. Raw HTML passes through.
#[must_use]
pub fn gfm_to_jira(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut writer = JiraWriter::default();
    for event in Parser::new_ext(markdown, options) {
        writer.event(event);
    }
    writer.out.trim_end().to_string()
}

#[derive(Default)]
struct JiraWriter<'a> {
    out: String,
    open: Vec<Tag<'a>>,
    /// Ordered flag of every enclosing list, outermost first.
    lists: Vec<bool>,
    in_table_head: bool,
    /// Depth of enclosing images, whose alt text is dropped.
    images: usize,
}

impl<'a> JiraWriter<'a> {
    fn event(&mut self, event: Event<'a>) {
        match event {
            Event::Start(tag) => {
                self.start(&tag);
                self.open.push(tag);
            }
            Event::End(_) => {
                if let Some(tag) = self.open.pop() {
                    self.end(&tag);
                }
            }
            Event::Text(text) if self.images == 0 => self.out.push_str(&text),
            Event::Code(code) => {
                self.out.push_str("{{");
                self.out.push_str(&code);
                self.out.push_str("}}");
            }
            Event::Html(html) | Event::InlineHtml(html) => self.out.push_str(&html),
            Event::SoftBreak | Event::HardBreak => self.out.push('\n'),
            Event::Rule => {
                self.line_start();
                self.out.push_str("----\n\n");
            }
            Event::TaskListMarker(done) => self.out.push_str(if done { "[x] " } else { "[ ] " }),
            _ => {}
        }
    }

    fn start(&mut self, tag: &Tag<'a>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.line_start();
                self.out.push_str(&format!("h{}. ", heading_number(*level)));
            }
            Tag::BlockQuote(_) => {
                self.line_start();
                self.out.push_str("{quote}\n");
            }
            Tag::CodeBlock(kind) => {
                self.line_start();
                match kind {
                    CodeBlockKind::Fenced(lang) if !lang.is_empty() => {
                        self.out.push_str(&format!("{{code:{lang}}}\n"));
                    }
                    _ => self.out.push_str("{code}\n"),
                }
            }
            Tag::List(first) => {
                self.line_start();
                self.lists.push(first.is_some());
            }
            Tag::Item => {
                self.line_start();
                let marker: String = self
                    .lists
                    .iter()
                    .map(|ordered| if *ordered { '#' } else { '*' })
                    .collect();
                self.out.push_str(&marker);
                self.out.push(' ');
            }
            Tag::TableHead => self.in_table_head = true,
            Tag::TableCell => self.out.push_str(if self.in_table_head { "||" } else { "|" }),
            Tag::Emphasis => self.out.push('_'),
            Tag::Strong => self.out.push('*'),
            Tag::Strikethrough => self.out.push('-'),
            Tag::Link { .. } => self.out.push('['),
            Tag::Image { dest_url, .. } => {
                if self.images == 0 {
                    self.out.push('!');
                    self.out.push_str(dest_url);
                    self.out.push('!');
                }
                self.images += 1;
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: &Tag<'a>) {
        match tag {
            Tag::Paragraph if self.inside_block_item() => self.line_start(),
            Tag::Paragraph => self.out.push_str("\n\n"),
            Tag::Heading { .. } => self.out.push_str("\n\n"),
            Tag::BlockQuote(_) => {
                self.trim_blank_lines();
                self.out.push_str("{quote}\n\n");
            }
            Tag::CodeBlock(_) => {
                self.line_start();
                self.out.push_str("{code}\n\n");
            }
            Tag::List(_) => {
                self.lists.pop();
                self.line_start();
                if self.lists.is_empty() {
                    self.out.push('\n');
                }
            }
            Tag::Item => self.line_start(),
            Tag::TableHead => {
                self.out.push_str("||\n");
                self.in_table_head = false;
            }
            Tag::TableRow => self.out.push_str("|\n"),
            Tag::Table(_) => self.out.push('\n'),
            Tag::Emphasis => self.out.push('_'),
            Tag::Strong => self.out.push('*'),
            Tag::Strikethrough => self.out.push('-'),
            Tag::Link { dest_url, .. } => {
                self.out.push('|');
                self.out.push_str(dest_url);
                self.out.push(']');
            }
            Tag::Image { .. } => self.images -= 1,
            _ => {}
        }
    }

    /// List items and table cells keep their paragraphs on one line.
    fn inside_block_item(&self) -> bool {
        self.open
            .iter()
            .any(|tag| matches!(tag, Tag::Item | Tag::TableCell))
    }

    fn line_start(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn trim_blank_lines(&mut self) {
        let kept = self.out.trim_end_matches('\n').len();
        self.out.truncate(kept);
        self.out.push('\n');
    }
}

fn heading_number(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_headings_and_emphasis() {
        assert_eq!(
            gfm_to_jira("# Crash\n\nSome *odd* and **bold** ~~old~~ text"),
            "h1. Crash\n\nSome _odd_ and *bold* -old- text"
        );
    }

    #[test]
    fn nests_list_markers() {
        assert_eq!(
            gfm_to_jira("- one\n    - two\n- three"),
            "* one\n** two\n* three"
        );
        assert_eq!(gfm_to_jira("1. first\n2. second"), "# first\n# second");
    }

    #[test]
    fn converts_links_and_code() {
        assert_eq!(
            gfm_to_jira("See [docs](https://example.com/a) and `cfg`"),
            "See [docs|https://example.com/a] and {{cfg}}"
        );
        assert_eq!(
            gfm_to_jira("```rust\nfn main() {}\n```"),
            "{code:rust}\nfn main() {}\n{code}"
        );
    }

    #[test]
    fn converts_tables() {
        assert_eq!(
            gfm_to_jira("| a | b |\n|---|---|\n| 1 | 2 |"),
            "||a||b||\n|1|2|"
        );
    }

    #[test]
    fn images_drop_alt_text() {
        assert_eq!(
            gfm_to_jira("![screenshot](https://example.com/s.png)"),
            "!https://example.com/s.png!"
        );
    }
}
