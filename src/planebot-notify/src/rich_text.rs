//! Plain-text rendering of tracker rich-text descriptions.

use scraper::{ElementRef, Html, Node};

/// Convert an HTML description fragment to plain text.
///
/// - Text nodes are kept; entities are decoded by the parser.
/// - `p` and headings end with a blank line, `div`, `li` and `tr` with a
///   line break, `br` is a line break. List items start with `- `.
/// - Runs of whitespace inside a line collapse to one space, lines are
///   trimmed, and at most one blank line separates blocks.
/// - `script` and `style` content is dropped.
///
/// Empty input yields an empty string; input without markup comes back
/// with its whitespace normalized.
pub fn html_to_plain_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let document = Html::parse_fragment(html);
    let mut output = String::new();
    extract_text(document.root_element(), &mut output);

    clean_lines(&output)
}

fn extract_text(node: ElementRef, output: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => push_collapsed(output, text),
            Node::Element(elem) => {
                let Some(element) = ElementRef::wrap(child) else {
                    continue;
                };
                match elem.name() {
                    "script" | "style" | "noscript" => {}
                    "br" => output.push('\n'),
                    "p" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "blockquote" | "pre" => {
                        line_break(output);
                        extract_text(element, output);
                        line_break(output);
                        output.push('\n');
                    }
                    "li" => {
                        line_break(output);
                        output.push_str("- ");
                        extract_text(element, output);
                        line_break(output);
                    }
                    "div" | "tr" | "ul" | "ol" | "table" => {
                        line_break(output);
                        extract_text(element, output);
                        line_break(output);
                    }
                    _ => extract_text(element, output),
                }
            }
            _ => {}
        }
    }
}

/// End the current line unless it is already ended.
fn line_break(output: &mut String) {
    if !output.is_empty() && !output.ends_with('\n') {
        output.push('\n');
    }
}

fn push_collapsed(output: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_whitespace() {
            if !output.ends_with([' ', '\n']) && !output.is_empty() {
                output.push(' ');
            }
        } else {
            output.push(c);
        }
    }
}

fn clean_lines(text: &str) -> String {
    let mut result = String::new();
    let mut blank_run = 0;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                result.push('\n');
            }
        } else {
            blank_run = 0;
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}
