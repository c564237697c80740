use std::fs::File;
use std::io::Read;
use std::path::Path;

use roxmltree::{Document, Node};
use zip::ZipArchive;

use crate::error::ExtractionError;

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const BODY_PART: &str = "word/document.xml";

/// Join the text of every paragraph in the document body with newlines.
pub fn extract_docx(path: &Path) -> Result<String, ExtractionError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let mut xml = String::new();
    archive.by_name(BODY_PART)?.read_to_string(&mut xml)?;

    let document = Document::parse(&xml)?;
    let paragraphs = document
        .descendants()
        .filter(|node| is_word(node, "p"))
        .map(paragraph_text)
        .collect::<Vec<_>>();

    Ok(paragraphs.join("\n"))
}

fn is_word(node: &Node, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(WORD_NS)
}

/// Text owned by `paragraph` itself. Runs of nested paragraphs (text boxes)
/// belong to those paragraphs and are rendered on their own line.
fn paragraph_text(paragraph: Node) -> String {
    let mut text = String::new();
    let owned = paragraph
        .descendants()
        .filter(|node| enclosing_paragraph(node) == Some(paragraph));
    for node in owned {
        if is_word(&node, "t") {
            text.push_str(node.text().unwrap_or_default());
        } else if is_word(&node, "tab") {
            text.push('\t');
        } else if is_word(&node, "br") || is_word(&node, "cr") {
            text.push('\n');
        }
    }
    text
}

fn enclosing_paragraph<'a, 'input>(node: &Node<'a, 'input>) -> Option<Node<'a, 'input>> {
    node.ancestors().skip(1).find(|ancestor| is_word(ancestor, "p"))
}
