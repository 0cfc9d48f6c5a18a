// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 promptflow contributors

//! Markdown segmentation
//!
//! Splits a dialect source into blocks (headings, list items, fenced code,
//! arrow lines and prose) and groups them into a preamble and one section
//! per `##` heading. Nothing here interprets commands.

use crate::errors::{PromptflowError, PromptflowResult};

/// One structural block of the source, with its 1-based starting line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading {
        level: usize,
        text: String,
        line: usize,
    },
    ListItem {
        text: String,
        line: usize,
    },
    Code {
        language: Option<String>,
        content: String,
        line: usize,
    },
    /// `-> {name}` line
    Arrow {
        text: String,
        line: usize,
    },
    /// Consecutive prose lines
    Paragraph {
        text: String,
        line: usize,
    },
}

impl Block {
    pub fn line(&self) -> usize {
        match self {
            Self::Heading { line, .. }
            | Self::ListItem { line, .. }
            | Self::Code { line, .. }
            | Self::Arrow { line, .. }
            | Self::Paragraph { line, .. } => *line,
        }
    }
}

/// A `##` section and the blocks under it
#[derive(Debug, Clone)]
pub struct Section {
    pub title: String,
    pub line: usize,
    pub blocks: Vec<Block>,
}

/// Segmented source
#[derive(Debug, Clone)]
pub struct Document {
    pub title: String,
    pub preamble: Vec<Block>,
    pub sections: Vec<Section>,
}

/// Split source text into blocks
pub fn parse_blocks(source: &str) -> PromptflowResult<Vec<Block>> {
    let mut blocks = Vec::new();
    let mut paragraph: Option<(Vec<&str>, usize)> = None;
    let mut lines = source.lines().enumerate().map(|(i, l)| (i + 1, l));

    fn flush(paragraph: &mut Option<(Vec<&str>, usize)>, blocks: &mut Vec<Block>) {
        if let Some((lines, line)) = paragraph.take() {
            blocks.push(Block::Paragraph {
                text: lines.join("\n"),
                line,
            });
        }
    }

    while let Some((number, raw)) = lines.next() {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            flush(&mut paragraph, &mut blocks);
            continue;
        }

        if let Some(fence) = fence_of(trimmed) {
            flush(&mut paragraph, &mut blocks);
            let language = trimmed[fence.len()..].trim();
            let language = (!language.is_empty()).then(|| language.to_string());

            let mut content = Vec::new();
            let mut closed = false;
            for (_, code_line) in lines.by_ref() {
                if code_line.trim() == fence {
                    closed = true;
                    break;
                }
                content.push(code_line);
            }

            if !closed {
                return Err(PromptflowError::syntax(number, "Code block is not closed"));
            }

            blocks.push(Block::Code {
                language,
                content: content.join("\n"),
                line: number,
            });
            continue;
        }

        if let Some((level, text)) = heading_of(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Heading {
                level,
                text: text.to_string(),
                line: number,
            });
            continue;
        }

        if trimmed.starts_with("->") {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::Arrow {
                text: trimmed.to_string(),
                line: number,
            });
            continue;
        }

        if let Some(item) = list_item_of(trimmed) {
            flush(&mut paragraph, &mut blocks);
            blocks.push(Block::ListItem {
                text: item.trim().to_string(),
                line: number,
            });
            continue;
        }

        match paragraph.as_mut() {
            Some((text, _)) => text.push(trimmed),
            None => paragraph = Some((vec![trimmed], number)),
        }
    }

    flush(&mut paragraph, &mut blocks);
    Ok(blocks)
}

/// Group blocks into title, preamble and `##` sections
pub fn segment(source: &str) -> PromptflowResult<Document> {
    let blocks = parse_blocks(source)?;
    let mut blocks = blocks.into_iter();

    let title = match blocks.next() {
        Some(Block::Heading { level: 1, text, .. }) => text,
        Some(other) => {
            return Err(PromptflowError::syntax_with_help(
                other.line(),
                "Pipeline must start with a level-1 heading",
                "Start the document with `# Title`",
            ))
        }
        None => {
            return Err(PromptflowError::syntax(1, "Pipeline source is empty"));
        }
    };

    let mut preamble = Vec::new();
    let mut sections: Vec<Section> = Vec::new();

    for block in blocks {
        match block {
            Block::Heading { level: 1, line, .. } => {
                return Err(PromptflowError::syntax(
                    line,
                    "Pipeline can have only one level-1 heading",
                ));
            }
            Block::Heading {
                level: 2,
                text,
                line,
            } => sections.push(Section {
                title: text,
                line,
                blocks: Vec::new(),
            }),
            // Deeper headings are prose within the current section
            Block::Heading { text, line, .. } => {
                push_block(&mut sections, &mut preamble, Block::Paragraph { text, line })
            }
            other => push_block(&mut sections, &mut preamble, other),
        }
    }

    Ok(Document {
        title,
        preamble,
        sections,
    })
}

fn push_block(sections: &mut [Section], preamble: &mut Vec<Block>, block: Block) {
    match sections.last_mut() {
        Some(section) => section.blocks.push(block),
        None => preamble.push(block),
    }
}

fn fence_of(line: &str) -> Option<&'static str> {
    if line.starts_with("```") {
        Some("```")
    } else if line.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

fn heading_of(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim()))
}

fn list_item_of(line: &str) -> Option<&str> {
    line.strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("+ "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"# Sample

A short description.
Still the description.

- PROMPTBOOK VERSION 1.0.0
- INPUT PARAMETER {topic}

## Write

- EXECUTE PROMPT TEMPLATE

```markdown
Write about {topic}
- not a list item
```

-> {article}
"#;

    #[test]
    fn test_parse_blocks() {
        let blocks = parse_blocks(SOURCE).unwrap();
        assert_eq!(
            blocks[0],
            Block::Heading {
                level: 1,
                text: "Sample".into(),
                line: 1
            }
        );
        assert_eq!(
            blocks[1],
            Block::Paragraph {
                text: "A short description.\nStill the description.".into(),
                line: 3
            }
        );
        assert!(matches!(&blocks[2], Block::ListItem { text, line: 6 } if text == "PROMPTBOOK VERSION 1.0.0"));
        assert!(matches!(
            &blocks[6],
            Block::Code { language: Some(lang), content, line: 13 }
                if lang == "markdown" && content == "Write about {topic}\n- not a list item"
        ));
        assert!(matches!(&blocks[7], Block::Arrow { text, line: 18 } if text == "-> {article}"));
    }

    #[test]
    fn test_segment() {
        let document = segment(SOURCE).unwrap();
        assert_eq!(document.title, "Sample");
        assert_eq!(document.preamble.len(), 3);
        assert_eq!(document.sections.len(), 1);
        assert_eq!(document.sections[0].title, "Write");
        assert_eq!(document.sections[0].line, 9);
        assert_eq!(document.sections[0].blocks.len(), 3);
    }

    #[test]
    fn test_unclosed_code_block() {
        let err = parse_blocks("# T\n\n```js\nconst a = 1;\n").unwrap_err();
        assert!(matches!(err, PromptflowError::Syntax { line: 3, .. }));
    }

    #[test]
    fn test_missing_title() {
        let err = segment("- PROMPTBOOK VERSION 1.0.0\n").unwrap_err();
        assert!(matches!(err, PromptflowError::Syntax { line: 1, .. }));

        let err = segment("# One\n\n# Two\n").unwrap_err();
        assert!(matches!(err, PromptflowError::Syntax { line: 3, .. }));
    }
}
