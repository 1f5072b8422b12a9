//! Streaming reader for `<urlset>` documents
//!
//! Both manifests share one shape: a list of `<url>` blocks with a `<loc>`,
//! an optional `<lastmod>`, and (in the image manifest) any number of
//! `<image:image>` children. Elements are matched by local name so the
//! namespace prefix a site chooses does not matter.

use super::DiscoveryError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// One `<url>` element as it appears in the document
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct UrlBlock {
    pub loc: Option<String>,
    pub lastmod: Option<String>,
    pub images: Vec<ImageBlock>,
}

/// One `<image:image>` element inside a `<url>`
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ImageBlock {
    pub loc: Option<String>,
    pub title: Option<String>,
    pub caption: Option<String>,
}

/// Reads every `<url>` block of `xml` in document order
///
/// `source` is the manifest URL, used only for error reporting.
pub(crate) fn parse_url_blocks(source: &str, xml: &str) -> Result<Vec<UrlBlock>, DiscoveryError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let xml_error = |message: String| DiscoveryError::Xml {
        url: source.to_string(),
        message,
    };

    let mut blocks = Vec::new();
    let mut current: Option<UrlBlock> = None;
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_vec();
                match name.as_slice() {
                    b"url" => current = Some(UrlBlock::default()),
                    b"image" => {
                        if let Some(block) = current.as_mut() {
                            block.images.push(ImageBlock::default());
                        }
                    }
                    _ => {}
                }
                stack.push(name);
                text.clear();
            }
            Ok(Event::Text(e)) => {
                let unescaped = e.unescape().map_err(|e| xml_error(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else {
                    return Err(xml_error("unbalanced closing tag".to_string()));
                };
                let parent = stack.last().map(Vec::as_slice);
                let value = std::mem::take(&mut text).trim().to_string();

                if name.as_slice() == b"url" {
                    if let Some(block) = current.take() {
                        blocks.push(block);
                    }
                } else if let Some(block) = current.as_mut() {
                    match (name.as_slice(), parent) {
                        (b"loc", Some(b"url")) => block.loc = non_empty(value),
                        (b"lastmod", Some(b"url")) => block.lastmod = non_empty(value),
                        (field, Some(b"image")) => {
                            if let Some(image) = block.images.last_mut() {
                                match field {
                                    b"loc" => image.loc = non_empty(value),
                                    b"title" => image.title = non_empty(value),
                                    b"caption" => image.caption = non_empty(value),
                                    _ => {}
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(blocks)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
