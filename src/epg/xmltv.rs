//! Quick-XML based XMLTV channel parser
//!
//! Streams the document and keeps only channel identity: the `id`
//! attribute, the first `<display-name>` and the `<icon src>`. Programme
//! elements are skipped.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

use crate::errors::{SourceError, SourceResult};
use crate::models::EpgEntry;

/// Parse every `<channel>` element of an XMLTV document
pub fn parse_channels(content: &str, source_id: i64) -> SourceResult<Vec<EpgEntry>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ChannelBuilder> = None;
    let mut in_display_name = false;
    let mut current_text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"channel" => {
                    let attrs = parse_attributes(e);
                    current = Some(ChannelBuilder::new(attrs.get("id").cloned()));
                }
                b"display-name" if current.is_some() => {
                    in_display_name = true;
                    current_text.clear();
                }
                b"icon" => {
                    if let Some(channel) = current.as_mut() {
                        channel.set_icon(parse_attributes(e).get("src"));
                    }
                }
                _ => {}
            },

            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"icon" => {
                    if let Some(channel) = current.as_mut() {
                        channel.set_icon(parse_attributes(e).get("src"));
                    }
                }
                // <channel id="x"/> carries an id and nothing else
                b"channel" => {
                    let channel = ChannelBuilder::new(parse_attributes(e).get("id").cloned());
                    if let Some(entry) = channel.build(source_id) {
                        entries.push(entry);
                    }
                }
                _ => {}
            },

            Ok(Event::Text(e)) => {
                if in_display_name {
                    let text = e.unescape().map_err(|e| {
                        SourceError::parse_error("xmltv", format!("Invalid text: {e}"))
                    })?;
                    current_text.push_str(&text);
                }
            }

            Ok(Event::CData(e)) => {
                if in_display_name {
                    let text = std::str::from_utf8(&e).map_err(|e| {
                        SourceError::parse_error("xmltv", format!("Invalid UTF-8 in CDATA: {e}"))
                    })?;
                    current_text.push_str(text);
                }
            }

            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"display-name" => {
                    if let Some(channel) = current.as_mut() {
                        channel.add_display_name(&current_text);
                    }
                    in_display_name = false;
                    current_text.clear();
                }
                b"channel" => {
                    if let Some(entry) = current.take().and_then(|c| c.build(source_id)) {
                        entries.push(entry);
                    }
                }
                _ => {}
            },

            Ok(Event::Eof) => break,

            Err(e) => {
                return Err(SourceError::parse_error(
                    "xmltv",
                    format!("XML parsing error at position {}: {e}", reader.buffer_position()),
                ));
            }

            _ => {}
        }
    }

    Ok(entries)
}

struct ChannelBuilder {
    id: Option<String>,
    name: Option<String>,
    logo: Option<String>,
}

impl ChannelBuilder {
    fn new(id: Option<String>) -> Self {
        Self {
            id: id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()),
            name: None,
            logo: None,
        }
    }

    fn add_display_name(&mut self, text: &str) {
        let text = text.trim();
        if self.name.is_none() && !text.is_empty() {
            self.name = Some(text.to_string());
        }
    }

    fn set_icon(&mut self, src: Option<&String>) {
        if let Some(src) = src.map(|s| s.trim()).filter(|s| !s.is_empty()) {
            self.logo = Some(src.to_string());
        }
    }

    /// Channels without an id are unusable and dropped
    fn build(self, source_id: i64) -> Option<EpgEntry> {
        let epg_id = self.id?;
        Some(EpgEntry {
            name: self.name.unwrap_or_else(|| epg_id.clone()),
            epg_id,
            logo: self.logo,
            source_id,
        })
    }
}

/// Parse XML attributes into a HashMap
fn parse_attributes(element: &BytesStart) -> HashMap<String, String> {
    let mut attrs = HashMap::new();

    for attr in element.attributes().flatten() {
        if let (Ok(key), Ok(value)) = (
            std::str::from_utf8(attr.key.as_ref()),
            attr.unescape_value(),
        ) {
            attrs.insert(key.to_string(), value.into_owned());
        }
    }
    attrs
}
