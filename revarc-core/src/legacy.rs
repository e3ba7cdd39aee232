//! Metadata recovery for legacy revisions
//!
//! Legacy archive records carry no author, comment or date. Those values
//! live inside the document text itself and are read back through a
//! [`DocumentParser`].

use chrono::DateTime;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::record::RevisionMetadata;

/// Errors reported by a document parser
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParserError {
    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid date: {0:?}")]
    InvalidDate(String),

    #[error("Unexpected root element <{0}>")]
    UnexpectedRoot(String),
}

/// Extracts revision metadata from a full document text
pub trait DocumentParser {
    fn parse_metadata(&self, text: &str) -> Result<RevisionMetadata, ParserError>;
}

impl<F> DocumentParser for F
where
    F: Fn(&str) -> Result<RevisionMetadata, ParserError>,
{
    fn parse_metadata(&self, text: &str) -> Result<RevisionMetadata, ParserError> {
        self(text)
    }
}

/// Reads `<author>`, `<comment>` and `<date>` (Unix milliseconds) from the
/// direct children of the `<xwikidoc>` root of an XML document export.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDocumentParser;

const ROOT: &[u8] = b"xwikidoc";

fn check_root(name: &[u8]) -> Result<(), ParserError> {
    if name == ROOT {
        Ok(())
    } else {
        Err(ParserError::UnexpectedRoot(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Author,
    Comment,
    Date,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"author" => Some(Field::Author),
            b"comment" => Some(Field::Comment),
            b"date" => Some(Field::Date),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Fields {
    author: Option<String>,
    comment: Option<String>,
    date: Option<String>,
}

impl Fields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Author => &mut self.author,
            Field::Comment => &mut self.comment,
            Field::Date => &mut self.date,
        }
    }
}

impl DocumentParser for XmlDocumentParser {
    fn parse_metadata(&self, text: &str) -> Result<RevisionMetadata, ParserError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut fields = Fields::default();
        let mut depth = 0usize;
        let mut current: Option<Field> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    depth += 1;
                    if depth == 1 {
                        check_root(e.name().as_ref())?;
                    } else if depth == 2 {
                        current = Field::from_name(e.name().as_ref());
                        if let Some(field) = current {
                            fields.slot(field).get_or_insert_with(String::new);
                        }
                    }
                }
                Ok(Event::Empty(ref e)) => {
                    if depth == 0 {
                        check_root(e.name().as_ref())?;
                    } else if depth == 1 {
                        if let Some(field) = Field::from_name(e.name().as_ref()) {
                            fields.slot(field).get_or_insert_with(String::new);
                        }
                    }
                }
                Ok(Event::End(_)) => {
                    if depth == 2 {
                        current = None;
                    }
                    depth = depth.saturating_sub(1);
                }
                Ok(Event::Text(ref t)) => {
                    if let (2, Some(field)) = (depth, current) {
                        let value = t.unescape().map_err(|e| ParserError::Xml(e.to_string()))?;
                        fields.slot(field).get_or_insert_with(String::new).push_str(&value);
                    }
                }
                Ok(Event::CData(ref c)) => {
                    if let (2, Some(field)) = (depth, current) {
                        let value = String::from_utf8_lossy(c).into_owned();
                        fields.slot(field).get_or_insert_with(String::new).push_str(&value);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(ParserError::Xml(e.to_string())),
                _ => {}
            }
        }

        let raw_date = fields.date.ok_or(ParserError::MissingField("date"))?;
        let millis: i64 = raw_date
            .trim()
            .parse()
            .map_err(|_| ParserError::InvalidDate(raw_date.clone()))?;
        let date = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| ParserError::InvalidDate(raw_date.clone()))?;

        Ok(RevisionMetadata {
            author: fields.author.unwrap_or_default(),
            comment: fields.comment.unwrap_or_default(),
            date,
        })
    }
}
