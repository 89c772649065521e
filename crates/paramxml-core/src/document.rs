//! Resolved documents and their XML rendering.

use crate::ident::ParameterIdentifier;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};

pub const ROOT_ELEMENT: &str = "document";

const INDENT_WIDTH: usize = 4;

/// A converted source file: title plus ordered, currently empty, parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub parameters: Vec<(ParameterIdentifier, String)>,
}

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("xml write failed: {0}")]
    Write(#[from] quick_xml::Error),
    #[error("xml output is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Document {
    pub fn new(title: impl Into<String>, identifiers: Vec<ParameterIdentifier>) -> Self {
        Self {
            title: title.into(),
            parameters: identifiers
                .into_iter()
                .map(|id| (id, String::new()))
                .collect(),
        }
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &ParameterIdentifier> {
        self.parameters.iter().map(|(id, _)| id)
    }

    /// Render as
    ///
    /// ```text
    /// <document>
    ///     <name></name>
    /// </document>
    /// ```
    ///
    /// Elements are always closed explicitly, never `<name/>`. No XML declaration.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT_WIDTH);

        writer.write_event(Event::Start(BytesStart::new(ROOT_ELEMENT)))?;
        if self.parameters.is_empty() {
            writer.write_event(Event::Text(BytesText::new("")))?;
        }
        for (id, value) in &self.parameters {
            writer.write_event(Event::Start(BytesStart::new(id.as_str())))?;
            // A text event (even empty) keeps the closing tag on the same line.
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new(id.as_str())))?;
        }
        writer.write_event(Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

        Ok(String::from_utf8(writer.into_inner())?)
    }
}
