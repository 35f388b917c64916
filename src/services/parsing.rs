use crate::models::book::{BookTagMap, Tag};
use crate::utils::text::{normalize_tag, strip_code_fence};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("tag {element} for {title:?} is not a string, response was {object}")]
    MalformedTag {
        title: String,
        element: Value,
        object: Value,
    },
}

/// A shape violation that was skipped rather than failing the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    InvalidJson(String),
    NotAnObject,
    NotAnArray { title: String },
    EmptyTags { title: String },
    UnknownTagId { title: String, id: i64 },
    UnknownTitle { title: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::InvalidJson(e) => write!(f, "response is not valid JSON: {}", e),
            ParseWarning::NotAnObject => write!(f, "response is not a JSON object"),
            ParseWarning::NotAnArray { title } => write!(f, "tags for {:?} are not an array", title),
            ParseWarning::EmptyTags { title } => write!(f, "no tags for {:?}", title),
            ParseWarning::UnknownTagId { title, id } => {
                write!(f, "unknown tag id {} for {:?}", id, title)
            }
            ParseWarning::UnknownTitle { title } => {
                write!(f, "{:?} was not part of the batch", title)
            }
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedTags {
    pub tags: BookTagMap,
    pub warnings: Vec<ParseWarning>,
}

impl ParsedTags {
    fn warn(&mut self, warning: ParseWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }
}

/// Turns the model's answer into a title to tags map.
///
/// Without a vocabulary every tag must be a string. With one, integer tags are
/// looked up by id and replaced by the tag name.
#[derive(Debug, Default, Clone)]
pub struct ResponseParser {
    vocabulary: Option<HashMap<i64, String>>,
}

impl ResponseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vocabulary(tags: &[Tag]) -> Self {
        Self {
            vocabulary: Some(tags.iter().map(|tag| (tag.id, tag.name.clone())).collect()),
        }
    }

    pub fn parse(&self, raw: &str) -> Result<ParsedTags, ParseError> {
        let mut parsed = ParsedTags::default();

        // An undecodable answer yields an empty result, not an error.
        let object = match serde_json::from_str::<Value>(strip_code_fence(raw)) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                parsed.warn(ParseWarning::NotAnObject);
                return Ok(parsed);
            }
            Err(e) => {
                parsed.warn(ParseWarning::InvalidJson(e.to_string()));
                return Ok(parsed);
            }
        };

        for (title, value) in &object {
            let elements = match value {
                Value::Array(elements) => elements,
                _ => {
                    parsed.warn(ParseWarning::NotAnArray { title: title.clone() });
                    continue;
                }
            };
            if elements.is_empty() {
                parsed.warn(ParseWarning::EmptyTags { title: title.clone() });
                continue;
            }

            let mut tags = Vec::with_capacity(elements.len());
            for element in elements {
                if let Some(tag) = self.resolve(title, element, &object, &mut parsed)? {
                    tags.push(tag);
                }
            }
            if !tags.is_empty() {
                parsed.tags.insert(title.clone(), tags);
            }
        }

        Ok(parsed)
    }

    fn resolve(
        &self,
        title: &str,
        element: &Value,
        object: &Map<String, Value>,
        parsed: &mut ParsedTags,
    ) -> Result<Option<String>, ParseError> {
        match (element, &self.vocabulary) {
            (Value::String(tag), _) => Ok(Some(normalize_tag(tag))),
            (Value::Number(number), Some(vocabulary)) if number.is_i64() => {
                let id = number.as_i64().unwrap_or_default();
                match vocabulary.get(&id) {
                    Some(name) => Ok(Some(normalize_tag(name))),
                    None => {
                        parsed.warn(ParseWarning::UnknownTagId {
                            title: title.to_string(),
                            id,
                        });
                        Ok(None)
                    }
                }
            }
            _ => Err(ParseError::MalformedTag {
                title: title.to_string(),
                element: element.clone(),
                object: Value::Object(object.clone()),
            }),
        }
    }
}

pub fn parse_tags(raw: &str) -> Result<ParsedTags, ParseError> {
    ResponseParser::new().parse(raw)
}
