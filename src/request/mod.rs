//! Request construction.
//!
//! Turns a [`RequestConfig`](crate::RequestConfig) plus the current message
//! context into a [`PreparedRequest`] ready for the transport.
//!
//! # Overview
//!
//! - [`Method`]: the five recognized verbs
//! - [`RequestBuilder`]: URL, headers (user then auth) and body
//! - [`BodyDescriptor`]: raw, urlencoded or multipart body shapes
//! - [`encode_www_form_param`]: strict form-urlencoding
//!
//! A URL that evaluates to nothing yields [`BuildOutcome::Skip`] rather than an
//! error: there is simply no request to make for this message.

mod body;
mod builder;
mod form;

use std::fmt;
use std::str::FromStr;

use reqwest::header::HeaderMap;
use tracing::warn;

pub use body::BodyDescriptor;
pub use builder::RequestBuilder;
pub use form::encode_www_form_param;

use crate::error::ConfigError;

/// Recognized HTTP methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// DELETE
    Delete,
    /// GET
    Get,
    /// PATCH
    Patch,
    /// POST
    Post,
    /// PUT
    Put,
}

impl Method {
    /// All methods, in the order they are listed to users.
    pub const ALL: [Self; 5] = [Self::Delete, Self::Get, Self::Patch, Self::Post, Self::Put];

    /// Upper-case verb.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Patch => "PATCH",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    /// Comma-separated list of the accepted verbs.
    #[must_use]
    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether a body is built for this method.
    #[must_use]
    pub fn carries_body(self) -> bool {
        self != Self::Get
    }
}

impl FromStr for Method {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::InvalidMethod {
                method: s.to_string(),
            })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Delete => Self::DELETE,
            Method::Get => Self::GET,
            Method::Patch => Self::PATCH,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
        }
    }
}

/// A request ready to hand to the transport.
#[derive(Debug)]
pub struct PreparedRequest {
    /// Verb.
    pub method: Method,
    /// Evaluated, non-empty URL.
    pub url: String,
    /// Final headers (lower-cased names, auth applied).
    pub headers: HeaderMap,
    /// Encoded body.
    pub body: RequestBody,
}

/// Encoded request body.
#[derive(Debug, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Text body (raw or urlencoded).
    Text(String),
    /// Multipart body; the boundary header is added at send time.
    Multipart(MultipartBody),
}

/// Parts of a multipart body.
#[derive(Debug, Default)]
pub struct MultipartBody {
    /// Parts in append order.
    pub parts: Vec<MultipartPart>,
}

/// A single multipart part.
#[derive(Debug)]
pub struct MultipartPart {
    /// Field name.
    pub name: String,
    /// Part content.
    pub content: PartContent,
}

/// Content of a multipart part.
pub enum PartContent {
    /// Plain text field.
    Text(String),
    /// File field.
    File {
        /// File bytes.
        bytes: Vec<u8>,
        /// File name sent with the part.
        filename: String,
        /// Declared MIME type.
        content_type: Option<String>,
    },
}

impl fmt::Debug for PartContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::File {
                bytes,
                filename,
                content_type,
            } => f
                .debug_struct("File")
                .field("len", &bytes.len())
                .field("filename", filename)
                .field("content_type", content_type)
                .finish(),
        }
    }
}

impl MultipartBody {
    /// Appends a text part.
    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parts.push(MultipartPart {
            name: name.into(),
            content: PartContent::Text(value.into()),
        });
    }

    /// Appends a file part.
    pub fn file(
        &mut self,
        name: impl Into<String>,
        bytes: Vec<u8>,
        filename: impl Into<String>,
        content_type: Option<String>,
    ) {
        self.parts.push(MultipartPart {
            name: name.into(),
            content: PartContent::File {
                bytes,
                filename: filename.into(),
                content_type,
            },
        });
    }

    /// Converts into a reqwest form.
    ///
    /// A part with an unparseable MIME type is sent without one.
    #[must_use]
    pub fn into_form(self) -> reqwest::multipart::Form {
        use reqwest::multipart::{Form, Part};

        self.parts
            .into_iter()
            .fold(Form::new(), |form, part| match part.content {
                PartContent::Text(text) => form.text(part.name, text),
                PartContent::File {
                    bytes,
                    filename,
                    content_type,
                } => {
                    let file_part = match content_type {
                        Some(mime) => Part::bytes(bytes.clone())
                            .file_name(filename.clone())
                            .mime_str(&mime)
                            .unwrap_or_else(|e| {
                                warn!(
                                    part = %part.name,
                                    mime = %mime,
                                    error = %e,
                                    "invalid part content type, sending without it"
                                );
                                Part::bytes(bytes).file_name(filename)
                            }),
                        None => Part::bytes(bytes).file_name(filename),
                    };
                    form.part(part.name, file_part)
                }
            })
    }
}

/// Result of building a request.
#[derive(Debug)]
pub enum BuildOutcome {
    /// Send this request.
    Ready(PreparedRequest),
    /// The URL evaluated to nothing; end without a request.
    Skip,
}
