use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;

pub const SHELF_CODE_LEN: usize = 8;
pub const ISBN13_LEN: usize = 13;

/// How a completed scan is interpreted, decided purely by its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    ShelfCode,
    Isbn,
}

impl ScanKind {
    pub fn classify(code: &str) -> Result<Self, ValidationError> {
        match code.chars().count() {
            SHELF_CODE_LEN => Ok(ScanKind::ShelfCode),
            ISBN13_LEN => Ok(ScanKind::Isbn),
            len => Err(ValidationError::WrongLength { len }),
        }
    }
}

/// A shelf and row. `(0, 0)` is the "unknown" location the session starts at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ShelfLocation {
    pub shelf_id: u32,
    pub row_number: u32,
}

impl ShelfLocation {
    pub const UNKNOWN: ShelfLocation = ShelfLocation { shelf_id: 0, row_number: 0 };

    pub const fn new(shelf_id: u32, row_number: u32) -> Self {
        Self { shelf_id, row_number }
    }
}

impl fmt::Display for ShelfLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shelf {} row {}", self.shelf_id, self.row_number)
    }
}

/// `GET /shelf/{id}` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: u32,
    pub name: String,
    #[serde(rename = "rows_count")]
    pub row_count: u32,
}

/// Stored record returned by `POST /books/{isbn}`. Only the fields worth
/// logging are kept; everything is optional on the wire, `null` included.
/// The catalog sends `isbn` as a number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Book {
    #[serde(deserialize_with = "isbn_text")]
    pub isbn: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub author: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub publisher: String,
    #[serde(deserialize_with = "null_as_default")]
    pub published_date: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IsbnRepr {
    Text(String),
    Number(u64),
}

fn isbn_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<IsbnRepr>::deserialize(deserializer)? {
        Some(IsbnRepr::Text(s)) => s,
        // leading zeros are lost on the wire; ISBN-13s start with 978/979
        Some(IsbnRepr::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionRequest {
    pub isbn: String,
    pub shelf_id: u32,
    pub row_number: u32,
}

impl IngestionRequest {
    pub fn at(isbn: impl Into<String>, location: ShelfLocation) -> Self {
        Self {
            isbn: isbn.into(),
            shelf_id: location.shelf_id,
            row_number: location.row_number,
        }
    }
}
