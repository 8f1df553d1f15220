//! Quote records and post formatting

use serde::{Deserialize, Deserializer};

use crate::error::UpstreamFetchError;

/// Quote as returned by the quote source, in the source language
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQuote {
    #[serde(default)]
    pub quote: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub year: Option<String>,
    #[serde(default)]
    pub school: Option<String>,
    #[serde(default)]
    pub philosopher: RawPhilosopher,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPhilosopher {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "wikiTitle")]
    pub wiki_title: Option<String>,
    #[serde(default)]
    pub school: Option<String>,
}

impl RawQuote {
    /// School to show: the philosopher's own, else the quote's
    pub fn school_text(&self) -> Option<&str> {
        non_blank(self.philosopher.school.as_deref()).or(non_blank(self.school.as_deref()))
    }

    /// Attribution name: the philosopher's name, else the wiki title
    pub fn attribution(&self) -> Option<&str> {
        non_blank(self.philosopher.name.as_deref())
            .or(non_blank(self.philosopher.wiki_title.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// Some records carry the year as a bare number
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A quote ready to publish, already in the target language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRecord {
    pub excerpt: String,
    pub attribution: String,
    /// Year, or the unknown-year sentinel
    pub year: String,
    /// Empty when the source has no school
    pub school: String,
}

impl QuoteRecord {
    /// Build a record from a raw quote and its translated texts
    ///
    /// # Errors
    ///
    /// Fails when the raw quote has no text or no attribution.
    pub fn from_raw(
        raw: &RawQuote,
        translated_excerpt: String,
        translated_school: Option<String>,
        unknown_year: &str,
    ) -> Result<Self, UpstreamFetchError> {
        if raw.quote.trim().is_empty() || translated_excerpt.trim().is_empty() {
            return Err(UpstreamFetchError::Quote("quote has no text".to_string()));
        }
        let attribution = raw
            .attribution()
            .ok_or_else(|| UpstreamFetchError::Quote("quote has no attribution".to_string()))?;

        Ok(Self {
            excerpt: translated_excerpt.trim().to_string(),
            attribution: attribution.to_string(),
            year: raw.year.clone().unwrap_or_else(|| unknown_year.to_string()),
            school: translated_school.unwrap_or_default().trim().to_string(),
        })
    }
}

/// Render a record as post text
///
/// `"{excerpt}\n\n— {attribution}, {year}, {school}"`, dropping the school
/// part when there is none.
pub fn format(record: &QuoteRecord) -> String {
    if record.school.is_empty() {
        format!("{}\n\n— {}, {}", record.excerpt, record.attribution, record.year)
    } else {
        format!(
            "{}\n\n— {}, {}, {}",
            record.excerpt, record.attribution, record.year, record.school
        )
    }
}
