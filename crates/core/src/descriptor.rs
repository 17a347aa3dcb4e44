use std::{borrow::Cow, io, path::Path};

use serde_json::{Map, Value};
use tokio::fs;

use crate::error::ParseError;

/// File holding a token's descriptor inside its directory.
pub const DESCRIPTOR_FILE: &str = "data.json";

/// One token's metadata record, as written by the contributor.
///
/// Fields are kept as raw JSON so that the schema validator can report
/// missing fields and wrong types instead of failing deserialization.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenDescriptor {
    fields: Map<String, Value>,
}

impl TokenDescriptor {
    /// Parses a JSON5 document (comments and trailing commas allowed).
    pub fn from_json5(text: &str) -> Result<Self, ParseError> {
        let value: Value = json5::from_str(&widen_big_integers(text))
            .map_err(|e| ParseError::Syntax(e.to_string()))?;
        Self::try_from(value)
    }

    /// Reads `data.json` from a token directory.
    pub async fn load(dir: &Path) -> Result<Self, ParseError> {
        let path = dir.join(DESCRIPTOR_FILE);
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ParseError::NotFound {
                    dir: dir_name(dir),
                });
            }
            Err(e) => return Err(ParseError::Io(e)),
        };

        Self::from_json5(&text)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

}

impl TryFrom<Value> for TokenDescriptor {
    type Error = ParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(ParseError::NotAnObject),
        }
    }
}

/// Rewrites decimal integer literals beyond `i64` as floats.
///
/// The JSON5 parser rejects such literals outright; as floats they parse and
/// fail the schema's integer checks instead, like any other bad value.
fn widen_big_integers(text: &str) -> Cow<'_, str> {
    let bytes = text.as_bytes();
    let mut widened = String::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += if bytes[i] == b'\\' { 2 } else { 1 };
                }
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = find_from(bytes, i, b"\n");
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = find_from(bytes, i + 2, b"*/") + 2;
            }
            b if b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'.') => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'$' | b'.'))
                {
                    i += 1;
                }
                let word = &text[start..i];
                if word.bytes().all(|b| b.is_ascii_digit()) && word.parse::<i64>().is_err() {
                    widened.push_str(&text[copied..i]);
                    widened.push_str(".0");
                    copied = i;
                }
            }
            _ => i += 1,
        }
    }

    if copied == 0 {
        Cow::Borrowed(text)
    } else {
        widened.push_str(&text[copied..]);
        Cow::Owned(widened)
    }
}

/// Index of the next `needle` at or after `from`, or the end of `haystack`.
fn find_from(haystack: &[u8], from: usize, needle: &[u8]) -> usize {
    haystack[from.min(haystack.len())..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map_or(haystack.len(), |pos| from + pos)
}

/// Last path component, used as the token's display name.
pub fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_relaxed_json() {
        let descriptor = TokenDescriptor::from_json5(
            r#"{
                // wrapped USD example
                chainId: 143,
                "address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "name": "USD Example",
                "symbol": "USDX",
                "decimals": 6,
            }"#,
        )
        .unwrap();

        assert_eq!(descriptor.get("chainId"), Some(&json!(143)));
        assert_eq!(descriptor.get("symbol"), Some(&json!("USDX")));
        assert_eq!(descriptor.get("decimals").and_then(Value::as_i64), Some(6));
        assert!(!descriptor.contains("extensions"));
    }

    #[test]
    fn rejects_non_object_documents() {
        let err = TokenDescriptor::from_json5("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, ParseError::NotAnObject));
    }

    #[test]
    fn reports_syntax_errors() {
        let err = TokenDescriptor::from_json5("{ name: ").unwrap_err();
        assert!(matches!(err, ParseError::Syntax(_)));
        assert!(err.to_string().starts_with("Invalid JSON5 in data.json: "));
    }

    #[test]
    fn oversized_integers_parse_as_numbers() {
        let descriptor =
            TokenDescriptor::from_json5("{ chainId: 143, decimals: 99999999999999999999 }").unwrap();

        let decimals = descriptor.get("decimals").unwrap();
        assert!(decimals.is_f64());
        assert_eq!(decimals.as_i64(), None);
        assert_eq!(descriptor.get("chainId"), Some(&json!(143)));
    }

    #[test]
    fn widening_skips_strings_comments_and_keys() {
        let text = r#"{
            // 99999999999999999999
            name: "99999999999999999999 'quoted'",
            key99999999999999999999: 1, /* 99999999999999999999 */
            big: -99999999999999999999,
        }"#;
        let expected = text.replace("big: -99999999999999999999", "big: -99999999999999999999.0");
        assert_eq!(widen_big_integers(text), expected);
        assert!(matches!(widen_big_integers("{ decimals: 6 }"), Cow::Borrowed(_)));
    }

    #[tokio::test]
    async fn missing_file_names_the_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("USDX");
        std::fs::create_dir(&dir).unwrap();

        let err = TokenDescriptor::load(&dir).await.unwrap_err();
        assert_eq!(err.to_string(), "data.json not found in USDX/ directory");
    }
}
