//! Flat XML field access
//!
//! WeChat callback and payment bodies are a single `<xml>` root with text
//! children. [`read_fields`] collects those children into a name → text map
//! and [`Fields`] decodes typed values from it by tag name.

use std::collections::BTreeMap;
use std::str::FromStr;

use xml::reader::{EventReader, XmlEvent};

use crate::error::WechatError;

/// Read the direct children of the root element.
///
/// Text and CDATA sections are concatenated; children nested deeper than
/// one level are skipped.
pub fn read_fields(body: &[u8]) -> Result<Fields, WechatError> {
    let mut fields = BTreeMap::new();
    let mut depth = 0usize;
    let mut current: Option<(String, String)> = None;

    for event in EventReader::new(body) {
        match event.map_err(|e| WechatError::Xml(e.to_string()))? {
            XmlEvent::StartElement { name, .. } => {
                depth += 1;
                if depth == 2 {
                    current = Some((name.local_name, String::new()));
                }
            }
            XmlEvent::Characters(text) | XmlEvent::CData(text) | XmlEvent::Whitespace(text) => {
                if depth == 2 {
                    if let Some((_, value)) = current.as_mut() {
                        value.push_str(&text);
                    }
                }
            }
            XmlEvent::EndElement { .. } => {
                if depth == 2 {
                    if let Some((name, value)) = current.take() {
                        fields.insert(name, value);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            _ => {}
        }
    }

    Ok(Fields(fields))
}

/// Wrap `text` in a CDATA section, splitting any embedded `]]>`.
pub fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

/// Escape `text` for use as element content.
pub fn escape_text(text: &str) -> String {
    xml::escape::escape_str_pcdata(text).into_owned()
}

/// Text fields of a flat XML document keyed by element name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields(BTreeMap<String, String>);

impl Fields {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Field text, empty when absent.
    pub fn string(&self, name: &str) -> String {
        self.get(name).unwrap_or_default().to_string()
    }

    /// Field text, `None` when absent or empty.
    pub fn opt_string(&self, name: &str) -> Option<String> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Required field text.
    pub fn required(&self, name: &str) -> Result<&str, WechatError> {
        self.get(name).ok_or_else(|| WechatError::InvalidField {
            name: name.to_string(),
            value: "<missing>".to_string(),
        })
    }

    /// Parse a field, `None` when absent or empty.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, WechatError> {
        match self.get(name).map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| WechatError::InvalidField {
                name: name.to_string(),
                value: raw.to_string(),
            }),
        }
    }

    /// Parse a field, zero-like default when absent or empty.
    pub fn parse_or_default<T: FromStr + Default>(&self, name: &str) -> Result<T, WechatError> {
        Ok(self.parse(name)?.unwrap_or_default())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_fields_cdata_and_text() {
        let body = b"<xml>\n<ToUserName><![CDATA[gh_123]]></ToUserName>\n<CreateTime>1348831860</CreateTime>\n<Empty></Empty>\n</xml>";
        let fields = read_fields(body).unwrap();

        assert_eq!(fields.get("ToUserName"), Some("gh_123"));
        assert_eq!(fields.get("CreateTime"), Some("1348831860"));
        assert_eq!(fields.get("Empty"), Some(""));
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_read_fields_skips_nested_children() {
        let body = b"<xml><Video><MediaId>m1</MediaId></Video><MsgType>video</MsgType></xml>";
        let fields = read_fields(body).unwrap();

        assert_eq!(fields.get("Video"), Some(""));
        assert_eq!(fields.get("MediaId"), None);
        assert_eq!(fields.get("MsgType"), Some("video"));
    }

    #[test]
    fn test_read_fields_malformed() {
        let result = read_fields(b"<xml><a>1</b></xml>");
        assert!(matches!(result, Err(WechatError::Xml(_))));
    }

    #[test]
    fn test_parse_fields() {
        let fields = read_fields(b"<xml><n>42</n><bad>x</bad><e></e></xml>").unwrap();

        assert_eq!(fields.parse::<i64>("n").unwrap(), Some(42));
        assert_eq!(fields.parse::<i64>("e").unwrap(), None);
        assert_eq!(fields.parse::<i64>("missing").unwrap(), None);
        assert_eq!(fields.parse_or_default::<i64>("missing").unwrap(), 0);
        assert!(matches!(
            fields.parse::<i64>("bad"),
            Err(WechatError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_required_field() {
        let fields = read_fields(b"<xml><a>1</a></xml>").unwrap();
        assert_eq!(fields.required("a").unwrap(), "1");
        assert!(fields.required("b").is_err());
    }

    #[test]
    fn test_cdata_splits_terminator() {
        assert_eq!(cdata("plain"), "<![CDATA[plain]]>");
        assert_eq!(cdata("a]]>b"), "<![CDATA[a]]]]><![CDATA[>b]]>");

        let body = format!("<xml><v>{}</v></xml>", cdata("a]]>b"));
        let fields = read_fields(body.as_bytes()).unwrap();
        assert_eq!(fields.get("v"), Some("a]]>b"));
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a<b&c"), "a&lt;b&amp;c");
    }
}
