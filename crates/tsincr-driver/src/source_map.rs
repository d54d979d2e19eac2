//! Version 3 source maps.

use serde::{Deserialize, Serialize};

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// A map from `generated_lines` lines onto the same lines of a single
    /// source, column 0 to column 0.
    pub fn line_preserving(file: &str, source: &str, generated_lines: usize) -> Self {
        Self {
            version: 3,
            file: Some(file.to_string()),
            source_root: None,
            sources: vec![source.to_string()],
            sources_content: None,
            names: Vec::new(),
            mappings: line_mappings(generated_lines),
        }
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Point the map at one source, embedding its text.
    pub fn with_source(mut self, source: &str, content: &str) -> Self {
        self.sources = vec![source.to_string()];
        self.sources_content = Some(vec![Some(content.to_string())]);
        self.source_root = None;
        self
    }
}

/// `AAAA;AACA;AACA;...`: each line starts at column 0 of the next source line.
fn line_mappings(lines: usize) -> String {
    let mut mappings = String::new();
    for line in 0..lines {
        if line > 0 {
            mappings.push(';');
        }
        // generated column, source index, source line delta, source column
        for value in [0, 0, i64::from(line > 0), 0] {
            encode_vlq(value, &mut mappings);
        }
    }
    mappings
}

/// Base64 VLQ encoding of one mapping field.
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(char::from(BASE64[digit]));
        if vlq == 0 {
            break;
        }
    }
}

/// Drop `//# sourceMappingURL=` lines.
pub fn strip_source_mapping_url(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        if !line.trim_start().starts_with("//# sourceMappingURL=") {
            out.push_str(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    #[test]
    fn test_vlq() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(-17), "jB");
    }

    #[test]
    fn test_line_preserving() {
        let map = SourceMap::line_preserving("a.js", "a.ts", 3);
        assert_eq!(map.mappings, "AAAA;AACA;AACA");
        assert_eq!(map.version, 3);
    }

    #[test]
    fn test_json_shape() {
        let map = SourceMap::line_preserving("a.js", "a.ts", 1).with_source("src/a.ts", "let a = 1;");
        let json = map.to_json().unwrap();

        assert!(json.contains("\"sourcesContent\":[\"let a = 1;\"]"));
        assert!(json.contains("\"sources\":[\"src/a.ts\"]"));
        assert!(!json.contains("sourceRoot"));
        assert_eq!(SourceMap::parse(&json).unwrap(), map);
    }

    #[test]
    fn test_strip_url() {
        let text = "var a = 1;\n//# sourceMappingURL=a.js.map";
        assert_eq!(strip_source_mapping_url(text), "var a = 1;\n");
    }
}
