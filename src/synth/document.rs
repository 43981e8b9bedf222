// src/synth/document.rs

//! Line-preserving key=value document with a managed-keys allow-list
//!
//! The application config artifact is operator-editable. The synthesizer
//! may only rewrite the managed keys; every other line, including comments,
//! section headers, and operator-added keys, round-trips byte-for-byte.

/// Keys the synthesizer owns; everything else is opaque
pub const MANAGED_KEYS: &[&str] = &["plugins", "domain", "oauth_domain"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// A managed `key = value` assignment
    Managed { key: String, value: String },
    /// Anything else, preserved verbatim
    Raw(String),
}

#[derive(Debug, Clone, Default)]
pub struct Document {
    lines: Vec<Line>,
}

impl Document {
    /// Parse a document, classifying managed assignments
    pub fn parse(text: &str) -> Self {
        let lines = text
            .lines()
            .map(|line| {
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    if MANAGED_KEYS.contains(&key) {
                        return Line::Managed {
                            key: key.to_string(),
                            value: value.trim().to_string(),
                        };
                    }
                }
                Line::Raw(line.to_string())
            })
            .collect();
        Self { lines }
    }

    /// Current value of a managed key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| match line {
            Line::Managed { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    /// Replace the value of a managed key; returns false when the key is
    /// absent from the document (patch mode never inserts new lines).
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        debug_assert!(MANAGED_KEYS.contains(&key));
        let mut found = false;
        for line in &mut self.lines {
            if let Line::Managed { key: k, value: v } = line {
                if k == key {
                    *v = value.to_string();
                    found = true;
                }
            }
        }
        found
    }

    /// Serialize back; managed lines normalize to `key = value`
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Managed { key, value } => {
                    out.push_str(key);
                    out.push_str(" = ");
                    out.push_str(value);
                }
                Line::Raw(raw) => out.push_str(raw),
            }
            out.push('\n');
        }
        out
    }
}
