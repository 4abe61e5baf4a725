//! Source-map v3 model, VLQ codec, and transitive map combination.
//!
//! The stage receives a freshly produced map from the backend and may also
//! receive a pre-existing map from an earlier transform stage. [`combine`]
//! composes the two so a position in the final CSS resolves all the way back
//! to the originally authored source in a single hop.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A standard source-map v3 document.
///
/// Only the fields of the standard schema are modeled; `sections`-style
/// index maps are not supported at this boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    /// Parse a source map from its JSON form, rejecting unsupported versions.
    pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
        let map: SourceMap = serde_json::from_str(json)?;
        if map.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(map.version));
        }
        Ok(map)
    }

    /// Serialize back to the JSON wire form.
    pub fn to_json(&self) -> Result<String, SourceMapError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Failures while parsing, decoding, or combining source maps.
#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("not valid source-map JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported source map version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid mappings: {0}")]
    Mappings(String),
}

/// One decoded mapping segment: a column in the generated output, optionally
/// tied to a position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Segment {
    pub gen_col: u32,
    pub src: Option<SrcRef>,
}

/// The source side of a segment. Indices refer to the owning map's
/// `sources` and `names` tables; line and column are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SrcRef {
    pub source: u32,
    pub line: u32,
    pub col: u32,
    pub name: Option<u32>,
}

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn decode_b64(byte: u8) -> Option<i64> {
    match byte {
        b'A'..=b'Z' => Some((byte - b'A') as i64),
        b'a'..=b'z' => Some((byte - b'a') as i64 + 26),
        b'0'..=b'9' => Some((byte - b'0') as i64 + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode one comma-free VLQ segment into its numeric fields.
fn decode_segment(segment: &str) -> Result<Vec<i64>, SourceMapError> {
    let mut fields = Vec::with_capacity(5);
    let mut value: i64 = 0;
    let mut shift: u32 = 0;
    for byte in segment.bytes() {
        let digit = decode_b64(byte).ok_or_else(|| {
            SourceMapError::Mappings(format!("invalid base64 character `{}`", byte as char))
        })?;
        value |= (digit & 31) << shift;
        if digit & 32 != 0 {
            shift += 5;
            if shift > 60 {
                return Err(SourceMapError::Mappings("VLQ value too large".into()));
            }
        } else {
            let negative = value & 1 != 0;
            let magnitude = value >> 1;
            fields.push(if negative { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        }
    }
    if shift != 0 {
        return Err(SourceMapError::Mappings("truncated VLQ segment".into()));
    }
    Ok(fields)
}

fn encode_vlq(out: &mut String, value: i64) {
    let mut v: u64 = if value < 0 {
        (((-value) as u64) << 1) | 1
    } else {
        (value as u64) << 1
    };
    loop {
        let mut digit = (v & 31) as usize;
        v >>= 5;
        if v != 0 {
            digit |= 32;
        }
        out.push(BASE64[digit] as char);
        if v == 0 {
            break;
        }
    }
}

fn checked_index(value: i64, what: &str) -> Result<u32, SourceMapError> {
    u32::try_from(value)
        .map_err(|_| SourceMapError::Mappings(format!("negative {what} after delta decoding")))
}

/// Decode a `mappings` string into per-line segments, resolving all deltas
/// to absolute positions.
pub(crate) fn decode_mappings(mappings: &str) -> Result<Vec<Vec<Segment>>, SourceMapError> {
    let mut lines = Vec::new();
    let (mut src, mut src_line, mut src_col, mut name) = (0i64, 0i64, 0i64, 0i64);

    for group in mappings.split(';') {
        let mut segments = Vec::new();
        let mut gen_col = 0i64;
        for raw in group.split(',') {
            if raw.is_empty() {
                continue;
            }
            let fields = decode_segment(raw)?;
            if !matches!(fields.len(), 1 | 4 | 5) {
                return Err(SourceMapError::Mappings(format!(
                    "segment has {} fields, expected 1, 4 or 5",
                    fields.len()
                )));
            }
            gen_col += fields[0];
            let src_ref = if fields.len() >= 4 {
                src += fields[1];
                src_line += fields[2];
                src_col += fields[3];
                let name_ref = if fields.len() == 5 {
                    name += fields[4];
                    Some(checked_index(name, "name index")?)
                } else {
                    None
                };
                Some(SrcRef {
                    source: checked_index(src, "source index")?,
                    line: checked_index(src_line, "source line")?,
                    col: checked_index(src_col, "source column")?,
                    name: name_ref,
                })
            } else {
                None
            };
            segments.push(Segment {
                gen_col: checked_index(gen_col, "generated column")?,
                src: src_ref,
            });
        }
        lines.push(segments);
    }
    Ok(lines)
}

/// Re-encode per-line segments into a delta-encoded `mappings` string.
pub(crate) fn encode_mappings(lines: &[Vec<Segment>]) -> String {
    let mut out = String::new();
    let (mut src, mut src_line, mut src_col, mut name) = (0i64, 0i64, 0i64, 0i64);

    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        let mut gen_col = 0i64;
        for (j, segment) in line.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            encode_vlq(&mut out, segment.gen_col as i64 - gen_col);
            gen_col = segment.gen_col as i64;
            if let Some(s) = segment.src {
                encode_vlq(&mut out, s.source as i64 - src);
                src = s.source as i64;
                encode_vlq(&mut out, s.line as i64 - src_line);
                src_line = s.line as i64;
                encode_vlq(&mut out, s.col as i64 - src_col);
                src_col = s.col as i64;
                if let Some(n) = s.name {
                    encode_vlq(&mut out, n as i64 - name);
                    name = n as i64;
                }
            }
        }
    }
    out
}

/// Normalize a freshly produced map against the asset's logical identity:
/// the map's `file` becomes the logical path, and `sources` lose their
/// `file://` scheme and are relativized against the asset's directory where
/// possible.
pub fn normalize(mut map: SourceMap, logical_path: &Utf8Path) -> SourceMap {
    map.file = Some(logical_path.to_string());
    let dir = logical_path.parent().filter(|d| !d.as_str().is_empty());
    for source in &mut map.sources {
        let mut path = source
            .strip_prefix("file://")
            .unwrap_or(source.as_str())
            .to_string();
        if let Some(dir) = dir {
            if let Ok(relative) = Utf8Path::new(&path).strip_prefix(dir) {
                path = relative.to_string();
            }
        }
        *source = path;
    }
    map
}

/// Interns sources and names while building the combined map.
struct MapBuilder {
    sources: Vec<String>,
    source_index: BTreeMap<String, u32>,
    names: Vec<String>,
    name_index: BTreeMap<String, u32>,
    lines: Vec<Vec<Segment>>,
}

impl MapBuilder {
    fn new() -> Self {
        Self {
            sources: Vec::new(),
            source_index: BTreeMap::new(),
            names: Vec::new(),
            name_index: BTreeMap::new(),
            lines: Vec::new(),
        }
    }

    fn source(&mut self, source: &str) -> u32 {
        if let Some(&idx) = self.source_index.get(source) {
            return idx;
        }
        let idx = self.sources.len() as u32;
        self.sources.push(source.to_string());
        self.source_index.insert(source.to_string(), idx);
        idx
    }

    fn name(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.name_index.get(name) {
            return idx;
        }
        let idx = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), idx);
        idx
    }

    fn push(&mut self, line: usize, segment: Segment) {
        while self.lines.len() <= line {
            self.lines.push(Vec::new());
        }
        self.lines[line].push(segment);
    }
}

/// Find the prior-map segment covering `(line, col)`: the last segment on
/// that line whose generated column does not exceed `col`.
fn lookup(lines: &[Vec<Segment>], line: u32, col: u32) -> Option<SrcRef> {
    let segments = lines.get(line as usize)?;
    segments
        .iter()
        .rev()
        .find(|s| s.gen_col <= col)
        .and_then(|s| s.src)
}

fn source_of(map: &SourceMap, index: u32) -> Result<&str, SourceMapError> {
    map.sources
        .get(index as usize)
        .map(String::as_str)
        .ok_or_else(|| {
            SourceMapError::Mappings(format!("source index {index} out of range"))
        })
}

/// Combine an upstream map with a newly produced one.
///
/// Without a prior map the new map is returned as-is (normalize it first if
/// needed). With one, mappings compose transitively: each position in the
/// final output maps via `new` to a pre-transform position, which is looked
/// up in `prior` to reach the originally authored source. Segments whose
/// pre-transform position has no entry in the prior map pass through
/// unmapped rather than being dropped, and every source file name listed in
/// the prior map is preserved.
pub fn combine(
    prior: Option<&SourceMap>,
    new: SourceMap,
) -> Result<SourceMap, SourceMapError> {
    let Some(prior) = prior else {
        return Ok(new);
    };

    let prior_lines = decode_mappings(&prior.mappings)?;
    let new_lines = decode_mappings(&new.mappings)?;

    let mut builder = MapBuilder::new();
    for source in &prior.sources {
        builder.source(source);
    }

    for (line_idx, segments) in new_lines.iter().enumerate() {
        for segment in segments {
            let Some(via) = segment.src else {
                builder.push(line_idx, *segment);
                continue;
            };
            let src = match lookup(&prior_lines, via.line, via.col) {
                Some(original) => SrcRef {
                    source: builder.source(source_of(prior, original.source)?),
                    line: original.line,
                    col: original.col,
                    name: match original.name {
                        Some(n) => {
                            let name = prior.names.get(n as usize).ok_or_else(|| {
                                SourceMapError::Mappings(format!("name index {n} out of range"))
                            })?;
                            Some(builder.name(name))
                        }
                        None => None,
                    },
                },
                // No prior entry for this position: keep pointing at the
                // intermediate source instead of dropping the segment.
                None => SrcRef {
                    source: builder.source(source_of(&new, via.source)?),
                    line: via.line,
                    col: via.col,
                    name: match via.name {
                        Some(n) => {
                            let name = new.names.get(n as usize).ok_or_else(|| {
                                SourceMapError::Mappings(format!("name index {n} out of range"))
                            })?;
                            Some(builder.name(name))
                        }
                        None => None,
                    },
                },
            };
            builder.push(
                line_idx,
                Segment {
                    gen_col: segment.gen_col,
                    src: Some(src),
                },
            );
        }
    }

    Ok(SourceMap {
        version: 3,
        file: new.file,
        source_root: None,
        sources: builder.sources,
        sources_content: None,
        names: builder.names,
        mappings: encode_mappings(&builder.lines),
    })
}
