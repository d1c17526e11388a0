//! Deterministic object naming
//!
//! An output name is `path_prefix + format(task_index, file_index) + extension`.
//! The format is a printf-style template with exactly two integer conversions,
//! parsed once so that [`SequenceNamer::name`] cannot fail.

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use std::fmt::Write as _;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Integer {
        width: usize,
        zero_pad: bool,
        left_align: bool,
    },
}

/// Builds object keys from a task index and a file index
#[derive(Clone, Debug)]
pub struct SequenceNamer {
    prefix: String,
    segments: Vec<Segment>,
    extension: String,
}

impl SequenceNamer {
    /// Parse `format` and normalize `extension`
    ///
    /// Supported conversions are `%d` with optional `0` or `-` flag and a width
    /// (`%03d`, `%-4d`, `%d`) plus the `%%` escape.
    pub fn new(prefix: &str, format: &str, extension: &str) -> Result<Self> {
        let segments = parse_format(format)?;
        let conversions = segments
            .iter()
            .filter(|s| matches!(s, Segment::Integer { .. }))
            .count();
        if conversions != 2 {
            return Err(Error::config(
                "sequence_format",
                format!(
                    "sequence_format must take exactly two integers (task index, file index), found {conversions} in {format:?}"
                ),
            ));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            segments,
            extension: normalize_extension(extension),
        })
    }

    /// Build a namer from the plugin configuration
    pub fn from_config(config: &OutputConfig) -> Result<Self> {
        Self::new(&config.path_prefix, &config.sequence_format, &config.file_ext)
    }

    /// Object key for the given task and file index
    pub fn name(&self, task_index: u32, file_index: u32) -> String {
        let mut out = self.prefix.clone();
        let mut args = [task_index, file_index].into_iter();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Integer {
                    width,
                    zero_pad,
                    left_align,
                } => {
                    // parse_format guarantees exactly two conversions
                    let value = args.next().unwrap_or_default();
                    let _ = match (zero_pad, left_align) {
                        (true, _) => write!(out, "{value:0width$}", width = *width),
                        (false, true) => write!(out, "{value:<width$}", width = *width),
                        (false, false) => write!(out, "{value:>width$}", width = *width),
                    };
                }
            }
        }

        out.push_str(&self.extension);
        out
    }

    /// Extension appended to every name, always starting with `.`
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

fn normalize_extension(extension: &str) -> String {
    if extension.starts_with('.') {
        extension.to_string()
    } else {
        format!(".{extension}")
    }
}

/// Widest field a conversion may ask for
const MAX_WIDTH: usize = 255;

fn parse_format(format: &str) -> Result<Vec<Segment>> {
    let invalid = |detail: &str| {
        Error::config(
            "sequence_format",
            format!("invalid sequence_format {format:?}: {detail}"),
        )
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }

        if chars.peek() == Some(&'%') {
            chars.next();
            literal.push('%');
            continue;
        }

        let mut zero_pad = false;
        let mut left_align = false;
        while let Some(&flag) = chars.peek() {
            match flag {
                '0' => zero_pad = true,
                '-' => left_align = true,
                _ => break,
            }
            chars.next();
        }
        if zero_pad && left_align {
            return Err(invalid("the '0' and '-' flags cannot be combined"));
        }

        let mut width = 0usize;
        while let Some(digit) = chars.peek().and_then(|d| d.to_digit(10)) {
            width = width * 10 + digit as usize;
            if width > MAX_WIDTH {
                return Err(invalid(&format!("width must not exceed {MAX_WIDTH}")));
            }
            chars.next();
        }
        if (zero_pad || left_align) && width == 0 {
            return Err(invalid("a flag needs a width"));
        }

        match chars.next() {
            Some('d') => {}
            Some(other) => {
                return Err(invalid(&format!(
                    "unsupported conversion '%{other}', only integer conversions are allowed"
                )));
            }
            None => return Err(invalid("dangling '%' at end of format")),
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Integer {
            width,
            zero_pad,
            left_align,
        });
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}
