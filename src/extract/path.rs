//! Extraction paths over JSON trees.
//!
//! A path is a dot-separated list of segments. Each segment names a field,
//! optionally followed by `?` (field may be absent or null) and `[]` (fan
//! out over the array found there). A bare `[]` segment fans out over the
//! current node.
//!
//! ```text
//! result.data.json.result.workflows[].workflowSteps?[].mediaGenerations?[]
//! └──── required fields ───────────┘ └─ optional, fanned out ───────────┘
//! ```
//!
//! Resolution never fails as a whole. Every branch that cannot continue is
//! recorded as a [`PathMiss`] and the remaining branches carry on.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Marker for an optional field.
const OPTIONAL_MARKER: char = '?';

/// Marker for array fan-out.
const EACH_MARKER: &str = "[]";

// ============================================================================
// PathStep
// ============================================================================

/// One step of an [`ExtractionPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    /// Descend into an object field.
    Field {
        /// Field name.
        name: String,
        /// Absent or null is not a miss.
        optional: bool,
    },

    /// Fan out over every element of an array.
    Each,
}

impl PathStep {
    /// Creates a required field step.
    #[inline]
    #[must_use]
    pub fn field(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            optional: false,
        }
    }

    /// Creates an optional field step.
    #[inline]
    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            optional: true,
        }
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { name, optional } => {
                write!(f, "{name}")?;
                if *optional {
                    write!(f, "{OPTIONAL_MARKER}")?;
                }
                Ok(())
            }
            Self::Each => write!(f, "{EACH_MARKER}"),
        }
    }
}

// ============================================================================
// PathMiss
// ============================================================================

/// Why a branch stopped resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissKind {
    /// Required field not present.
    Absent,
    /// Field step applied to a non-object.
    NotAnObject,
    /// Fan-out applied to a non-array.
    NotAnArray,
}

impl fmt::Display for MissKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Absent => "absent",
            Self::NotAnObject => "not an object",
            Self::NotAnArray => "not an array",
        };
        f.write_str(text)
    }
}

/// A branch of a path that could not be followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMiss {
    /// Zero-based index of the failing step.
    pub step: usize,
    /// The failing step as written.
    pub segment: String,
    /// Failure kind.
    pub kind: MissKind,
}

impl fmt::Display for PathMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({}): {}", self.step, self.segment, self.kind)
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Nodes reached by a path plus the branches that were cut short.
#[derive(Debug, Default)]
pub struct Selection<'a> {
    /// Reached nodes, in document order.
    pub nodes: Vec<&'a Value>,
    /// Branches that could not continue.
    pub misses: Vec<PathMiss>,
}

// ============================================================================
// ExtractionPath
// ============================================================================

/// Parsed extraction path.
///
/// Serializes as its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExtractionPath {
    steps: Vec<PathStep>,
}

impl ExtractionPath {
    /// Creates a path from explicit steps.
    #[must_use]
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    /// The empty path, which selects the root itself.
    #[must_use]
    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    /// Parses the textual syntax.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for empty segments, stray markers or
    /// field names containing brackets.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::root());
        }

        let mut steps = Vec::new();
        for segment in text.split('.') {
            parse_segment(text, segment, &mut steps)?;
        }

        Ok(Self { steps })
    }

    /// Returns the steps.
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Returns `true` if any step fans out.
    #[must_use]
    pub fn fans_out(&self) -> bool {
        self.steps.iter().any(|step| matches!(step, PathStep::Each))
    }

    /// Follows the path from `root`.
    pub fn select<'a>(&self, root: &'a Value) -> Selection<'a> {
        let mut frontier = vec![root];
        let mut misses = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            let mut next = Vec::with_capacity(frontier.len());

            for node in frontier {
                match step {
                    PathStep::Field { name, optional } => match node {
                        Value::Object(map) => match map.get(name.as_str()) {
                            Some(Value::Null) if *optional => {}
                            Some(value) => next.push(value),
                            None if *optional => {}
                            None => misses.push(miss(index, step, MissKind::Absent)),
                        },
                        Value::Null if *optional => {}
                        _ => misses.push(miss(index, step, MissKind::NotAnObject)),
                    },
                    PathStep::Each => match node {
                        Value::Array(items) => next.extend(items.iter()),
                        _ => misses.push(miss(index, step, MissKind::NotAnArray)),
                    },
                }
            }

            frontier = next;
        }

        Selection {
            nodes: frontier,
            misses,
        }
    }

    /// Resolves the path to a non-empty string, taking the first node reached.
    #[must_use]
    pub fn resolve_str<'a>(&self, root: &'a Value) -> Option<&'a str> {
        self.select(root)
            .nodes
            .into_iter()
            .next()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

impl fmt::Display for ExtractionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for step in &self.steps {
            match step {
                PathStep::Each if !first => write!(f, "{EACH_MARKER}")?,
                _ => {
                    if !first {
                        f.write_str(".")?;
                    }
                    write!(f, "{step}")?;
                }
            }
            first = false;
        }
        Ok(())
    }
}

impl FromStr for ExtractionPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ExtractionPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ExtractionPath> for String {
    fn from(path: ExtractionPath) -> Self {
        path.to_string()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Builds a miss for `step` at `index`.
fn miss(index: usize, step: &PathStep, kind: MissKind) -> PathMiss {
    PathMiss {
        step: index,
        segment: step.to_string(),
        kind,
    }
}

/// Parses one dot-separated segment into one or more steps.
fn parse_segment(path: &str, segment: &str, steps: &mut Vec<PathStep>) -> Result<()> {
    let mut rest = segment;
    let mut fan_outs = 0;
    while let Some(stripped) = rest.strip_suffix(EACH_MARKER) {
        rest = stripped;
        fan_outs += 1;
    }

    let (name, optional) = match rest.strip_suffix(OPTIONAL_MARKER) {
        Some(name) => (name, true),
        None => (rest, false),
    };

    if name.contains(['[', ']', OPTIONAL_MARKER]) {
        return Err(Error::invalid_path(
            path,
            format!("unexpected marker in segment '{segment}'"),
        ));
    }

    if name.is_empty() {
        if optional {
            return Err(Error::invalid_path(path, "'?' must follow a field name"));
        }
        if fan_outs == 0 {
            return Err(Error::invalid_path(path, "empty segment"));
        }
    } else {
        steps.push(PathStep::Field {
            name: name.to_string(),
            optional,
        });
    }

    steps.extend(std::iter::repeat_n(PathStep::Each, fan_outs));
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
