//! Overpass QL query builder
//!
//! Keys and values are passed through [`escape_tag_value`] before being
//! interpolated, so user input can never terminate a string literal.
//!
//! ```rust,ignore
//! let query = OverpassQueryBuilder::new()
//!     .way()
//!     .relation()
//!     .filter(TagFilter::exists("building"))
//!     .bbox(bbox)
//!     .output(OutputMode::Geom)
//!     .build()?;
//! ```

use std::fmt::{self, Write as _};

use domain::{BBox, OsmElementType, text::escape_tag_value};

use crate::error::{OverpassError, OverpassResult};

/// Default server-side timeout in seconds
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 25;

/// Comparison applied by a tag filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOperator {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Regex,
    NotRegex,
}

/// One `[...]` tag filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub key: String,
    pub operator: TagOperator,
    pub value: Option<String>,
    /// Only meaningful for the regex operators
    pub case_insensitive: bool,
}

impl TagFilter {
    fn new(key: impl Into<String>, operator: TagOperator, value: Option<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            value,
            case_insensitive: false,
        }
    }

    /// `["key"]`
    pub fn exists(key: impl Into<String>) -> Self {
        Self::new(key, TagOperator::Exists, None)
    }

    /// `[!"key"]`
    pub fn not_exists(key: impl Into<String>) -> Self {
        Self::new(key, TagOperator::NotExists, None)
    }

    /// `["key"="value"]`
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, TagOperator::Equals, Some(value.into()))
    }

    /// `["key"!="value"]`
    pub fn not_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, TagOperator::NotEquals, Some(value.into()))
    }

    /// `["key"~"pattern"]`; the pattern is a regex, escape literals first
    pub fn regex(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(key, TagOperator::Regex, Some(pattern.into()))
    }

    /// `["key"!~"pattern"]`
    pub fn not_regex(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(key, TagOperator::NotRegex, Some(pattern.into()))
    }

    /// Match the regex case-insensitively (`,i`)
    #[must_use]
    pub const fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    fn validate(&self) -> OverpassResult<()> {
        if self.key.trim().is_empty() {
            return Err(OverpassError::Validation(
                "tag filter key must not be empty".to_string(),
            ));
        }
        let needs_value = !matches!(self.operator, TagOperator::Exists | TagOperator::NotExists);
        if needs_value && self.value.is_none() {
            return Err(OverpassError::Validation(format!(
                "tag filter on '{}' requires a value",
                self.key
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TagFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = escape_tag_value(&self.key);
        let value = escape_tag_value(self.value.as_deref().unwrap_or_default());
        let flag = if self.case_insensitive { ",i" } else { "" };
        match self.operator {
            TagOperator::Exists => write!(f, "[\"{key}\"]"),
            TagOperator::NotExists => write!(f, "[!\"{key}\"]"),
            TagOperator::Equals => write!(f, "[\"{key}\"=\"{value}\"]"),
            TagOperator::NotEquals => write!(f, "[\"{key}\"!=\"{value}\"]"),
            TagOperator::Regex => write!(f, "[\"{key}\"~\"{value}\"{flag}]"),
            TagOperator::NotRegex => write!(f, "[\"{key}\"!~\"{value}\"{flag}]"),
        }
    }
}

/// Output statement of the query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// `out geom;` with inline coordinates
    #[default]
    Geom,
    /// `out body;`
    Body,
    /// `out body;` followed by a recursion down to the referenced nodes and ways
    BodyRecurse,
    /// `out center;`
    Center,
    /// `out tags;`
    Tags,
    /// `out ids;`
    Ids,
}

impl OutputMode {
    #[must_use]
    pub const fn statement(self) -> &'static str {
        match self {
            Self::Geom => "out geom;",
            Self::Body => "out body;",
            Self::BodyRecurse => "out body;\n>;\nout skel qt;",
            Self::Center => "out center;",
            Self::Tags => "out tags;",
            Self::Ids => "out ids;",
        }
    }
}

/// Builder for Overpass QL queries
#[derive(Debug, Clone, PartialEq)]
pub struct OverpassQueryBuilder {
    element_types: Vec<OsmElementType>,
    filters: Vec<TagFilter>,
    ids: Vec<i64>,
    bbox: Option<BBox>,
    timeout_secs: u32,
    max_size: Option<u64>,
    output: OutputMode,
}

impl Default for OverpassQueryBuilder {
    fn default() -> Self {
        Self {
            element_types: Vec::new(),
            filters: Vec::new(),
            ids: Vec::new(),
            bbox: None,
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            max_size: None,
            output: OutputMode::default(),
        }
    }
}

impl OverpassQueryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element type to the union (duplicates are ignored)
    #[must_use]
    pub fn element(mut self, element_type: OsmElementType) -> Self {
        if !self.element_types.contains(&element_type) {
            self.element_types.push(element_type);
        }
        self
    }

    #[must_use]
    pub fn node(self) -> Self {
        self.element(OsmElementType::Node)
    }

    #[must_use]
    pub fn way(self) -> Self {
        self.element(OsmElementType::Way)
    }

    #[must_use]
    pub fn relation(self) -> Self {
        self.element(OsmElementType::Relation)
    }

    #[must_use]
    pub fn filter(mut self, filter: TagFilter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Restrict to explicit element ids
    #[must_use]
    pub fn ids(mut self, ids: &[i64]) -> Self {
        self.ids.extend_from_slice(ids);
        self
    }

    #[must_use]
    pub const fn bbox(mut self, bbox: BBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    /// Server-side timeout in seconds
    #[must_use]
    pub const fn timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Server-side memory limit in bytes
    #[must_use]
    pub const fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    #[must_use]
    pub const fn output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Render the query
    ///
    /// # Errors
    ///
    /// Returns `OverpassError::Validation` if no element type was selected,
    /// the bounding box is invalid, an id is not positive or a filter is
    /// missing its value.
    pub fn build(&self) -> OverpassResult<String> {
        if self.element_types.is_empty() {
            return Err(OverpassError::Validation(
                "at least one element type is required".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(OverpassError::Validation(
                "timeout must be greater than 0".to_string(),
            ));
        }
        if let Some(bbox) = &self.bbox {
            bbox.validate()?;
        }
        if let Some(id) = self.ids.iter().find(|id| **id <= 0) {
            return Err(OverpassError::Validation(format!(
                "element id must be positive, got {id}"
            )));
        }
        for filter in &self.filters {
            filter.validate()?;
        }

        let mut query = format!("[out:json][timeout:{}]", self.timeout_secs);
        if let Some(max_size) = self.max_size {
            let _ = write!(query, "[maxsize:{max_size}]");
        }
        query.push_str(";\n(\n");

        let id_clause = if self.ids.is_empty() {
            String::new()
        } else {
            let ids: Vec<String> = self.ids.iter().map(ToString::to_string).collect();
            format!("(id:{})", ids.join(","))
        };
        let filters: String = self.filters.iter().map(ToString::to_string).collect();
        let bbox_clause = self
            .bbox
            .map(|b| format!("({})", b.to_overpass()))
            .unwrap_or_default();

        for element_type in &self.element_types {
            let _ = writeln!(query, "  {element_type}{id_clause}{filters}{bbox_clause};");
        }

        query.push_str(");\n");
        query.push_str(self.output.statement());
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox() -> BBox {
        BBox::new(40.0, 23.0, 41.0, 24.0).unwrap()
    }

    #[test]
    fn building_bbox_query() {
        let query = OverpassQueryBuilder::new()
            .way()
            .filter(TagFilter::exists("building"))
            .bbox(bbox())
            .build()
            .unwrap();

        assert!(query.starts_with("[out:json][timeout:25];"));
        assert!(query.contains("[\"building\"]"));
        assert!(query.contains("(40,23,41,24)"));
        assert!(query.contains("way[\"building\"](40,23,41,24);"));
        assert!(query.ends_with(");\nout geom;"));

        let opens = query.matches('(').count();
        let closes = query.matches(')').count();
        assert_eq!(opens, closes);
    }

    #[test]
    fn renders_all_operators() {
        assert_eq!(TagFilter::exists("a").to_string(), r#"["a"]"#);
        assert_eq!(TagFilter::not_exists("a").to_string(), r#"[!"a"]"#);
        assert_eq!(TagFilter::equals("a", "b").to_string(), r#"["a"="b"]"#);
        assert_eq!(TagFilter::not_equals("a", "b").to_string(), r#"["a"!="b"]"#);
        assert_eq!(TagFilter::regex("a", "^b$").to_string(), r#"["a"~"^b$"]"#);
        assert_eq!(
            TagFilter::regex("name", "θεσ").case_insensitive().to_string(),
            r#"["name"~"θεσ",i]"#
        );
        assert_eq!(TagFilter::not_regex("a", "b").to_string(), r#"["a"!~"b"]"#);
    }

    #[test]
    fn values_are_escaped() {
        let filter = TagFilter::equals("name", r#"x"];out;(node"#);
        let rendered = filter.to_string();
        assert_eq!(rendered, r#"["name"="x\"];out;(node"]"#);
    }

    #[test]
    fn union_of_element_types() {
        let query = OverpassQueryBuilder::new()
            .way()
            .relation()
            .way()
            .filter(TagFilter::exists("building"))
            .build()
            .unwrap();
        assert_eq!(query.matches("way[").count(), 1);
        assert!(query.contains("  relation[\"building\"];\n"));
    }

    #[test]
    fn id_filter_and_output_modes() {
        let query = OverpassQueryBuilder::new()
            .way()
            .ids(&[1, 2])
            .output(OutputMode::BodyRecurse)
            .build()
            .unwrap();
        assert!(query.contains("way(id:1,2);"));
        assert!(query.ends_with("out body;\n>;\nout skel qt;"));

        assert_eq!(OutputMode::Center.statement(), "out center;");
        assert_eq!(OutputMode::Tags.statement(), "out tags;");
        assert_eq!(OutputMode::Ids.statement(), "out ids;");
        assert_eq!(OutputMode::Body.statement(), "out body;");
    }

    #[test]
    fn header_options() {
        let query = OverpassQueryBuilder::new()
            .node()
            .timeout(60)
            .max_size(1_073_741_824)
            .build()
            .unwrap();
        assert!(query.starts_with("[out:json][timeout:60][maxsize:1073741824];"));
    }

    #[test]
    fn build_rejects_invalid_input() {
        assert!(OverpassQueryBuilder::new().build().is_err());
        assert!(OverpassQueryBuilder::new().way().ids(&[0]).build().is_err());
        assert!(OverpassQueryBuilder::new().way().timeout(0).build().is_err());

        let inverted = BBox {
            south: 41.0,
            west: 23.0,
            north: 40.0,
            east: 24.0,
        };
        assert!(matches!(
            OverpassQueryBuilder::new().way().bbox(inverted).build(),
            Err(OverpassError::Validation(_))
        ));

        let missing_value = TagFilter {
            key: "name".to_string(),
            operator: TagOperator::Equals,
            value: None,
            case_insensitive: false,
        };
        assert!(OverpassQueryBuilder::new().way().filter(missing_value).build().is_err());
    }
}
