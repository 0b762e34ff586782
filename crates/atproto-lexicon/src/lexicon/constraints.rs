//! Field constraints carried by primitive and media type nodes
//!
//! Each struct is flattened into its owning node, so its fields appear at the
//! top level of the node's JSON object.

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// Constraints for string fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StringConstraints {
    /// Maximum length in UTF-8 bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Minimum length in UTF-8 bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Maximum length in Unicode grapheme clusters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_graphemes: Option<usize>,

    /// Minimum length in Unicode grapheme clusters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_graphemes: Option<usize>,

    /// Allowed values (closed set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<String>>,

    /// Constant value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#const: Option<String>,

    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Known values (open set, not enforced)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_values: Option<Vec<String>>,
}

/// Constraints for integer fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntegerConstraints {
    /// Maximum value (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,

    /// Minimum value (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,

    /// Allowed values (closed set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<i64>>,

    /// Constant value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#const: Option<i64>,

    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<i64>,
}

/// Constraints for floating point number fields
///
/// Bounds keep the JSON number as written, so `2` renders back as `2`
/// rather than `2.0`. Use [`Number::as_f64`] to compare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NumberConstraints {
    /// Maximum value (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Number>,

    /// Minimum value (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Number>,

    /// Allowed values (closed set)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<Number>>,

    /// Constant value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#const: Option<Number>,

    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Number>,
}

/// Constraints for boolean fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BooleanConstraints {
    /// Constant value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#const: Option<bool>,

    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// Constraints for array fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConstraints {
    /// Maximum number of items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Minimum number of items
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
}

/// Constraints for bytes fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BytesConstraints {
    /// Maximum length in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Minimum length in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
}

/// Constraints for blob fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlobConstraints {
    /// Accepted MIME types (supports glob patterns like `image/*`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    /// Maximum size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,
}

/// Constraints for image descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageConstraints {
    /// Accepted MIME types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    /// Maximum size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,

    /// Maximum width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,

    /// Maximum height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
}

/// Constraints for video descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    /// Accepted MIME types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    /// Maximum size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,

    /// Maximum width in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,

    /// Maximum height in pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,

    /// Maximum duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
}

/// Constraints for audio descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AudioConstraints {
    /// Accepted MIME types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    /// Maximum size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<usize>,

    /// Maximum duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u64>,
}
