use serde::Deserialize;

use crate::compress::Compression;
use crate::metadata::GpxMetaData;

/// Default value of the root `creator` attribute.
pub const DEFAULT_CREATOR: &str = "gpx-merger";

/// Options for merging GPX documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOptions {
    /// Fraction of interior points to drop, clamped to [0, 1] (default: 0.0)
    #[serde(default)]
    pub compression: f64,

    /// Metadata block for the merged document (default: none)
    #[serde(default)]
    pub metadata: Option<GpxMetaData>,

    /// Value of the root `creator` attribute (default: "gpx-merger")
    #[serde(default = "default_creator")]
    pub creator: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            compression: 0.0,
            metadata: None,
            creator: default_creator(),
        }
    }
}

impl MergeOptions {
    pub fn compression(&self) -> Compression {
        Compression::new(self.compression)
    }
}

fn default_creator() -> String {
    DEFAULT_CREATOR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let opts: MergeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts.compression, 0.0);
        assert!(opts.metadata.is_none());
        assert_eq!(opts.creator, DEFAULT_CREATOR);
    }

    #[test]
    fn test_camel_case_fields() {
        let opts: MergeOptions = serde_json::from_str(
            r#"{
                "compression": 1.5,
                "creator": "my-app",
                "metadata": { "name": "Trip", "description": "Alps", "author": "Jane Doe" }
            }"#,
        )
        .unwrap();
        assert_eq!(opts.compression(), Compression::MAX);
        assert_eq!(opts.creator, "my-app");
        assert_eq!(
            opts.metadata,
            Some(GpxMetaData::create("Trip", "Alps", "Jane Doe"))
        );
    }

    #[test]
    fn test_partial_metadata() {
        let opts: MergeOptions =
            serde_json::from_str(r#"{ "metadata": { "name": "Trip" } }"#).unwrap();
        let meta = opts.metadata.unwrap();
        assert_eq!(meta.name(), Some("Trip"));
        assert_eq!(meta.author(), None);
    }
}
