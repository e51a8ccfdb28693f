use std::path::PathBuf;

use wasm_bindgen::JsValue;

/// Failures while reading or writing an XML tree.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("XML parse error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("Unknown entity '&{0};'")]
    UnknownEntity(String),

    #[error("Document has no root element")]
    MissingRoot,

    #[error("Document has more than one root element")]
    MultipleRoots,

    #[error("Unexpected end of document inside <{open}>")]
    UnexpectedEof { open: String },
}

/// Failures surfaced by a merge. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("File {} does not exist", path.display())]
    NotFound { path: PathBuf },

    #[error("File {} has invalid type. Has to be gpx.", path.display())]
    InvalidType { path: PathBuf },

    #[error("Error while reading file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Error while parsing {input}: {source}")]
    Parse {
        input: String,
        #[source]
        source: XmlError,
    },

    #[error("Error while serializing merged document: {0}")]
    Serialize(#[source] XmlError),

    #[error("Error while saving file {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<MergeError> for JsValue {
    fn from(e: MergeError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}
