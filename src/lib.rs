pub mod compress;
pub mod destination;
pub mod dom;
pub mod error;
pub mod merger;
pub mod metadata;
pub mod options;

use std::path::{Path, PathBuf};

use wasm_bindgen::prelude::*;

pub use crate::compress::Compression;
pub use crate::error::{MergeError, XmlError};
pub use crate::merger::GpxMerger;
pub use crate::metadata::GpxMetaData;
pub use crate::options::MergeOptions;

/// Merge GPX files into `destination` with a default [`GpxMerger`].
pub fn merge<P: AsRef<Path>>(
    files: &[P],
    destination: Option<&Path>,
    metadata: Option<&GpxMetaData>,
    compression: impl Into<Compression>,
) -> Result<PathBuf, MergeError> {
    GpxMerger::new().merge(files, destination, metadata, compression)
}

/// Merge GPX strings into one GPX document, returned as a string.
#[wasm_bindgen(js_name = mergeGpx)]
pub fn merge_gpx(gpx_strings: Vec<String>, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts = parse_options(options)?;
    let merger = GpxMerger::new().with_creator(opts.creator.as_str());
    let xml = merger.merge_strings(&gpx_strings[..], opts.metadata.as_ref(), opts.compression())?;
    Ok(xml)
}

fn parse_options(options: JsValue) -> Result<MergeOptions, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(MergeOptions::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}
