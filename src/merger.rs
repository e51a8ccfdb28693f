use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::compress::{compress, Compression};
use crate::destination::{has_gpx_extension, resolve_destination, Clock, SystemClock};
use crate::dom::{Document, Element};
use crate::error::MergeError;
use crate::metadata::GpxMetaData;
use crate::options::DEFAULT_CREATOR;

type Result<T> = std::result::Result<T, MergeError>;

pub const GPX_VERSION: &str = "1.1";
pub const GPX_NAMESPACE: &str = "http://www.topografix.com/GPX/1/1";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const GPX_SCHEMA_LOCATION: &str =
    "http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd";

/// Elements appended to the output from one source document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AppendSummary {
    pub waypoints: usize,
    pub routes: usize,
    pub tracks: usize,
    pub points_removed: usize,
}

/// Merges GPX files into one GPX 1.1 document.
///
/// Each merge owns its output document, so one merger can serve any number
/// of independent merges.
#[derive(Debug)]
pub struct GpxMerger {
    default_directory: Option<PathBuf>,
    clock: Box<dyn Clock>,
    creator: String,
}

impl Default for GpxMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl GpxMerger {
    /// Merger writing unnamed output to the system temp directory.
    pub fn new() -> Self {
        Self {
            default_directory: None,
            clock: Box::new(SystemClock),
            creator: DEFAULT_CREATOR.to_string(),
        }
    }

    /// Directory for output files when no destination is given.
    pub fn with_default_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.default_directory = Some(directory.into());
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Configured default directory, or the system temp directory.
    pub fn default_directory(&self) -> PathBuf {
        self.default_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Merge `files` in order and write the result.
    ///
    /// Returns the path actually written, which has `.gpx` appended when
    /// `destination` lacks it. Any invalid input aborts before anything is
    /// written.
    pub fn merge<P: AsRef<Path>>(
        &self,
        files: &[P],
        destination: Option<&Path>,
        metadata: Option<&GpxMetaData>,
        compression: impl Into<Compression>,
    ) -> Result<PathBuf> {
        let destination = resolve_destination(
            destination,
            &self.default_directory(),
            self.clock.as_ref(),
        );

        let sources = files.iter().map(|file| load_source(file.as_ref()));
        let output = self.merge_documents(sources, metadata, compression)?;

        let bytes = output.serialize().map_err(MergeError::Serialize)?;
        write_output(&destination, &bytes)?;

        info!(
            files = files.len(),
            destination = %destination.display(),
            bytes = bytes.len(),
            "merged GPX files"
        );
        Ok(destination)
    }

    /// Merge GPX documents held in memory and return the serialized result.
    pub fn merge_strings<S: AsRef<str>>(
        &self,
        inputs: &[S],
        metadata: Option<&GpxMetaData>,
        compression: impl Into<Compression>,
    ) -> Result<String> {
        let sources = inputs.iter().enumerate().map(|(index, xml)| {
            Document::parse(xml.as_ref()).map_err(|source| MergeError::Parse {
                input: format!("input #{index}"),
                source,
            })
        });
        let output = self.merge_documents(sources, metadata, compression)?;

        output.to_xml_string().map_err(MergeError::Serialize)
    }

    /// Build the output document from `sources`, appended in order.
    ///
    /// Sources are pulled one at a time; the first error stops the merge and
    /// later sources are never loaded.
    pub fn merge_documents<I>(
        &self,
        sources: I,
        metadata: Option<&GpxMetaData>,
        compression: impl Into<Compression>,
    ) -> Result<Document>
    where
        I: IntoIterator<Item = Result<Document>>,
    {
        let compression = compression.into();

        let mut output = self.create_document(metadata);
        for (index, source) in sources.into_iter().enumerate() {
            let summary = append_document(&mut output, source?, compression);
            debug!(
                source = index,
                waypoints = summary.waypoints,
                routes = summary.routes,
                tracks = summary.tracks,
                points_removed = summary.points_removed,
                "appended GPX document"
            );
        }

        Ok(output)
    }

    /// An output document holding only the `<gpx>` root and, if given, the
    /// metadata block.
    pub fn create_document(&self, metadata: Option<&GpxMetaData>) -> Document {
        let mut gpx = Element::new("gpx");
        gpx.set_attribute("version", GPX_VERSION);
        gpx.set_attribute("creator", self.creator.as_str());
        gpx.set_attribute("xmlns", GPX_NAMESPACE);
        gpx.set_attribute("xmlns:xsi", XSI_NAMESPACE);
        gpx.set_attribute("xsi:schemaLocation", GPX_SCHEMA_LOCATION);

        if let Some(metadata) = metadata {
            gpx.append_child(metadata.to_element());
        }

        Document::new(gpx)
    }
}

/// Append the waypoints, then the routes, then the tracks of `source` to the
/// root of `output`, decimating points first when compression is enabled.
pub fn append_document(
    output: &mut Document,
    mut source: Document,
    compression: Compression,
) -> AppendSummary {
    let mut summary = AppendSummary::default();

    if compression.is_enabled() {
        let ratio = compression.ratio();
        let root = source.root_mut();
        let mut removed = compress(root, "wpt", ratio);
        root.for_each_descendant_mut("rte", &mut |rte: &mut Element| {
            removed += compress(rte, "rtept", ratio);
        });
        root.for_each_descendant_mut("trk", &mut |trk: &mut Element| {
            removed += compress(trk, "trkpt", ratio);
        });
        summary.points_removed = removed;
    }

    for (tag, count) in [
        ("wpt", &mut summary.waypoints),
        ("rte", &mut summary.routes),
        ("trk", &mut summary.tracks),
    ] {
        for element in source.find_all(tag) {
            let imported = output.import_node(&source, element);
            output.root_mut().append_child(imported);
            *count += 1;
        }
    }

    summary
}

fn load_source(path: &Path) -> Result<Document> {
    debug!(file = %path.display(), "loading GPX file");

    if !path.exists() {
        return Err(MergeError::NotFound {
            path: path.to_path_buf(),
        });
    }

    if !has_gpx_extension(path) {
        return Err(MergeError::InvalidType {
            path: path.to_path_buf(),
        });
    }

    let bytes = std::fs::read(path).map_err(|source| MergeError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Document::from_bytes(&bytes).map_err(|source| MergeError::Parse {
        input: path.display().to_string(),
        source,
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    let failed = |source: io::Error| MergeError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if bytes.is_empty() {
        return Err(failed(io::ErrorKind::WriteZero.into()));
    }

    let mut file = File::create(path).map_err(failed)?;
    file.write_all(bytes).map_err(failed)?;
    file.flush().map_err(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = r#"<?xml version="1.0"?>
<gpx xmlns="http://www.topografix.com/GPX/1/1" version="1.1" creator="test">
  <trk>
    <name>Out</name>
    <trkseg>
      <trkpt lat="1" lon="1"/>
      <trkpt lat="2" lon="2"/>
      <trkpt lat="3" lon="3"/>
    </trkseg>
  </trk>
  <rte>
    <rtept lat="1" lon="1"/>
    <rtept lat="2" lon="2"/>
    <rtept lat="3" lon="3"/>
  </rte>
  <wpt lat="10" lon="10"/>
  <wpt lat="11" lon="11"/>
  <wpt lat="12" lon="12"/>
</gpx>"#;

    fn child_names(doc: &Document) -> Vec<String> {
        doc.root()
            .child_elements()
            .map(|e| e.name().to_string())
            .collect()
    }

    #[test]
    fn test_root_attributes() {
        let doc = GpxMerger::new().create_document(None);
        let root = doc.root();
        assert_eq!(root.name(), "gpx");
        let attrs: Vec<_> = root
            .attributes()
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(
            attrs,
            [
                ("version", "1.1"),
                ("creator", "gpx-merger"),
                ("xmlns", GPX_NAMESPACE),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", GPX_SCHEMA_LOCATION),
            ]
        );
        assert!(root.children().is_empty());
    }

    #[test]
    fn test_custom_creator() {
        let doc = GpxMerger::new().with_creator("my-app").create_document(None);
        assert_eq!(doc.root().attribute("creator"), Some("my-app"));
    }

    #[test]
    fn test_metadata_first() {
        let meta = GpxMetaData::create("Test", "This is a test", "Jane Doe");
        let mut doc = GpxMerger::new().create_document(Some(&meta));
        let source = Document::parse(FILE).unwrap();
        append_document(&mut doc, source, Compression::NONE);
        assert_eq!(child_names(&doc)[0], "metadata");
    }

    #[test]
    fn test_grouped_by_kind() {
        let mut doc = GpxMerger::new().create_document(None);
        let source = Document::parse(FILE).unwrap();
        let summary = append_document(&mut doc, source, Compression::NONE);

        assert_eq!(child_names(&doc), ["wpt", "wpt", "wpt", "rte", "trk"]);
        assert_eq!(
            summary,
            AppendSummary {
                waypoints: 3,
                routes: 1,
                tracks: 1,
                points_removed: 0,
            }
        );
    }

    #[test]
    fn test_full_compression_keeps_endpoints() {
        let mut doc = GpxMerger::new().create_document(None);
        let source = Document::parse(FILE).unwrap();
        let summary = append_document(&mut doc, source, Compression::MAX);

        assert_eq!(summary.points_removed, 3);
        assert_eq!(doc.find_all("wpt").len(), 2);
        assert_eq!(doc.find_all("rtept").len(), 2);
        assert_eq!(doc.find_all("trkpt").len(), 2);

        let lats: Vec<_> = doc
            .find_all("wpt")
            .iter()
            .map(|w| w.attribute("lat").unwrap())
            .collect();
        assert_eq!(lats, ["10", "12"]);
    }

    #[test]
    fn test_merge_strings_in_memory() {
        let xml = GpxMerger::new()
            .merge_strings(&[FILE, FILE], None, 0.0)
            .unwrap();
        let doc = Document::parse(&xml).unwrap();
        assert_eq!(doc.find_all("wpt").len(), 6);
        assert_eq!(doc.find_all("trk").len(), 2);
    }

    #[test]
    fn test_merge_strings_reports_bad_input() {
        let err = GpxMerger::new()
            .merge_strings(&[FILE, "<gpx><trk></gpx>"], None, 0.0)
            .unwrap_err();
        assert!(matches!(err, MergeError::Parse { ref input, .. } if input == "input #1"));
    }

    #[test]
    fn test_merge_documents_stops_at_first_error() {
        let mut pulled = 0;
        let sources = (0..3).map(|index| {
            pulled += 1;
            if index == 1 {
                Err(MergeError::NotFound {
                    path: PathBuf::from("missing.gpx"),
                })
            } else {
                Ok(Document::parse(FILE).unwrap())
            }
        });

        let err = GpxMerger::new()
            .merge_documents(sources, None, Compression::NONE)
            .unwrap_err();
        assert!(matches!(err, MergeError::NotFound { .. }));
        assert_eq!(pulled, 2);
    }

    #[test]
    fn test_merge_documents_applies_compression() {
        let sources = [FILE, FILE].map(|xml| Ok(Document::parse(xml).unwrap()));
        let doc = GpxMerger::new()
            .merge_documents(sources, None, 1.0)
            .unwrap();
        assert_eq!(doc.find_all("wpt").len(), 4);
        assert_eq!(doc.find_all("trkpt").len(), 4);
    }

    #[test]
    fn test_merge_strings_with_options() {
        let opts: crate::options::MergeOptions =
            serde_json::from_str(r#"{ "compression": 4.0, "creator": "my-app" }"#).unwrap();
        let xml = GpxMerger::new()
            .with_creator(opts.creator.as_str())
            .merge_strings(&[FILE], opts.metadata.as_ref(), opts.compression())
            .unwrap();

        let doc = Document::parse(&xml).unwrap();
        assert_eq!(doc.root().attribute("creator"), Some("my-app"));
        assert_eq!(doc.find_all("trkpt").len(), 2);
    }

    #[test]
    fn test_merge_strings_keeps_processing_instructions() {
        let xml = GpxMerger::new()
            .merge_strings(
                &[r#"<gpx><wpt lat="1" lon="1"><?garmin keep?><name>x</name></wpt></gpx>"#],
                None,
                0.0,
            )
            .unwrap();
        assert!(xml.contains("<?garmin keep?>"));
    }

    #[test]
    fn test_merge_strings_redeclares_prefix_for_each_track_point() {
        let input = r#"<gpx xmlns:a="urn:a"><trk><trkseg>
            <trkpt lat="1" lon="1"><extensions xmlns:a="urn:a"><a:x>1</a:x></extensions></trkpt>
            <trkpt lat="2" lon="2"><extensions><a:x>2</a:x></extensions></trkpt>
        </trkseg></trk></gpx>"#;
        let xml = GpxMerger::new().merge_strings(&[input], None, 0.0).unwrap();

        let doc = Document::parse(&xml).unwrap();
        let trk = doc.root().child("trk").unwrap();
        assert_eq!(trk.attribute("xmlns:a"), Some("urn:a"));
    }

    #[test]
    fn test_write_output_rejects_empty() {
        let err = write_output(Path::new("unused.gpx"), &[]).unwrap_err();
        match err {
            MergeError::WriteFailed { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::WriteZero)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
