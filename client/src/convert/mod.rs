//! Conversion of complex outputs into native values.
//!
//! Converters are matched against an output by mimetype or file extension
//! and tried in descending priority. A converter that does not apply, lacks
//! its optional dependency, or rejects the data falls through to the next
//! one; the generic converter, which returns raw bytes, always comes last.

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
};

use hashbrown::HashMap;
use url::Url;

use crate::{
    error::{Error, UnmetDependencyError},
    transport::Transport,
    typebridge::DAP_MIMETYPE,
    value::Value,
};

mod builtin;

pub use builtin::{
    GdalConverter, GenericConverter, GeoJsonConverter, GeoTiffConverter, ImageConverter,
    JsonConverter, MetalinkConverter, NetCdfConverter, TextConverter, ZipConverter,
};

/// What a converter produced.
#[derive(Debug)]
pub enum Converted {
    Value(Value),
    /// Local files to be converted in turn, e.g. the members of an archive.
    Files(Vec<PathBuf>),
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("converter does not apply: {0}")]
    NotApplicable(String),
    #[error(transparent)]
    UnmetDependency(#[from] UnmetDependencyError),
    #[error("invalid data: {0:#}")]
    Format(anyhow::Error),
    /// The data could not be obtained at all. Not recovered by trying other
    /// converters.
    #[error(transparent)]
    Source(Box<Error>),
}

impl From<Error> for ConvertError {
    fn from(value: Error) -> Self {
        Self::Source(Box::new(value))
    }
}

/// Converts one kind of complex output into a native value.
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Mimetypes handled, compared case-insensitively and ignoring
    /// whitespace.
    fn mimetypes(&self) -> &'static [&'static str] {
        &[]
    }

    /// File extensions handled, lowercase and without the leading dot.
    fn extensions(&self) -> &'static [&'static str] {
        &[]
    }

    /// Higher priority converters are tried first.
    fn priority(&self) -> i32;

    /// Whether [Converter::convert] returns [Converted::Files].
    fn nested(&self) -> bool {
        false
    }

    /// Fails when an optional library that the converter needs is missing.
    fn check_dependencies(&self) -> Result<(), UnmetDependencyError> {
        Ok(())
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError>;
}

/// Checks the converter's dependencies, then runs it.
pub fn run_converter(
    converter: &dyn Converter,
    source: &Source<'_>,
) -> Result<Converted, ConvertError> {
    converter.check_dependencies()?;
    converter.convert(source)
}

fn normalize_mimetype(mimetype: &str) -> String {
    mimetype
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// The mimetype without parameters, e.g. `application/json` for
/// `application/json; charset=utf-8`.
fn mimetype_essence(mimetype: &str) -> String {
    normalize_mimetype(mimetype.split(';').next().unwrap_or_default())
}

fn handles(converter: &dyn Converter, mimetype: Option<&str>, extension: Option<&str>) -> bool {
    // Known mimetypes may carry parameters themselves (GeoTIFF's subtype),
    // so the full mimetype is tried before its essence.
    let by_mimetype = mimetype.is_some_and(|mimetype| {
        let full = normalize_mimetype(mimetype);
        let essence = mimetype_essence(mimetype);
        converter.mimetypes().iter().any(|known| {
            let known = normalize_mimetype(known);
            known == full || known == essence
        })
    });
    let by_extension = extension.is_some_and(|extension| {
        converter
            .extensions()
            .iter()
            .any(|known| known.eq_ignore_ascii_case(extension))
    });
    by_mimetype || by_extension
}

static GENERIC: GenericConverter = GenericConverter;

/// The set of converters available to a client.
pub struct ConverterRegistry {
    converters: Vec<Box<dyn Converter>>,
}

impl Default for ConverterRegistry {
    /// The builtin converters.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(TextConverter);
        registry.register(JsonConverter);
        registry.register(GeoJsonConverter);
        registry.register(MetalinkConverter);
        registry.register(NetCdfConverter);
        registry.register(ImageConverter);
        registry.register(GeoTiffConverter);
        registry.register(GdalConverter);
        registry.register(ZipConverter);
        registry
    }
}

impl ConverterRegistry {
    /// A registry with only the generic fallback.
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
        }
    }

    pub fn register(&mut self, converter: impl Converter + 'static) {
        self.converters.push(Box::new(converter));
    }

    /// Converters that handle `mimetype` or `extension`, highest priority
    /// first, ending with the generic converter. Ties keep registration
    /// order.
    pub fn candidates(
        &self,
        mimetype: Option<&str>,
        extension: Option<&str>,
    ) -> Vec<&dyn Converter> {
        let mut candidates: Vec<&dyn Converter> = self
            .converters
            .iter()
            .map(|converter| converter.as_ref())
            .filter(|converter| handles(*converter, mimetype, extension))
            .collect();
        candidates.push(&GENERIC);
        candidates.sort_by_key(|converter| std::cmp::Reverse(converter.priority()));
        candidates
    }

    /// Converts `source` with the first candidate that succeeds. Files
    /// produced by nested converters are converted recursively into a
    /// [Value::List].
    pub fn convert(&self, source: &Source<'_>) -> Result<Value, Error> {
        let extension = source.extension();
        for converter in self.candidates(source.mimetype(), extension.as_deref()) {
            match run_converter(converter, source) {
                Ok(Converted::Value(value)) => return Ok(value),
                Ok(Converted::Files(paths)) => {
                    let mut values = Vec::with_capacity(paths.len());
                    for path in paths {
                        values.push(self.convert(&source.nested(Origin::Local(path)))?);
                    }
                    return Ok(Value::List(values));
                }
                Err(ConvertError::Source(err)) => return Err(*err),
                Err(ConvertError::UnmetDependency(err)) => {
                    log::info!("Skipping converter {}: {err}.", converter.name());
                }
                Err(err) => {
                    log::warn!(
                        "Converter {} could not convert {}: {err}",
                        converter.name(),
                        source.describe()
                    );
                }
            }
        }
        Ok(Value::Bytes(source.bytes()?))
    }
}

/// Where the data of an output lives.
#[derive(Clone, Debug, PartialEq)]
pub enum Origin {
    /// URL of a by-reference output.
    Remote(String),
    /// A local file, e.g. one extracted from an archive.
    Local(PathBuf),
    /// Decoded content of an embedded output.
    Inline(Vec<u8>),
}

/// Shared state for converting the outputs of one execution.
pub struct ConvertContext<'a> {
    pub transport: &'a dyn Transport,
    /// Directory that downloaded and extracted files are written to.
    pub scratch_dir: &'a Path,
    /// Local copies of remote files, by URL.
    pub downloads: &'a RefCell<HashMap<String, PathBuf>>,
}

/// An output to be converted.
pub struct Source<'a> {
    origin: Origin,
    mimetype: Option<String>,
    context: &'a ConvertContext<'a>,
}

impl<'a> Source<'a> {
    pub fn new(origin: Origin, mimetype: Option<&str>, context: &'a ConvertContext<'a>) -> Self {
        Self {
            origin,
            mimetype: mimetype.map(str::to_owned),
            context,
        }
    }

    /// A source for a file derived from this one. Its type is judged by
    /// extension alone.
    pub fn nested(&self, origin: Origin) -> Source<'a> {
        Source::new(origin, None, self.context)
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn mimetype(&self) -> Option<&str> {
        self.mimetype.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        match &self.origin {
            Origin::Remote(url) => Some(url),
            _ => None,
        }
    }

    /// The URL to open as an OPeNDAP stream instead of downloading, if the
    /// output is served that way.
    pub fn opendap_url(&self) -> Option<&str> {
        let url = self.url()?;
        let dap_mimetype = self
            .mimetype()
            .is_some_and(|mimetype| normalize_mimetype(mimetype) == DAP_MIMETYPE);
        (dap_mimetype || self.context.transport.is_opendap(url)).then_some(url)
    }

    /// Last path segment of the URL or path.
    pub fn file_name(&self) -> Option<String> {
        match &self.origin {
            Origin::Remote(url) => match Url::parse(url) {
                Ok(parsed) => parsed
                    .path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_owned),
                Err(_) => url.rsplit('/').next().map(str::to_owned),
            },
            Origin::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            Origin::Inline(_) => None,
        }
    }

    /// Lowercase file extension, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name()?;
        Path::new(&name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
    }

    pub fn scratch_dir(&self) -> &Path {
        self.context.scratch_dir
    }

    pub fn transport(&self) -> &dyn Transport {
        self.context.transport
    }

    /// Path of a local copy of the data, downloading or writing it out first
    /// when needed.
    pub fn path(&self) -> Result<PathBuf, Error> {
        match &self.origin {
            Origin::Local(path) => Ok(path.clone()),
            Origin::Remote(url) => {
                let name = self.file_name().unwrap_or_else(|| "output".to_string());
                self.download(url, &name)
            }
            Origin::Inline(bytes) => {
                let extension = self
                    .mimetype()
                    .and_then(mime_guess::get_mime_extensions_str)
                    .and_then(|extensions| extensions.first())
                    .unwrap_or(&"bin");
                let path = self.fresh_dir("inline")?.join(format!("output.{extension}"));
                fs::write(&path, bytes)?;
                Ok(path)
            }
        }
    }

    pub fn bytes(&self) -> Result<Vec<u8>, Error> {
        match &self.origin {
            Origin::Inline(bytes) => Ok(bytes.clone()),
            _ => Ok(fs::read(self.path()?)?),
        }
    }

    /// The data as UTF-8 text.
    pub fn text(&self) -> Result<String, ConvertError> {
        String::from_utf8(self.bytes()?).map_err(|err| ConvertError::Format(err.into()))
    }

    /// Fetches `url` into the scratch directory as `file_name`. Each URL is
    /// fetched at most once per execution.
    pub fn download(&self, url: &str, file_name: &str) -> Result<PathBuf, Error> {
        if let Some(path) = self.context.downloads.borrow().get(url) {
            if path.exists() {
                return Ok(path.clone());
            }
        }

        let local = Url::parse(url)
            .ok()
            .filter(|parsed| parsed.scheme() == "file")
            .and_then(|parsed| parsed.to_file_path().ok());
        let path = match local {
            Some(path) => path,
            None => {
                log::debug!("Downloading {url}.");
                let bytes = self.context.transport.fetch(url)?;
                let path = self.fresh_dir("download")?.join(sanitize_file_name(file_name));
                fs::write(&path, bytes)?;
                path
            }
        };

        self.context
            .downloads
            .borrow_mut()
            .insert(url.to_string(), path.clone());
        Ok(path)
    }

    /// Creates a new, empty directory under the scratch directory.
    pub fn fresh_dir(&self, prefix: &str) -> Result<PathBuf, Error> {
        let scratch = self.context.scratch_dir;
        fs::create_dir_all(scratch)?;
        let mut index = 0usize;
        loop {
            let candidate = scratch.join(format!("{prefix}-{index}"));
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => index += 1,
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Short description for log messages.
    pub fn describe(&self) -> String {
        match &self.origin {
            Origin::Remote(url) => url.clone(),
            Origin::Local(path) => path.display().to_string(),
            Origin::Inline(bytes) => format!("<{} inline bytes>", bytes.len()),
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "output".to_string(),
        _ => cleaned,
    }
}
