use std::path::{Path, PathBuf};

use base64::Engine as _;
use url::Url;

use crate::{error::Error, value::InputValue};

/// Mimetypes whose content is base64 encoded when embedded.
pub const BINARY_MIMETYPES: &[&str] = &[
    "application/x-zipped-shp",
    "application/vnd.google-earth.kmz",
    "image/tiff; subtype=geotiff",
    "image/tiff; application=geotiff",
    "application/x-netcdf",
    "application/octet-stream",
    "application/zip",
    "application/x-gzip",
    "application/x-gtar",
    "application/x-tgz",
];

/// Mimetype used for OPeNDAP endpoints.
pub const DAP_MIMETYPE: &str = "application/x-ogc-dods";

const ZIP_MIMETYPES: &[&str] = &["application/zip", "application/x-zipped-shp"];

const MAX_PATH_LEN: usize = 255;

/// How a string value locates its content.
enum Locator {
    File(PathBuf),
    Url,
    Plain,
}

fn classify(value: &str) -> Locator {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "file" => Locator::File(
            url.to_file_path()
                .unwrap_or_else(|_| PathBuf::from(url.path())),
        ),
        // Windows drive letters and "name:value" strings parse as URLs too.
        Ok(_) if value.contains("://") => Locator::Url,
        _ => Locator::Plain,
    }
}

fn is_file(value: &str) -> bool {
    value.len() <= MAX_PATH_LEN && Path::new(value).is_file()
}

/// Whether `value` names a file or URL rather than holding inline content.
pub fn names_location(value: &str) -> bool {
    match classify(value) {
        Locator::File(_) | Locator::Url => true,
        Locator::Plain => is_file(value),
    }
}

/// Whether the service at `base_url` runs on this machine, and so can read
/// local files itself.
pub fn is_localhost(base_url: &str) -> bool {
    Url::parse(base_url)
        .ok()
        .and_then(|url| url.host_str().map(|host| host == "localhost"))
        .unwrap_or(false)
}

/// Decides whether `value` is sent as embedded content (`true`) or by
/// reference (`false`) to the service at `base_url`.
pub fn is_embeddable(base_url: &str, value: &InputValue) -> Result<bool, Error> {
    let local_service = is_localhost(base_url);
    match value {
        InputValue::Content(_) => Ok(true),
        InputValue::Path(path) => {
            if path.is_file() {
                Ok(!local_service)
            } else {
                Err(Error::FileNotFound { path: path.clone() })
            }
        }
        InputValue::Literal(crate::value::LiteralValue::String(text)) => match classify(text) {
            Locator::File(path) => {
                if path.is_file() {
                    Ok(!local_service)
                } else {
                    Err(Error::FileNotFound { path })
                }
            }
            Locator::Url => Ok(false),
            Locator::Plain => {
                if is_file(text) {
                    Ok(!local_service)
                } else {
                    Ok(true)
                }
            }
        },
        InputValue::Literal(_) => Ok(true),
    }
}

/// Reads the content of `value` for embedding, returning it with the
/// encoding it was written in. Binary mimetypes, and content that is not
/// valid UTF-8, are base64 encoded.
pub fn embed(
    value: &InputValue,
    mimetype: Option<&str>,
    encoding: Option<&str>,
) -> Result<(String, String), Error> {
    let bytes = match value {
        InputValue::Content(bytes) => bytes.clone(),
        InputValue::Path(path) => read_file(path)?,
        InputValue::Literal(crate::value::LiteralValue::String(text)) => match classify(text) {
            Locator::File(path) => read_file(&path)?,
            Locator::Plain if is_file(text) => read_file(Path::new(text))?,
            _ => text.clone().into_bytes(),
        },
        InputValue::Literal(literal) => literal.to_string().into_bytes(),
    };

    let binary = mimetype.is_some_and(|mimetype| BINARY_MIMETYPES.contains(&mimetype))
        || encoding.is_some_and(|encoding| encoding.eq_ignore_ascii_case("base64"));
    if !binary {
        match String::from_utf8(bytes) {
            Ok(text) => return Ok((text, encoding.unwrap_or("utf-8").to_string())),
            Err(err) => {
                log::debug!("Content is not valid UTF-8, embedding as base64 instead.");
                return Ok((encode_base64(err.as_bytes()), "base64".to_string()));
            }
        }
    }
    Ok((encode_base64(&bytes), "base64".to_string()))
}

fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => Error::FileNotFound {
            path: path.to_owned(),
        },
        _ => Error::Io(err),
    })
}

/// Turns a bare local path into a `file://` URL; anything with a scheme is
/// returned unchanged.
pub fn fix_url(value: &str) -> String {
    if let Ok(url) = Url::parse(value) {
        if value.contains("://") || url.scheme() == "file" {
            return value.to_string();
        }
    }
    let path = Path::new(value);
    let absolute = if path.is_absolute() {
        path.to_owned()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_owned())
    };
    Url::from_file_path(&absolute)
        .map(String::from)
        .unwrap_or_else(|_| format!("file://{}", absolute.display()))
}

/// Guesses the mimetype and content encoding of `path_or_url` from its name,
/// reconciled against the mimetypes that the process input supports.
pub fn guess_mimetype(
    path_or_url: &str,
    supported: &[&str],
) -> Result<(String, Option<String>), Error> {
    let (name, encoding) = split_encoding(url_path(path_or_url));
    let guessed = guess_from_name(name);

    let Some(mut mimetype) = guessed else {
        return match supported.first() {
            Some(first) => Ok((first.to_string(), encoding)),
            None => Ok(("application/octet-stream".to_string(), encoding)),
        };
    };

    if mimetype == "application/x-netcdf"
        && path_or_url.contains("dodsC")
        && supported.contains(&DAP_MIMETYPE)
    {
        mimetype = DAP_MIMETYPE.to_string();
    } else if ZIP_MIMETYPES.contains(&mimetype.as_str()) {
        if let Some(zip) = ZIP_MIMETYPES
            .iter()
            .find(|zip| supported.contains(zip))
            .filter(|_| !supported.contains(&mimetype.as_str()))
        {
            mimetype = zip.to_string();
        }
    } else if mimetype == "application/json" && supported.contains(&"application/geo+json") {
        mimetype = "application/geo+json".to_string();
    }

    if supported.is_empty() || supported.contains(&mimetype.as_str()) {
        Ok((mimetype, encoding))
    } else {
        Err(Error::UnsupportedMimetype {
            mimetype,
            supported: supported.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// The path component of a URL, or `value` itself when it is not a URL.
fn url_path(value: &str) -> &str {
    match value.find("://") {
        Some(index) => {
            let rest = &value[index + 3..];
            let end = rest.find(['?', '#']).unwrap_or(rest.len());
            &rest[..end]
        }
        None => value,
    }
}

fn split_encoding(name: &str) -> (&str, Option<String>) {
    for (suffix, encoding) in [(".gz", "gzip"), (".bz2", "bzip2"), (".xz", "xz")] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return (stripped, Some(encoding.to_string()));
        }
    }
    (name, None)
}

fn guess_from_name(name: &str) -> Option<String> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)?;
    let known = match extension.as_str() {
        "nc" | "nc4" | "cdf" => Some("application/x-netcdf"),
        "geojson" => Some("application/geo+json"),
        "json" => Some("application/json"),
        "zip" => Some("application/zip"),
        "tif" | "tiff" => Some("image/tiff; subtype=geotiff"),
        "txt" => Some("text/plain"),
        "csv" => Some("text/csv"),
        "xml" => Some("text/xml"),
        "gml" => Some("application/gml+xml"),
        "kml" => Some("application/vnd.google-earth.kml+xml"),
        "kmz" => Some("application/vnd.google-earth.kmz"),
        "meta4" => Some("application/metalink+xml; version=4.0"),
        "metalink" => Some("application/metalink+xml; version=3.0"),
        "shp" => Some("application/x-zipped-shp"),
        _ => None,
    };
    known
        .map(str::to_string)
        .or_else(|| mime_guess::from_ext(&extension).first_raw().map(str::to_string))
}
