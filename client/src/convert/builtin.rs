use std::io::Cursor;

use anyhow::anyhow;
use tiff::{
    decoder::{Decoder, DecodingResult},
    tags::Tag,
};

#[cfg(any(feature = "gdal", feature = "netcdf"))]
use crate::value::Opaque;
use crate::{
    error::UnmetDependencyError,
    typebridge::DAP_MIMETYPE,
    value::{Raster, Value},
};

use super::{ConvertError, Converted, Converter, Source};

/// Returns the raw bytes of any output.
pub struct GenericConverter;

impl Converter for GenericConverter {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        Ok(Converted::Value(Value::Bytes(source.bytes()?)))
    }
}

pub struct TextConverter;

impl Converter for TextConverter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["text/plain"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "csv", "md", "rst"]
    }

    fn priority(&self) -> i32 {
        1
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        Ok(Converted::Value(Value::Text(source.text()?)))
    }
}

pub struct JsonConverter;

impl Converter for JsonConverter {
    fn name(&self) -> &'static str {
        "json"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["application/json"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn priority(&self) -> i32 {
        1
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let json = serde_json::from_slice(&source.bytes()?)
            .map_err(|err| ConvertError::Format(err.into()))?;
        Ok(Converted::Value(Value::Json(json)))
    }
}

const GEOJSON_TYPES: &[&str] = &[
    "Feature",
    "FeatureCollection",
    "Point",
    "MultiPoint",
    "LineString",
    "MultiLineString",
    "Polygon",
    "MultiPolygon",
    "GeometryCollection",
];

/// JSON documents whose top-level `type` is a GeoJSON object type.
pub struct GeoJsonConverter;

impl Converter for GeoJsonConverter {
    fn name(&self) -> &'static str {
        "geojson"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["application/geo+json", "application/vnd.geo+json"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["geojson"]
    }

    fn priority(&self) -> i32 {
        2
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let json: serde_json::Value = serde_json::from_slice(&source.bytes()?)
            .map_err(|err| ConvertError::Format(err.into()))?;
        let kind = json.get("type").and_then(serde_json::Value::as_str);
        match kind {
            Some(kind) if GEOJSON_TYPES.contains(&kind) => Ok(Converted::Value(Value::Json(json))),
            _ => Err(ConvertError::NotApplicable(format!(
                "{} is not a GeoJSON object",
                source.describe()
            ))),
        }
    }
}

/// Downloads the files listed in a Metalink 3 or 4 document.
pub struct MetalinkConverter;

impl Converter for MetalinkConverter {
    fn name(&self) -> &'static str {
        "metalink"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &[
            "application/metalink+xml; version=3.0",
            "application/metalink+xml; version=4.0",
            "application/metalink4+xml",
        ]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["metalink", "meta4"]
    }

    fn priority(&self) -> i32 {
        1
    }

    fn nested(&self) -> bool {
        true
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let text = source.text()?;
        let files = metalink_files(&text).map_err(|err| ConvertError::Format(err.into()))?;
        let mut paths = Vec::with_capacity(files.len());
        for (name, url) in files {
            paths.push(source.download(&url, &name)?);
        }
        Ok(Converted::Files(paths))
    }
}

/// `(name, url)` of each file in a metalink document, using the first URL
/// listed for each file.
pub(crate) fn metalink_files(text: &str) -> Result<Vec<(String, String)>, roxmltree::Error> {
    let doc = roxmltree::Document::parse(text)?;
    let files = doc
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "file")
        .filter_map(|file| {
            let url = file
                .descendants()
                .find(|node| node.is_element() && node.tag_name().name() == "url")
                .and_then(|node| node.text())
                .map(str::trim)
                .filter(|url| !url.is_empty())?;
            let name = file
                .attribute("name")
                .map(str::to_owned)
                .or_else(|| url.rsplit('/').next().map(str::to_owned))
                .unwrap_or_else(|| "output".to_string());
            Some((name, url.to_string()))
        })
        .collect();
    Ok(files)
}

/// Extracts the members of a zip archive.
pub struct ZipConverter;

impl Converter for ZipConverter {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["application/zip", "application/x-zipped-shp"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["zip"]
    }

    fn priority(&self) -> i32 {
        1
    }

    fn nested(&self) -> bool {
        true
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let bytes = source.bytes()?;
        let mut archive =
            zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| ConvertError::Format(err.into()))?;
        let dest = source.fresh_dir("unzipped")?;

        let mut paths = Vec::new();
        for index in 0..archive.len() {
            let mut member = archive
                .by_index(index)
                .map_err(|err| ConvertError::Format(err.into()))?;
            if member.is_dir() {
                continue;
            }
            let Some(name) = member.enclosed_name() else {
                log::warn!("Skipping zip member with unsafe name {:?}.", member.name());
                continue;
            };
            let path = dest.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(crate::error::Error::from)?;
            }
            let mut file = std::fs::File::create(&path).map_err(crate::error::Error::from)?;
            std::io::copy(&mut member, &mut file).map_err(crate::error::Error::from)?;
            paths.push(path);
        }
        Ok(Converted::Files(paths))
    }
}

/// Decodes PNG, JPEG and GIF images.
pub struct ImageConverter;

impl Converter for ImageConverter {
    fn name(&self) -> &'static str {
        "image"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["image/png", "image/jpeg", "image/gif"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["png", "jpg", "jpeg", "gif"]
    }

    fn priority(&self) -> i32 {
        1
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let image =
            image::load_from_memory(&source.bytes()?).map_err(|err| ConvertError::Format(err.into()))?;
        Ok(Converted::Value(Value::Image(image)))
    }
}

/// Decodes the first band of a (Geo)TIFF into a [Raster].
pub struct GeoTiffConverter;

impl Converter for GeoTiffConverter {
    fn name(&self) -> &'static str {
        "geotiff"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["image/tiff; subtype=geotiff", "image/tiff", "application/x-geotiff"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tif", "tiff"]
    }

    fn priority(&self) -> i32 {
        2
    }

    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let raster = decode_raster(source.bytes()?).map_err(ConvertError::Format)?;
        Ok(Converted::Value(Value::Raster(raster)))
    }
}

fn decode_raster(bytes: Vec<u8>) -> anyhow::Result<Raster> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?;
    let (width, height) = decoder.dimensions()?;

    let samples: Vec<f64> = match decoder.read_image()? {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => return Err(anyhow!("unsupported TIFF sample format")),
    };

    let pixels = width as usize * height as usize;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(anyhow!(
            "{} samples do not fit a {width}x{height} image",
            samples.len()
        ));
    }
    // Keep the first band of interleaved samples.
    let bands = samples.len() / pixels;
    let samples = samples.into_iter().step_by(bands).collect();

    Ok(Raster {
        width,
        height,
        samples,
        transform: read_geotransform(&mut decoder),
    })
}

/// `[origin_x, origin_y, pixel_width, pixel_height]` from the model pixel
/// scale and tiepoint tags.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<[f64; 4]> {
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(33550)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(33922)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    Some([
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
        -scale[1],
    ])
}

/// Opens rasters with GDAL. Needs the `gdal` feature.
pub struct GdalConverter;

impl Converter for GdalConverter {
    fn name(&self) -> &'static str {
        "gdal"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["image/tiff; subtype=geotiff", "application/x-geotiff"]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tif", "tiff"]
    }

    fn priority(&self) -> i32 {
        3
    }

    fn check_dependencies(&self) -> Result<(), UnmetDependencyError> {
        if cfg!(feature = "gdal") {
            Ok(())
        } else {
            Err(UnmetDependencyError {
                converter: self.name(),
                dependency: "gdal (build with the `gdal` feature)".into(),
            })
        }
    }

    #[cfg(feature = "gdal")]
    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let path = source.path()?;
        let dataset = gdal::Dataset::open(&path).map_err(|err| ConvertError::Format(err.into()))?;
        Ok(Converted::Value(Value::Object(Opaque::new(dataset))))
    }

    #[cfg(not(feature = "gdal"))]
    fn convert(&self, _source: &Source<'_>) -> Result<Converted, ConvertError> {
        Err(self.check_dependencies().err().map_or_else(
            || ConvertError::NotApplicable("gdal is unavailable".into()),
            ConvertError::UnmetDependency,
        ))
    }
}

/// Opens netCDF files, or streams them over OPeNDAP. Needs the `netcdf`
/// feature.
pub struct NetCdfConverter;

impl Converter for NetCdfConverter {
    fn name(&self) -> &'static str {
        "netcdf"
    }

    fn mimetypes(&self) -> &'static [&'static str] {
        &["application/x-netcdf", DAP_MIMETYPE]
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["nc"]
    }

    fn priority(&self) -> i32 {
        1
    }

    fn check_dependencies(&self) -> Result<(), UnmetDependencyError> {
        if cfg!(feature = "netcdf") {
            Ok(())
        } else {
            Err(UnmetDependencyError {
                converter: self.name(),
                dependency: "netcdf (build with the `netcdf` feature)".into(),
            })
        }
    }

    #[cfg(feature = "netcdf")]
    fn convert(&self, source: &Source<'_>) -> Result<Converted, ConvertError> {
        let file = match source.opendap_url() {
            Some(url) => netcdf::open(url),
            None => netcdf::open(source.path()?),
        }
        .map_err(|err| ConvertError::Format(err.into()))?;
        Ok(Converted::Value(Value::Object(Opaque::new(file))))
    }

    #[cfg(not(feature = "netcdf"))]
    fn convert(&self, _source: &Source<'_>) -> Result<Converted, ConvertError> {
        Err(self.check_dependencies().err().map_or_else(
            || ConvertError::NotApplicable("netcdf is unavailable".into()),
            ConvertError::UnmetDependency,
        ))
    }
}
