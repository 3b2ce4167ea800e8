//! Staging images between disk and the matrix arena.
//!
//! ## Loading
//!
//! [`StorageAdapter::load`] decodes any format the `image` crate has compiled
//! in (JPEG, PNG, TIFF, WebP, BMP), sniffing the format from content rather
//! than trusting the extension. EXIF orientation is applied on the way in,
//! so a portrait phone photo decodes upright regardless of how the sensor
//! stored it.
//!
//! ## Storing
//!
//! The output format is chosen from the destination extension:
//!
//! | Extension | Encoding |
//! |---|---|
//! | `png` | PNG, lossless |
//! | `jpg`, `jpeg` | JPEG at the configured quality (alpha dropped) |
//! | `tif`, `tiff` | TIFF, lossless |
//! | `bmp` | BMP |
//! | `webp` | WebP, lossless |
//!
//! Writes never leave a partial file at the destination. Bytes go to a
//! temporary file in the destination directory which is then renamed over
//! the target. A rename within one directory is atomic, so concurrent writers
//! to the same path end with exactly one complete file (the last rename
//! wins) and a crash mid-encode leaves the previous file untouched.
//!
//! [`StorageAdapter::store_all`] extends this to several outputs of one
//! request: every image is encoded before any target is replaced, so a
//! failed encode leaves none of them behind.

use crate::error::{BridgeError, Result};
use crate::imaging::Quality;
use crate::matrix::{MatrixArena, MatrixHandle};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

/// Encodings supported for output paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Jpeg,
    Tiff,
    Bmp,
    WebP,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "tif" | "tiff" => Some(Self::Tiff),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Tiff => ImageFormat::Tiff,
            Self::Bmp => ImageFormat::Bmp,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

/// Extensions accepted by [`ImagePath::input`] when scanning directories.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp", "bmp"];

/// A filesystem location that has passed validation for its role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ImagePath(PathBuf);

impl ImagePath {
    /// Validate an input: it must name an existing regular file.
    ///
    /// Readability is only known once the file is opened, so unreadable
    /// files surface as `PermissionError` from [`StorageAdapter::load`].
    pub fn input(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(BridgeError::invalid_parameter("input path is empty"));
        }
        let meta = fs::metadata(&path).map_err(|e| BridgeError::from_read(&path, e))?;
        if meta.is_dir() {
            return Err(BridgeError::invalid_parameter(format!(
                "illegal operation on a directory: {}",
                path.display()
            )));
        }
        Ok(Self(path))
    }

    /// Validate an output: non-empty, with an extension naming a supported
    /// encoding. Missing parent directories are created at store time.
    pub fn output(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(BridgeError::invalid_parameter("output path is empty"));
        }
        if OutputFormat::from_path(&path).is_none() {
            return Err(BridgeError::invalid_parameter(format!(
                "unsupported output format: {}",
                path.display()
            )));
        }
        if path.is_dir() {
            return Err(BridgeError::invalid_parameter(format!(
                "output path is a directory: {}",
                path.display()
            )));
        }
        Ok(Self(path))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    fn format(&self) -> OutputFormat {
        // Only `output` paths reach `store`, and those always carry a format.
        OutputFormat::from_path(&self.0).unwrap_or(OutputFormat::Png)
    }
}

impl AsRef<Path> for ImagePath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ImagePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// A terminal output that has been fully written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Companion edge map written by edge detection requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_map: Option<PathBuf>,
}

/// Reads and writes images for one bridge instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageAdapter {
    jpeg_quality: Quality,
}

impl StorageAdapter {
    pub fn new(jpeg_quality: Quality) -> Self {
        Self { jpeg_quality }
    }

    /// Decode `path` into a new matrix owned by `arena`.
    #[instrument(skip_all, fields(path = %path))]
    pub fn load(&self, arena: &mut MatrixArena, path: &ImagePath) -> Result<MatrixHandle> {
        let image = decode(path.as_path())?;
        debug!(
            width = image.width(),
            height = image.height(),
            "decoded"
        );
        Ok(arena.insert(image))
    }

    /// Encode the matrix behind `handle` to `path`, replacing any existing file.
    ///
    /// Does not release `handle`; ownership stays with the caller.
    #[instrument(skip_all, fields(path = %path, handle = %handle))]
    pub fn store(
        &self,
        arena: &MatrixArena,
        handle: MatrixHandle,
        path: &ImagePath,
    ) -> Result<StoredImage> {
        let staged = self.stage(arena, handle, path)?;
        let stored = staged.commit()?;
        debug!("stored");
        Ok(stored)
    }

    /// Store several matrices as one unit: either every target is written or
    /// none is.
    ///
    /// All images are encoded into temp files first. If replacing a target
    /// then fails, targets already replaced by this call are removed again.
    /// Results come back in the order of `outputs`.
    #[instrument(skip_all, fields(outputs = outputs.len()))]
    pub fn store_all(
        &self,
        arena: &MatrixArena,
        outputs: &[(MatrixHandle, &ImagePath)],
    ) -> Result<Vec<StoredImage>> {
        let staged = outputs
            .iter()
            .map(|&(handle, path)| self.stage(arena, handle, path))
            .collect::<Result<Vec<_>>>()?;

        let mut stored: Vec<StoredImage> = Vec::with_capacity(staged.len());
        for file in staged {
            match file.commit() {
                Ok(image) => stored.push(image),
                Err(err) => {
                    for done in &stored {
                        if let Err(e) = fs::remove_file(&done.path) {
                            warn!(path = %done.path.display(), error = %e, "could not roll back output");
                        }
                    }
                    return Err(err);
                }
            }
        }
        debug!("stored all");
        Ok(stored)
    }

    /// Encode into a temp file next to `path`. Dropping the result deletes it.
    fn stage<'a>(
        &self,
        arena: &MatrixArena,
        handle: MatrixHandle,
        path: &'a ImagePath,
    ) -> Result<Staged<'a>> {
        let image = arena
            .get(handle)
            .map_err(|e| BridgeError::EncodeError(e.to_string()))?;
        let target = path.as_path();
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| BridgeError::write(dir, e))?;

        let mut file = tempfile::Builder::new()
            .prefix(".imgbridge-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| BridgeError::write(dir, e))?;

        {
            let mut writer = BufWriter::new(file.as_file_mut());
            encode(image, path.format(), self.jpeg_quality, &mut writer)?;
            writer.flush().map_err(|e| BridgeError::write(target, e))?;
        }

        Ok(Staged {
            file,
            path,
            width: image.width(),
            height: image.height(),
        })
    }
}

/// A fully encoded image waiting to be renamed over its target.
struct Staged<'a> {
    file: NamedTempFile,
    path: &'a ImagePath,
    width: u32,
    height: u32,
}

impl Staged<'_> {
    fn commit(self) -> Result<StoredImage> {
        let target = self.path.as_path();
        self.file
            .persist(target)
            .map_err(|e| BridgeError::write(target, e.error))?;
        Ok(StoredImage {
            path: target.to_path_buf(),
            width: self.width,
            height: self.height,
            edge_map: None,
        })
    }
}

fn decode_error(path: &Path, err: image::ImageError) -> BridgeError {
    match err {
        image::ImageError::IoError(io) => BridgeError::from_read(path, io),
        other => BridgeError::DecodeError {
            path: path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

/// Decode a file and rotate/flip it upright according to its EXIF orientation.
fn decode(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| BridgeError::from_read(path, e))?
        .with_guessed_format()
        .map_err(|e| BridgeError::from_read(path, e))?;
    if reader.format().is_none() {
        return Err(BridgeError::DecodeError {
            path: path.to_path_buf(),
            reason: "not a supported image encoding".into(),
        });
    }
    let mut decoder = reader.into_decoder().map_err(|e| decode_error(path, e))?;
    let orientation = decoder.orientation().map_err(|e| decode_error(path, e))?;
    let mut image = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Narrow the pixel layout to one the target encoder accepts.
fn prepare(image: &DynamicImage, format: OutputFormat) -> Cow<'_, DynamicImage> {
    let color = image.color();
    match format {
        OutputFormat::Png => match color {
            ColorType::Rgb32F | ColorType::Rgba32F => {
                Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
            }
            _ => Cow::Borrowed(image),
        },
        OutputFormat::Jpeg => match color {
            ColorType::L8 | ColorType::Rgb8 => Cow::Borrowed(image),
            ColorType::La8 | ColorType::L16 | ColorType::La16 => {
                Cow::Owned(DynamicImage::ImageLuma8(image.to_luma8()))
            }
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        OutputFormat::Tiff => match color {
            ColorType::L8 | ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(image),
            _ => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        },
        OutputFormat::Bmp => match color {
            ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => {
                Cow::Borrowed(image)
            }
            _ => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        },
        OutputFormat::WebP => match color {
            ColorType::Rgb8 | ColorType::Rgba8 => Cow::Borrowed(image),
            _ => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        },
    }
}

fn encode<W: Write + std::io::Seek>(
    image: &DynamicImage,
    format: OutputFormat,
    quality: Quality,
    writer: &mut W,
) -> Result<()> {
    let prepared = prepare(image, format);
    let result = match format {
        OutputFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(writer, quality.value());
            prepared.write_with_encoder(encoder)
        }
        other => prepared.write_to(writer, other.image_format()),
    };
    result.map_err(|e| BridgeError::EncodeError(format!("{format:?} encode failed: {e}")))
}
