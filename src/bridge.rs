//! The caller-facing entry points.
//!
//! A [`Bridge`] owns a transform engine, a [`StorageAdapter`], a
//! [`ResourceLocator`] for `bundle:` inputs and a rayon pool. Each submitted
//! request becomes one unit of work on that pool:
//!
//! ```text
//! resolve inputs → load → pipeline → store (optional) → complete
//! ```
//!
//! Every unit gets its own [`MatrixArena`], so handles never cross threads
//! and no handle state is locked. The filesystem is the only shared
//! resource; see [`crate::storage`] for how concurrent writes to one path
//! are kept whole.
//!
//! Results come back through a single-fire [`Pending`]. A caller that drops
//! its `Pending` does not cancel anything: the unit still runs to the end
//! and releases every matrix it allocated.

use crate::config::{BridgeConfig, ResourcesConfig, effective_threads};
use crate::dispatch::{self, Payload, Pending, Response};
use crate::error::{BridgeError, Failure, Result};
use crate::imaging::{PixelLayout, Quality, RustEngine, TransformEngine};
use crate::matrix::{MatrixArena, MatrixHandle};
use crate::pipeline::{Operation, Outcome, Pipeline};
use crate::request::{BatchTemplate, ImageSource, Request, Step};
use crate::storage::{ImagePath, SUPPORTED_EXTENSIONS, StorageAdapter};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Finds bundled resources by name.
pub trait ResourceLocator: Send + Sync {
    /// Path of the resource `name`, trying `extension` if given and the
    /// locator's defaults otherwise. `None` if nothing matches.
    fn locate(&self, name: &str, extension: Option<&str>) -> Option<PathBuf>;
}

/// Resources stored as plain files under one directory.
#[derive(Debug, Clone)]
pub struct BundleDirectory {
    root: PathBuf,
    extensions: Vec<String>,
}

impl BundleDirectory {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    pub fn from_config(resources: &ResourcesConfig) -> Self {
        Self::new(&resources.bundle_dir, resources.extensions.clone())
    }
}

/// Bundle names are relative and stay inside the bundle root.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

impl ResourceLocator for BundleDirectory {
    fn locate(&self, name: &str, extension: Option<&str>) -> Option<PathBuf> {
        if !is_plain_name(name) {
            return None;
        }
        let candidate = |ext: &str| {
            let path = self.root.join(format!("{name}.{ext}"));
            path.is_file().then_some(path)
        };
        match extension {
            Some(ext) => candidate(ext),
            None => self.extensions.iter().find_map(|ext| candidate(ext)),
        }
    }
}

/// One file processed by [`Bridge::batch`].
#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub source: PathBuf,
    /// `None` if the worker died before completing.
    pub response: Option<Response>,
}

/// Settings for [`Bridge::detect_edges`].
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeOptions {
    pub low: f32,
    pub high: f32,
    /// Gaussian kernel applied before Canny.
    pub blur: Option<u32>,
    /// Second output for the inverted edge map.
    pub edge_map: Option<PathBuf>,
}

impl EdgeOptions {
    pub fn new(low: f32, high: f32) -> Self {
        Self {
            low,
            high,
            blur: None,
            edge_map: None,
        }
    }

    pub fn blur(mut self, radius: u32) -> Self {
        self.blur = Some(radius);
        self
    }

    pub fn edge_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.edge_map = Some(path.into());
        self
    }

    /// Steps that turn the input into the binary edge image.
    fn steps(&self) -> Vec<Step> {
        let blur = self.blur.map(|radius| Step::Blur { radius });
        blur.into_iter()
            .chain([Step::EdgeDetect {
                low: self.low,
                high: self.high,
            }])
            .collect()
    }

    fn operations(&self) -> Vec<Operation> {
        let blur = self.blur.map(|radius| Operation::Blur { radius });
        blur.into_iter()
            .chain([Operation::EdgeDetect {
                low: self.low,
                high: self.high,
            }])
            .collect()
    }
}

/// Units of work the pool runs.
#[derive(Debug)]
enum Job {
    Run(Request),
    /// Edge detection that also writes the inverted edge map.
    EdgesWithMap {
        input: ImageSource,
        output: PathBuf,
        edge_map: PathBuf,
        ops: Vec<Operation>,
    },
}

impl Job {
    fn input(&self) -> &ImageSource {
        match self {
            Self::Run(request) => &request.input,
            Self::EdgesWithMap { input, .. } => input,
        }
    }
}

struct Shared<E> {
    engine: E,
    storage: StorageAdapter,
    locator: Box<dyn ResourceLocator>,
}

/// Entry point for image requests.
pub struct Bridge<E = RustEngine> {
    shared: Arc<Shared<E>>,
    pool: ThreadPool,
}

impl Bridge<RustEngine> {
    /// A bridge using the pure Rust engine and settings from `config`.
    pub fn from_config(config: &BridgeConfig) -> std::result::Result<Self, ThreadPoolBuildError> {
        Self::with_engine(RustEngine::new(), config)
    }
}

impl<E: TransformEngine + Send + 'static> Bridge<E> {
    pub fn with_engine(
        engine: E,
        config: &BridgeConfig,
    ) -> std::result::Result<Self, ThreadPoolBuildError> {
        Self::with_parts(
            engine,
            StorageAdapter::new(Quality::new(config.encoding.jpeg_quality)),
            Box::new(BundleDirectory::from_config(&config.resources)),
            effective_threads(&config.processing),
        )
    }

    pub fn with_parts(
        engine: E,
        storage: StorageAdapter,
        locator: Box<dyn ResourceLocator>,
        threads: usize,
    ) -> std::result::Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("imgbridge-{i}"))
            .build()?;
        debug!(threads, "bridge pool ready");
        Ok(Self {
            shared: Arc::new(Shared {
                engine,
                storage,
                locator,
            }),
            pool,
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Decode `source` and report its columns, rows and channel count.
    pub fn image_info(&self, source: impl Into<ImageSource>) -> Pending {
        self.submit(Request::new(source))
    }

    pub fn blur(
        &self,
        input: impl Into<ImageSource>,
        output: impl Into<PathBuf>,
        radius: u32,
    ) -> Pending {
        self.submit(
            Request::new(input)
                .step(Step::Blur { radius })
                .output(output),
        )
    }

    /// Canny edge detection, optionally after a Gaussian blur.
    ///
    /// Without an edge map the binary edge image is written to `output`. With
    /// one, `output` receives the original with edges painted green and the
    /// edge map path receives the inverted edge image (black edges on white).
    /// Both files are written or neither is.
    pub fn detect_edges(
        &self,
        input: impl Into<ImageSource>,
        output: impl Into<PathBuf>,
        options: EdgeOptions,
    ) -> Pending {
        let input = input.into();
        let output = output.into();
        match &options.edge_map {
            None => self.submit(Request {
                input,
                steps: options.steps(),
                output: Some(output),
            }),
            Some(edge_map) => self.dispatch(Job::EdgesWithMap {
                input,
                output,
                edge_map: edge_map.clone(),
                ops: options.operations(),
            }),
        }
    }

    pub fn crop(
        &self,
        input: impl Into<ImageSource>,
        output: impl Into<PathBuf>,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    ) -> Pending {
        self.submit(
            Request::new(input)
                .step(Step::Crop {
                    x,
                    y,
                    width,
                    height,
                })
                .output(output),
        )
    }

    /// Composite `first` over `second`. Both must share width, height and
    /// channel count.
    pub fn combine(
        &self,
        first: impl Into<ImageSource>,
        second: impl Into<ImageSource>,
        output: impl Into<PathBuf>,
    ) -> Pending {
        self.submit(
            Request::new(first)
                .step(Step::Combine {
                    with: second.into(),
                })
                .output(output),
        )
    }

    pub fn convert(
        &self,
        input: impl Into<ImageSource>,
        output: impl Into<PathBuf>,
        layout: PixelLayout,
    ) -> Pending {
        self.submit(
            Request::new(input)
                .step(Step::Convert { layout })
                .output(output),
        )
    }

    /// Queue `request` on the pool.
    pub fn submit(&self, request: Request) -> Pending {
        self.dispatch(Job::Run(request))
    }

    /// Run `request` on the calling thread.
    pub fn execute(&self, request: &Request) -> Response {
        let mut arena = MatrixArena::new();
        self.shared.respond(&mut arena, &Job::Run(request.clone()))
    }

    /// Apply `template` to every supported image under `dir`, mirroring the
    /// directory layout into `out_dir`. Files run concurrently on the pool;
    /// results come back in path order.
    pub fn batch(
        &self,
        dir: &Path,
        out_dir: &Path,
        template: &BatchTemplate,
    ) -> Result<Vec<BatchItem>> {
        let meta = fs::metadata(dir).map_err(|e| BridgeError::from_read(dir, e))?;
        if !meta.is_dir() {
            return Err(BridgeError::invalid_parameter(format!(
                "batch source is not a directory: {}",
                dir.display()
            )));
        }

        let sources = collect_images(dir)?;
        info!(dir = %dir.display(), files = sources.len(), "batch started");

        let pending: Vec<(PathBuf, Pending)> = sources
            .into_iter()
            .map(|source| {
                let output = batch_output(dir, out_dir, &source, template.extension.as_deref());
                let request = Request {
                    input: ImageSource::Path(source.clone()),
                    steps: template.steps.clone(),
                    output: Some(output),
                };
                (source, self.submit(request))
            })
            .collect();

        Ok(pending
            .into_iter()
            .map(|(source, pending)| BatchItem {
                source,
                response: pending.wait(),
            })
            .collect())
    }

    fn dispatch(&self, job: Job) -> Pending {
        let (completer, pending) = dispatch::channel();
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || {
            let mut arena = MatrixArena::new();
            let response = shared.respond(&mut arena, &job);
            if let Err(err) = completer.complete(response) {
                warn!(error = %err, "duplicate completion ignored");
            }
        });
        pending
    }
}

fn collect_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            BridgeError::from_read(&path, e.into())
        })?;
        if entry.file_type().is_file() && has_supported_extension(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `out_dir` + the source's path relative to `dir`, with the extension
/// swapped if one is given.
fn batch_output(dir: &Path, out_dir: &Path, source: &Path, extension: Option<&str>) -> PathBuf {
    let relative = source.strip_prefix(dir).unwrap_or(source);
    let target = out_dir.join(relative);
    match extension {
        Some(ext) => target.with_extension(ext.trim_start_matches('.')),
        None => target,
    }
}

impl<E: TransformEngine> Shared<E> {
    /// Run one job and turn its result into a response. Every matrix the job
    /// allocated in `arena` is released by the time this returns.
    fn respond(&self, arena: &mut MatrixArena, job: &Job) -> Response {
        let result = self.process(arena, job);
        if arena.live_count() != 0 {
            warn!(live = arena.live_count(), "request left matrices allocated");
        }
        match result {
            Ok(payload) => {
                info!(input = %job.input(), "request complete");
                Ok(payload)
            }
            Err(err) => {
                warn!(input = %job.input(), code = %err.code(), error = %err, "request failed");
                Err(Failure::from(&err))
            }
        }
    }

    fn process(&self, arena: &mut MatrixArena, job: &Job) -> Result<Payload> {
        match job {
            Job::Run(request) => self.run_request(arena, request),
            Job::EdgesWithMap {
                input,
                output,
                edge_map,
                ops,
            } => {
                let output = ImagePath::output(output)?;
                let edge_map = ImagePath::output(edge_map)?;
                let input = self.resolve(input)?;
                let original = self.storage.load(arena, &input)?;
                let result = self.edges_with_map(arena, original, ops, &output, &edge_map);
                arena.release(original)?;
                result
            }
        }
    }

    fn resolve(&self, source: &ImageSource) -> Result<ImagePath> {
        match source {
            ImageSource::Path(path) => ImagePath::input(path),
            ImageSource::Bundle(name) => {
                let (stem, extension) = match Path::new(name).extension().and_then(|e| e.to_str())
                {
                    Some(ext) => (
                        name.strip_suffix(&format!(".{ext}")).unwrap_or(name),
                        Some(ext),
                    ),
                    None => (name.as_str(), None),
                };
                let path = self
                    .locator
                    .locate(stem, extension)
                    .ok_or_else(|| BridgeError::NotFound(PathBuf::from(source.to_string())))?;
                debug!(bundle = %name, path = %path.display(), "resolved bundle resource");
                ImagePath::input(path)
            }
        }
    }

    fn run_request(&self, arena: &mut MatrixArena, request: &Request) -> Result<Payload> {
        // Reject bad paths before any decoding happens.
        let output = request.output.as_ref().map(ImagePath::output).transpose()?;
        let input = self.resolve(&request.input)?;

        let mut partners = Vec::new();
        let result = self.load_and_run(arena, request, &input, output, &mut partners);
        for handle in partners {
            arena.release(handle)?;
        }
        result
    }

    /// Handles loaded for `Combine` steps are pushed to `partners`; the
    /// caller releases them whatever happens here.
    fn load_and_run(
        &self,
        arena: &mut MatrixArena,
        request: &Request,
        input: &ImagePath,
        output: Option<ImagePath>,
        partners: &mut Vec<MatrixHandle>,
    ) -> Result<Payload> {
        let mut ops = Vec::with_capacity(request.steps.len());
        for step in &request.steps {
            let op = step.operation(|source| {
                let path = self.resolve(source)?;
                let handle = self.storage.load(arena, &path)?;
                partners.push(handle);
                Ok(handle)
            })?;
            ops.push(op);
        }

        let mut pipeline = Pipeline::new(ops);
        if let Some(output) = output {
            pipeline = pipeline.with_output(output);
        }

        let handle = self.storage.load(arena, input)?;
        match pipeline.run(arena, &self.engine, &self.storage, handle)? {
            Outcome::Stored(stored) => Ok(Payload::Stored(stored)),
            Outcome::Matrix(result) => {
                let info = arena.describe(result);
                arena.release(result)?;
                Ok(Payload::Matrix(info?))
            }
        }
    }

    /// Borrows `original`; everything else allocated here is released.
    fn edges_with_map(
        &self,
        arena: &mut MatrixArena,
        original: MatrixHandle,
        ops: &[Operation],
        output: &ImagePath,
        edge_map: &ImagePath,
    ) -> Result<Payload> {
        let claimed = arena.retain(original)?;
        let edges = Pipeline::new(ops.to_vec()).transform(arena, &self.engine, claimed)?;
        let result = self.write_edge_outputs(arena, original, edges, output, edge_map);
        arena.release(edges)?;
        result
    }

    /// Paint and invert in memory, then store both images as one unit.
    fn write_edge_outputs(
        &self,
        arena: &mut MatrixArena,
        original: MatrixHandle,
        edges: MatrixHandle,
        output: &ImagePath,
        edge_map: &ImagePath,
    ) -> Result<Payload> {
        let claimed = arena.retain(edges)?;
        let inverted =
            Pipeline::new(vec![Operation::Invert]).transform(arena, &self.engine, claimed)?;

        let painted = match self.paint_outline(arena, original, edges) {
            Ok(handle) => handle,
            Err(err) => {
                arena.release(inverted)?;
                return Err(err);
            }
        };

        let stored = self
            .storage
            .store_all(arena, &[(painted, output), (inverted, edge_map)]);
        arena.release(painted)?;
        arena.release(inverted)?;

        let mut stored = stored?.into_iter().next().ok_or_else(|| {
            BridgeError::EncodeError("no output stored for edge detection".into())
        })?;
        stored.edge_map = Some(edge_map.as_path().to_path_buf());
        Ok(Payload::Stored(stored))
    }

    fn paint_outline(
        &self,
        arena: &mut MatrixArena,
        original: MatrixHandle,
        edges: MatrixHandle,
    ) -> Result<MatrixHandle> {
        let painted = self
            .engine
            .outline(arena.get(original)?, arena.get(edges)?)?;
        Ok(arena.insert(painted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::imaging::engine::tests::{MockEngine, RecordedOp};
    use crate::storage::StoredImage;
    use crate::test_helpers::{create_test_jpeg, create_test_png};
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn shared<E: TransformEngine>(engine: E, bundle: &Path) -> Shared<E> {
        Shared {
            engine,
            storage: StorageAdapter::default(),
            locator: Box::new(BundleDirectory::new(bundle, vec!["png".into(), "jpg".into()])),
        }
    }

    fn bridge(bundle: &Path) -> Bridge {
        Bridge::with_parts(
            RustEngine::new(),
            StorageAdapter::default(),
            Box::new(BundleDirectory::new(bundle, vec!["png".into(), "jpg".into()])),
            2,
        )
        .unwrap()
    }

    fn stored(response: Option<Response>) -> StoredImage {
        match response {
            Some(Ok(Payload::Stored(stored))) => stored,
            other => panic!("expected stored payload, got {other:?}"),
        }
    }

    fn failure_code(response: Option<Response>) -> ErrorCode {
        match response {
            Some(Err(failure)) => failure.code,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    // =========================================================================
    // Bundle lookup
    // =========================================================================

    #[test]
    fn bundle_finds_by_explicit_and_default_extension() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("logo.png"), 4, 4);
        create_test_jpeg(&tmp.path().join("photo.jpg"), 4, 4);
        let bundle = BundleDirectory::new(tmp.path(), vec!["png".into(), "jpg".into()]);

        assert_eq!(
            bundle.locate("logo", Some("png")),
            Some(tmp.path().join("logo.png"))
        );
        assert_eq!(bundle.locate("photo", None), Some(tmp.path().join("photo.jpg")));
        assert_eq!(bundle.locate("logo", Some("jpg")), None);
        assert_eq!(bundle.locate("missing", None), None);
    }

    #[test]
    fn bundle_rejects_escaping_names() {
        let tmp = TempDir::new().unwrap();
        let inner = tmp.path().join("assets");
        create_test_png(&tmp.path().join("secret.png"), 2, 2);
        let bundle = BundleDirectory::new(&inner, vec!["png".into()]);

        assert_eq!(bundle.locate("../secret", None), None);
        assert_eq!(bundle.locate("", None), None);
    }

    #[test]
    fn bundle_miss_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let response = shared.respond(&mut arena, &Job::Run(Request::new("bundle:nothing.png")));

        let failure = response.unwrap_err();
        assert_eq!(failure.code, ErrorCode::NotFound);
        assert!(failure.message.contains("bundle:nothing.png"));
    }

    #[test]
    fn bundle_name_with_dots_keeps_full_stem() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("frame.v2.png"), 3, 3);
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let response = shared.respond(&mut arena, &Job::Run(Request::new("bundle:frame.v2.png")));

        assert!(matches!(response, Ok(Payload::Matrix(info)) if info.cols == 3));
    }

    // =========================================================================
    // Request processing (synchronous, arena visible)
    // =========================================================================

    #[test]
    fn info_request_describes_image_and_frees_it() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.jpg");
        create_test_jpeg(&photo, 640, 480);
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let response = shared.respond(&mut arena, &Job::Run(Request::new(photo.as_path())));

        let Ok(Payload::Matrix(info)) = response else {
            panic!("expected matrix payload, got {response:?}");
        };
        assert_eq!((info.cols, info.rows, info.channels), (640, 480, 3));
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn combine_partners_are_released_after_success() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("a.png"), 16, 16);
        create_test_png(&tmp.path().join("b.png"), 16, 16);
        let engine = MockEngine::new();
        let shared = shared(engine, tmp.path());
        let mut arena = MatrixArena::new();

        let request = Request::new(tmp.path().join("a.png"))
            .step(Step::Combine {
                with: "bundle:b".into(),
            })
            .step(Step::Invert)
            .output(tmp.path().join("out.png"));
        let response = shared.respond(&mut arena, &Job::Run(request));

        assert!(matches!(response, Ok(Payload::Stored(_))));
        assert_eq!(
            shared.engine.get_operations(),
            vec![RecordedOp::Combine, RecordedOp::Invert]
        );
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn missing_combine_partner_frees_everything() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("a.png"), 8, 8);
        create_test_png(&tmp.path().join("b.png"), 8, 8);
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let request = Request::new(tmp.path().join("a.png"))
            .step(Step::Combine {
                with: "bundle:b".into(),
            })
            .step(Step::Combine {
                with: "bundle:c".into(),
            });
        let failure = shared.respond(&mut arena, &Job::Run(request)).unwrap_err();

        assert_eq!(failure.code, ErrorCode::NotFound);
        assert!(shared.engine.get_operations().is_empty());
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn engine_failure_frees_everything_and_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        create_test_png(&tmp.path().join("a.png"), 8, 8);
        let shared = shared(MockEngine::failing_on("blur"), tmp.path());
        let mut arena = MatrixArena::new();
        let output = tmp.path().join("out.png");

        let request = Request::new(tmp.path().join("a.png"))
            .step(Step::Blur { radius: 3 })
            .output(&output);
        let failure = shared.respond(&mut arena, &Job::Run(request)).unwrap_err();

        assert_eq!(failure.code, ErrorCode::EncodeError);
        assert_eq!(arena.live_count(), 0);
        assert!(!output.exists());
    }

    #[test]
    fn bad_output_extension_fails_before_decoding() {
        let tmp = TempDir::new().unwrap();
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        // Input does not even exist; the output check comes first.
        let request = Request::new(tmp.path().join("missing.png")).output("out.gif");
        let failure = shared.respond(&mut arena, &Job::Run(request)).unwrap_err();

        assert_eq!(failure.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn directory_input_is_invalid_parameter() {
        let tmp = TempDir::new().unwrap();
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let failure = shared
            .respond(&mut arena, &Job::Run(Request::new(tmp.path())))
            .unwrap_err();
        assert_eq!(failure.code, ErrorCode::InvalidParameter);
    }

    #[test]
    fn edges_with_map_writes_both_outputs() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 64, 48);
        let shared = shared(RustEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let job = Job::EdgesWithMap {
            input: photo.as_path().into(),
            output: tmp.path().join("outlined.png"),
            edge_map: tmp.path().join("edges.png"),
            ops: EdgeOptions::new(20.0, 60.0).operations(),
        };
        let response = shared.respond(&mut arena, &job);

        let Ok(Payload::Stored(stored)) = response else {
            panic!("expected stored payload, got {response:?}");
        };
        assert_eq!((stored.width, stored.height), (64, 48));
        assert_eq!(stored.edge_map, Some(tmp.path().join("edges.png")));
        assert_eq!(
            image::image_dimensions(tmp.path().join("edges.png")).unwrap(),
            (64, 48)
        );
        assert!(tmp.path().join("outlined.png").exists());
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn edges_with_bad_thresholds_frees_original() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 16, 16);
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let job = Job::EdgesWithMap {
            input: photo.as_path().into(),
            output: tmp.path().join("outlined.png"),
            edge_map: tmp.path().join("edges.png"),
            ops: EdgeOptions::new(90.0, 10.0).operations(),
        };
        let failure = shared.respond(&mut arena, &job).unwrap_err();

        assert_eq!(failure.code, ErrorCode::InvalidParameter);
        assert_eq!(arena.live_count(), 0);
        assert!(!tmp.path().join("edges.png").exists());
        assert!(!tmp.path().join("outlined.png").exists());
    }

    #[test]
    fn edges_with_unwritable_output_leaves_no_edge_map() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 16, 16);
        let blocker = tmp.path().join("blocker");
        fs::write(&blocker, b"").unwrap();
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let job = Job::EdgesWithMap {
            input: photo.as_path().into(),
            output: blocker.join("outlined.png"),
            edge_map: tmp.path().join("edges.png"),
            ops: EdgeOptions::new(20.0, 60.0).operations(),
        };
        let failure = shared.respond(&mut arena, &job).unwrap_err();

        assert_eq!(failure.code, ErrorCode::WriteError);
        assert!(!tmp.path().join("edges.png").exists());
        assert_eq!(arena.live_count(), 0);
    }

    #[test]
    fn edges_with_failing_outline_frees_everything() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 16, 16);
        let shared = shared(MockEngine::failing_on("outline"), tmp.path());
        let mut arena = MatrixArena::new();

        let job = Job::EdgesWithMap {
            input: photo.as_path().into(),
            output: tmp.path().join("outlined.png"),
            edge_map: tmp.path().join("edges.png"),
            ops: EdgeOptions::new(20.0, 60.0).operations(),
        };
        shared.respond(&mut arena, &job).unwrap_err();

        assert_eq!(arena.live_count(), 0);
        assert!(!tmp.path().join("edges.png").exists());
        assert!(!tmp.path().join("outlined.png").exists());
    }

    #[test]
    fn edges_blur_runs_before_canny() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 16, 16);
        let shared = shared(MockEngine::new(), tmp.path());
        let mut arena = MatrixArena::new();

        let job = Job::EdgesWithMap {
            input: photo.as_path().into(),
            output: tmp.path().join("outlined.png"),
            edge_map: tmp.path().join("edges.png"),
            ops: EdgeOptions::new(20.0, 60.0).blur(5).operations(),
        };
        shared.respond(&mut arena, &job).unwrap();

        assert_eq!(
            shared.engine.get_operations(),
            vec![
                RecordedOp::Blur(5),
                RecordedOp::DetectEdges(20.0, 60.0),
                RecordedOp::Invert,
                RecordedOp::Outline,
            ]
        );
    }

    #[test]
    fn edge_options_without_map_build_a_request() {
        let options = EdgeOptions::new(50.0, 150.0).blur(3);
        assert_eq!(
            options.steps(),
            vec![
                Step::Blur { radius: 3 },
                Step::EdgeDetect {
                    low: 50.0,
                    high: 150.0
                },
            ]
        );
        assert_eq!(
            EdgeOptions::new(1.0, 2.0).operations(),
            vec![Operation::EdgeDetect { low: 1.0, high: 2.0 }]
        );
    }

    // =========================================================================
    // Pool-backed entry points
    // =========================================================================

    #[test]
    fn blur_entry_point_completes_once() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.jpg");
        create_test_jpeg(&photo, 640, 480);
        let bridge = bridge(tmp.path());

        let output = tmp.path().join("out/blurred.jpg");
        let stored = stored(bridge.blur(photo.as_path(), &output, 5).wait());

        assert_eq!(stored.path, output);
        assert_eq!(image::image_dimensions(&output).unwrap(), (640, 480));
    }

    #[test]
    fn crop_out_of_bounds_reports_code() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.jpg");
        create_test_jpeg(&photo, 640, 480);
        let bridge = bridge(tmp.path());

        let pending = bridge.crop(photo.as_path(), tmp.path().join("c.png"), 600, 0, 100, 50);

        assert_eq!(failure_code(pending.wait()), ErrorCode::OutOfBounds);
        assert!(!tmp.path().join("c.png").exists());
    }

    #[test]
    fn convert_entry_point_changes_channels() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 10, 10);
        let bridge = bridge(tmp.path());

        let output = tmp.path().join("gray.png");
        stored(bridge.convert(photo.as_path(), &output, PixelLayout::Luma8).wait());

        let reloaded = image::open(&output).unwrap();
        assert_eq!(reloaded.color().channel_count(), 1);
    }

    #[test]
    fn dropped_pending_still_runs_to_completion() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 10, 10);
        let output = tmp.path().join("fire-and-forget.png");
        let bridge = bridge(tmp.path());

        drop(bridge.blur(photo.as_path(), &output, 3));

        let deadline = Instant::now() + Duration::from_secs(10);
        while !output.exists() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(output.exists());
    }

    #[test]
    fn batch_output_mirrors_layout() {
        let dir = Path::new("/in");
        let out = Path::new("/out");
        assert_eq!(
            batch_output(dir, out, Path::new("/in/a/b.jpg"), None),
            PathBuf::from("/out/a/b.jpg")
        );
        assert_eq!(
            batch_output(dir, out, Path::new("/in/c.jpg"), Some(".png")),
            PathBuf::from("/out/c.png")
        );
    }

    #[test]
    fn batch_rejects_plain_file() {
        let tmp = TempDir::new().unwrap();
        let photo = tmp.path().join("photo.png");
        create_test_png(&photo, 4, 4);
        let bridge = bridge(tmp.path());

        let err = bridge
            .batch(&photo, &tmp.path().join("out"), &BatchTemplate::default())
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParameter);
    }
}
