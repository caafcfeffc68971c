use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use caliper_service::{
    BroadcastNotifier, Claim, ImageSource, ImageSourceError, Measurement, MemoryImageSource,
    MemoryStore, NewPhoto, Orchestrator, Photo, PhotoId, PhotoStore, Settings, StoreError,
};
use image::{Rgb, RgbImage};
use tokio::sync::Semaphore;

/// Location of the card photo in [`standard_images`].
pub const CARD: &str = "card.png";
/// Location of the featureless photo in [`standard_images`].
pub const BLANK: &str = "blank.png";

fn fill(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, value: u8) {
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, Rgb([value, value, value]));
        }
    }
}

/// A bright 300x190 card with a dark chip, and a dark pen beside it, on a
/// mid-gray table.
pub fn card_photo() -> RgbImage {
    let mut img = RgbImage::from_pixel(640, 480, Rgb([90, 90, 90]));
    fill(&mut img, 120, 100, 420, 290, 230);
    fill(&mut img, 160, 150, 200, 180, 40);
    fill(&mut img, 480, 80, 490, 400, 20);
    img
}

/// A photo with nothing to detect.
pub fn blank_photo() -> RgbImage {
    RgbImage::from_pixel(320, 240, Rgb([128, 128, 128]))
}

pub fn encode_png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
    )
    .expect("Failed to encode test image");
    buf
}

/// The card photo at [`CARD`] and the blank photo at [`BLANK`].
pub fn standard_images() -> MemoryImageSource {
    MemoryImageSource::new()
        .with_image(CARD, encode_png(&card_photo()))
        .with_image(BLANK, encode_png(&blank_photo()))
}

pub fn upload(location: &str, reference: Option<&str>) -> NewPhoto {
    NewPhoto {
        storage_location: location.to_owned(),
        reference_object: reference.map(str::to_owned),
        measurement_type: Some("size".to_owned()),
        size_bytes: None,
    }
}

/// An orchestrator over in-memory parts, with handles to inspect them.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn PhotoStore>,
    pub notifier: Arc<BroadcastNotifier>,
}

impl Harness {
    pub fn new(images: Arc<dyn ImageSource>) -> Self {
        Self::with(Arc::new(MemoryStore::new()), images, &Settings::default())
    }

    pub fn with(
        store: Arc<dyn PhotoStore>,
        images: Arc<dyn ImageSource>,
        settings: &Settings,
    ) -> Self {
        let notifier = Arc::new(BroadcastNotifier::new());
        let orchestrator =
            Orchestrator::new(Arc::clone(&store), images, notifier.clone(), settings);
        Self {
            orchestrator,
            store,
            notifier,
        }
    }

    /// Store a pending photo without starting it.
    pub async fn insert_pending(&self, location: &str, reference: Option<&str>) -> PhotoId {
        let photo = Photo::new(upload(location, reference));
        let id = photo.id();
        self.store
            .insert(photo)
            .await
            .expect("Failed to insert pending photo");
        id
    }

    /// Submit and wait for the run to finish.
    pub async fn process(&self, location: &str, reference: Option<&str>) -> Photo {
        let (photo, run) = self
            .orchestrator
            .submit(upload(location, reference))
            .await
            .expect("Failed to submit photo");
        run.finished().await.expect("Run task failed");
        self.orchestrator
            .photo(photo.id())
            .await
            .expect("Photo vanished")
    }
}

/// Image source that holds every fetch until [`release`](Self::release).
pub struct GatedSource {
    gate: Semaphore,
    inner: MemoryImageSource,
}

impl GatedSource {
    pub fn new(inner: MemoryImageSource) -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            inner,
        })
    }

    pub fn release(&self, fetches: usize) {
        self.gate.add_permits(fetches);
    }
}

#[async_trait]
impl ImageSource for GatedSource {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ImageSourceError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ImageSourceError::NotFound(location.to_owned()))?;
        self.inner.fetch(location).await
    }
}

/// Memory store whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub fail_complete: AtomicBool,
    pub fail_save: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("disk on fire".to_owned()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PhotoStore for FlakyStore {
    async fn insert(&self, photo: Photo) -> Result<(), StoreError> {
        self.inner.insert(photo).await
    }

    async fn load(&self, id: PhotoId) -> Result<Option<Photo>, StoreError> {
        self.inner.load(id).await
    }

    async fn save(&self, photo: &Photo) -> Result<(), StoreError> {
        Self::check(&self.fail_save)?;
        self.inner.save(photo).await
    }

    async fn begin_processing(&self, id: PhotoId) -> Result<Claim, StoreError> {
        self.inner.begin_processing(id).await
    }

    async fn complete(&self, photo: &Photo, measurement: Measurement) -> Result<(), StoreError> {
        Self::check(&self.fail_complete)?;
        self.inner.complete(photo, measurement).await
    }

    async fn measurements(&self, id: PhotoId) -> Result<Vec<Measurement>, StoreError> {
        self.inner.measurements(id).await
    }

    async fn list(&self, skip: usize, limit: usize) -> Result<Vec<Photo>, StoreError> {
        self.inner.list(skip, limit).await
    }
}
