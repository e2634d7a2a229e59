//! Session caches for region images, label images and the icon atlas.
//!
//! Nothing here touches the browser: loads are started through an
//! [`AssetLoader`] and their results come back through the [`AssetInbox`],
//! which the view drains at the top of each frame.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use groupiron_shared::{MapDescriptor, PLANE_COUNT, RegionCoord, TILE_IMAGE_EXT, ValidRegions};

use crate::animation::{Animation, Easing};
use crate::config::{ICON_ATLAS_URL, LABEL_URL_PREFIX, TILE_FADE_MS, TILE_URL_PREFIX};
use crate::render_loop::FrameClock;

/// A decoded image with its natural size.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage<I> {
    pub image: I,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKey {
    Tile(RegionCoord),
    Label(u32),
    IconAtlas,
}

impl AssetKey {
    pub fn url(&self) -> String {
        match self {
            AssetKey::Tile(region) => {
                format!("{TILE_URL_PREFIX}/{}.{TILE_IMAGE_EXT}", region.file_stem())
            }
            AssetKey::Label(id) => format!("{LABEL_URL_PREFIX}/{id}.{TILE_IMAGE_EXT}"),
            AssetKey::IconAtlas => ICON_ATLAS_URL.to_string(),
        }
    }
}

#[derive(Debug)]
pub enum AssetEvent<I> {
    Loaded(AssetKey, LoadedImage<I>),
    Failed(AssetKey, String),
    Descriptor(Box<MapDescriptor>),
    DescriptorFailed(String),
}

/// Completed loads waiting for the next frame. Pushing requests an update.
pub struct AssetInbox<I> {
    queue: Rc<RefCell<VecDeque<AssetEvent<I>>>>,
    clock: FrameClock,
}

impl<I> Clone for AssetInbox<I> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<I> AssetInbox<I> {
    pub fn new(clock: FrameClock) -> Self {
        Self {
            queue: Rc::new(RefCell::new(VecDeque::new())),
            clock,
        }
    }

    pub fn push(&self, event: AssetEvent<I>) {
        self.queue.borrow_mut().push_back(event);
        self.clock.request_update();
    }

    pub fn drain(&self) -> Vec<AssetEvent<I>> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}

/// Fire-and-forget image fetching. Implementations report back through an
/// [`AssetInbox`] and must not call into the view synchronously.
pub trait AssetLoader {
    type Image;

    fn load(&self, key: AssetKey);
}

/// Lifecycle of a single cached image.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetState<I> {
    Loading,
    Loaded(LoadedImage<I>),
    /// Never retried this session.
    Failed,
}

#[derive(Debug, Clone)]
pub struct Tile<I> {
    pub state: AssetState<I>,
    /// Alpha multiplier once loaded.
    pub fade: Animation<f64>,
}

/// What to do with one visible region this frame.
#[derive(Debug, PartialEq)]
pub enum TileDraw<'a, I> {
    /// Missing, still loading, or failed: clear the region.
    Clear,
    /// Not requested and new loads are held back: leave untouched.
    Skip,
    Draw { image: &'a LoadedImage<I>, alpha: f64 },
}

/// Region images keyed by `(plane, cantor(x, y))`. No eviction.
#[derive(Debug)]
pub struct TileCache<I> {
    planes: Vec<HashMap<u64, Tile<I>>>,
    valid: Option<ValidRegions>,
    fading: Vec<RegionCoord>,
}

impl<I> Default for TileCache<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> TileCache<I> {
    pub fn new() -> Self {
        Self {
            planes: (0..PLANE_COUNT).map(|_| HashMap::new()).collect(),
            valid: None,
            fading: Vec::new(),
        }
    }

    /// Until this is called every non-negative region counts as valid.
    pub fn set_valid_regions(&mut self, valid: ValidRegions) {
        self.valid = Some(valid);
    }

    pub fn is_valid(&self, region: RegionCoord) -> bool {
        if region.index().is_none() || region.plane as usize >= self.planes.len() {
            return false;
        }
        self.valid.as_ref().is_none_or(|valid| valid.contains(region))
    }

    pub fn get(&self, region: RegionCoord) -> Option<&Tile<I>> {
        let index = region.index()?;
        self.planes.get(region.plane as usize)?.get(&index)
    }

    pub fn len(&self) -> usize {
        self.planes.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a visible region, requesting it when absent and `load_new`.
    pub fn resolve<L>(&mut self, region: RegionCoord, load_new: bool, loader: &L) -> TileDraw<'_, I>
    where
        L: AssetLoader<Image = I> + ?Sized,
    {
        if !self.is_valid(region) {
            return TileDraw::Clear;
        }
        let (Some(index), Some(plane)) = (region.index(), self.planes.get_mut(region.plane as usize))
        else {
            return TileDraw::Clear;
        };
        if !plane.contains_key(&index) {
            if !load_new {
                return TileDraw::Skip;
            }
            plane.insert(
                index,
                Tile {
                    state: AssetState::Loading,
                    fade: Animation::at_rest(0.0),
                },
            );
            loader.load(AssetKey::Tile(region));
            return TileDraw::Clear;
        }
        match plane.get(&index) {
            Some(Tile {
                state: AssetState::Loaded(image),
                fade,
            }) => TileDraw::Draw {
                image,
                alpha: fade.current,
            },
            _ => TileDraw::Clear,
        }
    }

    /// Attach a loaded image and start its fade-in.
    pub fn complete(&mut self, region: RegionCoord, image: LoadedImage<I>) {
        let Some(tile) = self.tile_mut(region) else {
            return;
        };
        tile.state = AssetState::Loaded(image);
        tile.fade = Animation::transition(0.0, 1.0, TILE_FADE_MS).with_easing(Easing::CubicOut);
        self.fading.push(region);
    }

    pub fn fail(&mut self, region: RegionCoord) {
        if let Some(tile) = self.tile_mut(region) {
            tile.state = AssetState::Failed;
        }
    }

    /// Advance fade-ins. Returns whether any are still running.
    pub fn animate_fades(&mut self, elapsed: f64) -> bool {
        let mut fading = std::mem::take(&mut self.fading);
        fading.retain(|&region| {
            self.tile_mut(region)
                .is_some_and(|tile| tile.fade.animate(elapsed))
        });
        let running = !fading.is_empty();
        self.fading = fading;
        running
    }

    fn tile_mut(&mut self, region: RegionCoord) -> Option<&mut Tile<I>> {
        let index = region.index()?;
        self.planes.get_mut(region.plane as usize)?.get_mut(&index)
    }
}

/// Area label images keyed by label id.
#[derive(Debug)]
pub struct LabelImageCache<I> {
    images: HashMap<u32, AssetState<I>>,
}

impl<I> Default for LabelImageCache<I> {
    fn default() -> Self {
        Self {
            images: HashMap::new(),
        }
    }
}

impl<I> LabelImageCache<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The image for `label_id` if it has loaded, requesting it when absent
    /// and `load_new`.
    pub fn get_or_request<L>(&mut self, label_id: u32, load_new: bool, loader: &L) -> Option<&LoadedImage<I>>
    where
        L: AssetLoader<Image = I> + ?Sized,
    {
        if !self.images.contains_key(&label_id) {
            if load_new {
                self.images.insert(label_id, AssetState::Loading);
                loader.load(AssetKey::Label(label_id));
            }
            return None;
        }
        match self.images.get(&label_id) {
            Some(AssetState::Loaded(image)) => Some(image),
            _ => None,
        }
    }

    pub fn complete(&mut self, label_id: u32, image: LoadedImage<I>) {
        self.images.insert(label_id, AssetState::Loaded(image));
    }

    pub fn fail(&mut self, label_id: u32) {
        self.images.insert(label_id, AssetState::Failed);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use groupiron_shared::RegionCoord;

    use super::*;

    /// Records every requested asset; nothing ever completes on its own.
    #[derive(Default)]
    pub(crate) struct FakeLoader {
        pub(crate) requested: RefCell<Vec<AssetKey>>,
    }

    impl AssetLoader for FakeLoader {
        type Image = &'static str;

        fn load(&self, key: AssetKey) {
            self.requested.borrow_mut().push(key);
        }
    }

    pub(crate) fn image(name: &'static str) -> LoadedImage<&'static str> {
        LoadedImage {
            image: name,
            width: 256.0,
            height: 256.0,
        }
    }

    fn descriptor_with(regions: &[RegionCoord]) -> MapDescriptor {
        let mut descriptor = MapDescriptor::default();
        for &region in regions {
            descriptor.insert_tile(region);
        }
        descriptor
    }

    #[test]
    fn asset_urls() {
        assert_eq!(
            AssetKey::Tile(RegionCoord::new(1, 50, 49)).url(),
            "/map/1_50_49.webp"
        );
        assert_eq!(AssetKey::Label(12).url(), "/map/labels/12.webp");
        assert_eq!(AssetKey::IconAtlas.url(), "/map/icons/map_icons.webp");
    }

    #[test]
    fn region_missing_from_descriptor_is_never_fetched() {
        let loader = FakeLoader::default();
        let mut cache = TileCache::new();
        cache.set_valid_regions(descriptor_with(&[RegionCoord::new(0, 49, 50)]).valid_regions());

        let missing = RegionCoord::new(0, 50, 50);
        for _ in 0..3 {
            assert_eq!(cache.resolve(missing, true, &loader), TileDraw::Clear);
        }
        assert!(loader.requested.borrow().is_empty());
        assert!(cache.get(missing).is_none());
    }

    #[test]
    fn negative_regions_are_cleared_without_fetching() {
        let loader = FakeLoader::default();
        let mut cache: TileCache<&str> = TileCache::new();
        assert_eq!(cache.resolve(RegionCoord::new(0, -1, 3), true, &loader), TileDraw::Clear);
        assert!(loader.requested.borrow().is_empty());
    }

    #[test]
    fn lifecycle_loading_loaded_fading_steady() {
        let loader = FakeLoader::default();
        let mut cache = TileCache::new();
        let region = RegionCoord::new(0, 50, 50);

        assert_eq!(cache.resolve(region, true, &loader), TileDraw::Clear);
        assert_eq!(*loader.requested.borrow(), vec![AssetKey::Tile(region)]);
        // Still loading: cleared, not re-requested.
        assert_eq!(cache.resolve(region, true, &loader), TileDraw::Clear);
        assert_eq!(loader.requested.borrow().len(), 1);

        cache.complete(region, image("a"));
        match cache.resolve(region, true, &loader) {
            TileDraw::Draw { image, alpha } => {
                assert_eq!(image.image, "a");
                assert_eq!(alpha, 0.0);
            }
            other => panic!("expected draw, got {other:?}"),
        }

        assert!(cache.animate_fades(150.0));
        let TileDraw::Draw { alpha, .. } = cache.resolve(region, true, &loader) else {
            panic!("expected draw");
        };
        assert!(alpha > 0.5 && alpha < 1.0);

        assert!(!cache.animate_fades(150.0));
        let TileDraw::Draw { alpha, .. } = cache.resolve(region, true, &loader) else {
            panic!("expected draw");
        };
        assert_eq!(alpha, 1.0);
        assert!(!cache.animate_fades(16.0));
    }

    #[test]
    fn held_back_loads_skip_unrequested_regions() {
        let loader = FakeLoader::default();
        let mut cache: TileCache<&str> = TileCache::new();
        let region = RegionCoord::new(2, 10, 10);
        assert_eq!(cache.resolve(region, false, &loader), TileDraw::Skip);
        assert!(loader.requested.borrow().is_empty());
        assert!(cache.is_empty());

        // Already-requested regions still resolve while loads are held back.
        cache.resolve(region, true, &loader);
        assert_eq!(cache.resolve(region, false, &loader), TileDraw::Clear);
    }

    #[test]
    fn failed_tiles_are_never_retried() {
        let loader = FakeLoader::default();
        let mut cache: TileCache<&str> = TileCache::new();
        let region = RegionCoord::new(0, 3, 3);
        cache.resolve(region, true, &loader);
        cache.fail(region);
        for _ in 0..3 {
            assert_eq!(cache.resolve(region, true, &loader), TileDraw::Clear);
        }
        assert_eq!(loader.requested.borrow().len(), 1);
        assert_eq!(cache.get(region).map(|t| &t.state), Some(&AssetState::Failed));
    }

    #[test]
    fn planes_are_cached_separately() {
        let loader = FakeLoader::default();
        let mut cache: TileCache<&str> = TileCache::new();
        cache.resolve(RegionCoord::new(0, 5, 5), true, &loader);
        cache.resolve(RegionCoord::new(1, 5, 5), true, &loader);
        assert_eq!(cache.len(), 2);
        assert_eq!(loader.requested.borrow().len(), 2);
    }

    #[test]
    fn label_images_load_once_per_id() {
        let loader = FakeLoader::default();
        let mut labels = LabelImageCache::new();
        assert!(labels.get_or_request(7, false, &loader).is_none());
        assert!(labels.is_empty());
        assert!(labels.get_or_request(7, true, &loader).is_none());
        assert!(labels.get_or_request(7, true, &loader).is_none());
        assert_eq!(*loader.requested.borrow(), vec![AssetKey::Label(7)]);

        labels.complete(7, image("label-7"));
        assert_eq!(
            labels.get_or_request(7, true, &loader).map(|i| i.image),
            Some("label-7")
        );

        labels.get_or_request(8, true, &loader);
        labels.fail(8);
        assert!(labels.get_or_request(8, true, &loader).is_none());
        assert_eq!(loader.requested.borrow().len(), 2);
    }

    #[test]
    fn inbox_push_requests_update() {
        let clock = FrameClock::new();
        let inbox: AssetInbox<&str> = AssetInbox::new(clock.clone());
        inbox.push(AssetEvent::Failed(AssetKey::IconAtlas, "404".into()));
        assert_eq!(clock.pending(), 1);
        assert!(!inbox.is_empty());
        assert_eq!(inbox.drain().len(), 1);
        assert!(inbox.is_empty());
    }
}
