use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Pixel width/height of one region image.
pub const TILE_SIZE_PX: u32 = 256;
/// Canvas pixels per game tile at zoom 1.
pub const PIXELS_PER_GAME_TILE: u32 = 4;
/// Game tiles along one edge of a region.
pub const REGION_SIZE_TILES: i32 = (TILE_SIZE_PX / PIXELS_PER_GAME_TILE) as i32;
pub const PLANE_COUNT: usize = 4;
pub const TILE_IMAGE_EXT: &str = "webp";

/// Cantor pairing of two non-negative integers. Used as a cache key only.
pub fn cantor(x: u32, y: u32) -> u64 {
    let sum = x as u64 + y as u64;
    sum * (sum + 1) / 2 + y as u64
}

/// Cantor index of a region, or `None` when either coordinate is negative.
pub fn region_index(x: i32, y: i32) -> Option<u64> {
    let x = u32::try_from(x).ok()?;
    let y = u32::try_from(y).ok()?;
    Some(cantor(x, y))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileNameError {
    #[error("expected `<plane>_<x>_<y>`, got {0:?}")]
    Malformed(String),
    #[error("plane {0} is not a map plane")]
    PlaneOutOfRange(i64),
}

/// One region image on one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionCoord {
    pub plane: u8,
    pub x: i32,
    pub y: i32,
}

impl RegionCoord {
    pub fn new(plane: u8, x: i32, y: i32) -> Self {
        Self { plane, x, y }
    }

    pub fn index(&self) -> Option<u64> {
        region_index(self.x, self.y)
    }

    /// File stem of the region image, e.g. `0_50_50`.
    pub fn file_stem(&self) -> String {
        format!("{}_{}_{}", self.plane, self.x, self.y)
    }

    pub fn parse_file_stem(stem: &str) -> Result<Self, TileNameError> {
        let malformed = || TileNameError::Malformed(stem.to_string());
        let mut parts = stem.split('_');
        let (Some(plane), Some(x), Some(y), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let plane: i64 = plane.parse().map_err(|_| malformed())?;
        let x: i32 = x.parse().map_err(|_| malformed())?;
        let y: i32 = y.parse().map_err(|_| malformed())?;
        let plane = u8::try_from(plane)
            .ok()
            .filter(|p| (*p as usize) < PLANE_COUNT)
            .ok_or(TileNameError::PlaneOutOfRange(plane))?;
        Ok(Self { plane, x, y })
    }
}

/// `plane -> regionX -> regionY -> T`
pub type RegionMap<T> = BTreeMap<u8, BTreeMap<i32, BTreeMap<i32, T>>>;

/// Sprite index -> flat `[x0, y0, x1, y1, ...]` world tile coordinates.
pub type IconBucket = BTreeMap<u32, Vec<i32>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconPlacement {
    pub sprite: u32,
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPlacement {
    pub x: i32,
    pub y: i32,
    pub label_id: u32,
}

/// All area labels anchored inside one region.
///
/// Accepts either a flat `[x, y, labelId, ...]` array or a map of
/// `labelId -> [x, y, labelId, ...]`; always serializes flat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawLabelBucket", into = "Vec<i32>")]
pub struct LabelBucket(pub Vec<LabelPlacement>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabelBucket {
    Flat(Vec<i32>),
    ById(BTreeMap<String, Vec<i32>>),
}

fn label_triples(flat: &[i32]) -> impl Iterator<Item = LabelPlacement> + '_ {
    flat.chunks_exact(3).filter_map(|chunk| {
        Some(LabelPlacement {
            x: chunk[0],
            y: chunk[1],
            label_id: u32::try_from(chunk[2]).ok()?,
        })
    })
}

impl From<RawLabelBucket> for LabelBucket {
    fn from(raw: RawLabelBucket) -> Self {
        match raw {
            RawLabelBucket::Flat(flat) => Self(label_triples(&flat).collect()),
            RawLabelBucket::ById(by_id) => Self(
                by_id
                    .values()
                    .flat_map(|flat| label_triples(flat).collect::<Vec<_>>())
                    .collect(),
            ),
        }
    }
}

impl From<LabelBucket> for Vec<i32> {
    fn from(bucket: LabelBucket) -> Self {
        bucket
            .0
            .iter()
            .flat_map(|l| [l.x, l.y, l.label_id as i32])
            .collect()
    }
}

/// The bundled map descriptor served as `/data/map.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDescriptor {
    /// Per plane, the Cantor indices of every region that has an image.
    pub tiles: Vec<Vec<u64>>,
    #[serde(default)]
    pub icons: RegionMap<IconBucket>,
    #[serde(default)]
    pub labels: RegionMap<LabelBucket>,
}

impl Default for MapDescriptor {
    fn default() -> Self {
        Self {
            tiles: vec![Vec::new(); PLANE_COUNT],
            icons: RegionMap::new(),
            labels: RegionMap::new(),
        }
    }
}

impl MapDescriptor {
    /// Record a region image. Regions with negative coordinates are ignored.
    pub fn insert_tile(&mut self, region: RegionCoord) -> bool {
        let Some(index) = region.index() else {
            return false;
        };
        let plane = region.plane as usize;
        if self.tiles.len() <= plane {
            self.tiles.resize(plane + 1, Vec::new());
        }
        let tiles = &mut self.tiles[plane];
        match tiles.binary_search(&index) {
            Ok(_) => false,
            Err(pos) => {
                tiles.insert(pos, index);
                true
            }
        }
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.iter().map(Vec::len).sum()
    }

    pub fn valid_regions(&self) -> ValidRegions {
        ValidRegions {
            planes: self
                .tiles
                .iter()
                .map(|plane| plane.iter().copied().collect())
                .collect(),
        }
    }

    pub fn icons_in(&self, plane: u8, x: i32, y: i32) -> impl Iterator<Item = IconPlacement> + '_ {
        self.icons
            .get(&plane)
            .and_then(|xs| xs.get(&x))
            .and_then(|ys| ys.get(&y))
            .into_iter()
            .flat_map(|bucket| {
                bucket.iter().flat_map(|(&sprite, coords)| {
                    coords.chunks_exact(2).map(move |pair| IconPlacement {
                        sprite,
                        x: pair[0],
                        y: pair[1],
                    })
                })
            })
    }

    pub fn labels_in(&self, plane: u8, x: i32, y: i32) -> &[LabelPlacement] {
        self.labels
            .get(&plane)
            .and_then(|xs| xs.get(&x))
            .and_then(|ys| ys.get(&y))
            .map(|bucket| bucket.0.as_slice())
            .unwrap_or(&[])
    }
}

/// Lookup form of [`MapDescriptor::tiles`].
#[derive(Debug, Clone, Default)]
pub struct ValidRegions {
    planes: Vec<HashSet<u64>>,
}

impl ValidRegions {
    pub fn contains(&self, region: RegionCoord) -> bool {
        let Some(index) = region.index() else {
            return false;
        };
        self.planes
            .get(region.plane as usize)
            .is_some_and(|set| set.contains(&index))
    }
}
