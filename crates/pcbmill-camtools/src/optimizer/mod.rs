//! Spatial index and toolpath ordering
//!
//! Fragments are indexed by their endpoints behind the [`SpatialIndex`]
//! trait. [`RTreeStorage`] is the `rstar` backed implementation used in
//! production; [`LinearStorage`] scans a vector and is only worth it for a
//! handful of items.

pub mod connect;
pub mod ordering;

pub use connect::{paint_connect, path_connect, Connected};
pub use ordering::{
    greedy_order, rtree_order, OrderingStrategy, PointOrderer, SolverMode, TspSolver,
    TwoOptSolver,
};

use crate::geometry::{distance, Coord, LineString, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use thiserror::Error;

/// The index has no fragments left
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("spatial index is depleted")]
pub struct Depleted;

/// Something with one or two indexable endpoints
pub trait Endpoints {
    fn endpoints(&self) -> Vec<Coord<f64>>;
}

impl Endpoints for Coord<f64> {
    fn endpoints(&self) -> Vec<Coord<f64>> {
        vec![*self]
    }
}

impl Endpoints for Point<f64> {
    fn endpoints(&self) -> Vec<Coord<f64>> {
        vec![self.0]
    }
}

impl Endpoints for LineString<f64> {
    fn endpoints(&self) -> Vec<Coord<f64>> {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) if first == last => vec![*first],
            (Some(first), Some(last)) => vec![*first, *last],
            _ => Vec::new(),
        }
    }
}

/// Nearest-endpoint lookup with removal
pub trait SpatialIndex<T: Endpoints> {
    /// Add an item, returning its id
    fn insert(&mut self, item: T) -> usize;

    /// Remove an item by id
    fn remove(&mut self, id: usize) -> Option<T>;

    /// Closest indexed endpoint to `point` and the id owning it
    fn nearest(&self, point: Coord<f64>) -> Result<(Coord<f64>, usize), Depleted>;

    /// Id of any remaining item
    fn first(&self) -> Option<usize>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return the item nearest to `point` with the matched endpoint
    fn pop_nearest(&mut self, point: Coord<f64>) -> Result<(Coord<f64>, T), Depleted> {
        let (endpoint, id) = self.nearest(point)?;
        let item = self.remove(id).ok_or(Depleted)?;
        Ok((endpoint, item))
    }
}

/// R-tree over fragment endpoints
pub struct RTreeStorage<T> {
    tree: RTree<GeomWithData<[f64; 2], usize>>,
    items: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for RTreeStorage<T> {
    fn default() -> Self {
        Self {
            tree: RTree::new(),
            items: Vec::new(),
            live: 0,
        }
    }
}

impl<T: Endpoints> RTreeStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bulk-load items; ids follow iteration order
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let items: Vec<Option<T>> = items.into_iter().map(Some).collect();
        let entries = items
            .iter()
            .enumerate()
            .flat_map(|(id, item)| {
                item.iter()
                    .flat_map(Endpoints::endpoints)
                    .map(move |e| GeomWithData::new([e.x, e.y], id))
                    .collect::<Vec<_>>()
            })
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
            live: items.len(),
            items,
        }
    }
}

impl<T: Endpoints> SpatialIndex<T> for RTreeStorage<T> {
    fn insert(&mut self, item: T) -> usize {
        let id = self.items.len();
        for e in item.endpoints() {
            self.tree.insert(GeomWithData::new([e.x, e.y], id));
        }
        self.items.push(Some(item));
        self.live += 1;
        id
    }

    fn remove(&mut self, id: usize) -> Option<T> {
        let item = self.items.get_mut(id)?.take()?;
        for e in item.endpoints() {
            self.tree.remove(&GeomWithData::new([e.x, e.y], id));
        }
        self.live -= 1;
        Some(item)
    }

    fn nearest(&self, point: Coord<f64>) -> Result<(Coord<f64>, usize), Depleted> {
        self.tree
            .nearest_neighbor(&[point.x, point.y])
            .map(|hit| {
                let [x, y] = *hit.geom();
                (Coord { x, y }, hit.data)
            })
            .ok_or(Depleted)
    }

    fn first(&self) -> Option<usize> {
        self.items.iter().position(Option::is_some)
    }

    fn len(&self) -> usize {
        self.live
    }
}

/// Brute-force index.
///
/// Suits a handful of fragments. Drill ordering and `path_connect` use
/// [`RTreeStorage`].
pub struct LinearStorage<T> {
    items: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for LinearStorage<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            live: 0,
        }
    }
}

impl<T: Endpoints> LinearStorage<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Endpoints> SpatialIndex<T> for LinearStorage<T> {
    fn insert(&mut self, item: T) -> usize {
        self.items.push(Some(item));
        self.live += 1;
        self.items.len() - 1
    }

    fn remove(&mut self, id: usize) -> Option<T> {
        let item = self.items.get_mut(id)?.take()?;
        self.live -= 1;
        Some(item)
    }

    fn nearest(&self, point: Coord<f64>) -> Result<(Coord<f64>, usize), Depleted> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(id, item)| item.as_ref().map(|item| (id, item)))
            .flat_map(|(id, item)| item.endpoints().into_iter().map(move |e| (e, id)))
            .min_by(|a, b| distance(a.0, point).total_cmp(&distance(b.0, point)))
            .ok_or(Depleted)
    }

    fn first(&self) -> Option<usize> {
        self.items.iter().position(Option::is_some)
    }

    fn len(&self) -> usize {
        self.live
    }
}
