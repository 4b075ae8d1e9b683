//! Drill and flash visiting order
//!
//! Four strategies produce a permutation of the input locations: greedy
//! nearest neighbor, R-tree nearest neighbor and a TSP solver in basic or
//! metaheuristic mode. The solver is optional; when it is unavailable or
//! runs out of time the R-tree order is used instead.

use super::{RTreeStorage, SpatialIndex};
use crate::geometry::{distance, Coord};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How drill locations are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingStrategy {
    Greedy,
    /// TSP solver, giving up when the budget runs out
    Solver,
    /// TSP solver improving a tour until the budget runs out
    Metaheuristic,
    #[default]
    Rtree,
}

/// Solver behavior when the time budget is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverMode {
    /// Fail if the tour is not settled in time
    Basic,
    /// Return the best tour found when time is up
    Metaheuristic,
}

/// A capability that orders points as an open tour
pub trait TspSolver {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }

    /// Visiting order as indices into `points`, or `None` when no tour
    /// could be produced within `budget`
    fn solve(
        &self,
        points: &[Coord<f64>],
        start: Option<Coord<f64>>,
        mode: SolverMode,
        budget: Duration,
    ) -> Option<Vec<usize>>;
}

/// Nearest unvisited neighbor, starting from `start` (or the origin)
pub fn greedy_order(points: &[Coord<f64>], start: Option<Coord<f64>>) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut order = Vec::with_capacity(points.len());
    let mut cursor = start.unwrap_or(Coord { x: 0.0, y: 0.0 });

    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (slot, &index) in remaining.iter().enumerate() {
            let d = distance(cursor, points[index]);
            if d < best_distance {
                best = slot;
                best_distance = d;
            }
        }
        let index = remaining.swap_remove(best);
        cursor = points[index];
        order.push(index);
    }
    order
}

/// Sequential nearest-neighbor extraction from an R-tree
pub fn rtree_order(points: &[Coord<f64>], start: Option<Coord<f64>>) -> Vec<usize> {
    let mut storage = RTreeStorage::from_items(points.iter().copied());
    let mut order = Vec::with_capacity(points.len());
    let mut cursor = start.unwrap_or(Coord { x: 0.0, y: 0.0 });
    while let Ok((at, id)) = storage.nearest(cursor) {
        storage.remove(id);
        order.push(id);
        cursor = at;
    }
    order
}

fn tour_length(points: &[Coord<f64>], tour: &[usize], start: Option<Coord<f64>>) -> f64 {
    let lead = match (start, tour.first()) {
        (Some(s), Some(&first)) => distance(s, points[first]),
        _ => 0.0,
    };
    lead + tour
        .windows(2)
        .map(|w| distance(points[w[0]], points[w[1]]))
        .sum::<f64>()
}

/// 2-opt local search on an open tour with a fixed first stop.
///
/// Returns `false` if the deadline passed before a local optimum.
fn two_opt(points: &[Coord<f64>], tour: &mut [usize], deadline: Instant) -> bool {
    let n = tour.len();
    if n < 4 {
        return true;
    }
    loop {
        let mut improved = false;
        for i in 1..n - 1 {
            for k in i + 1..n {
                let a = points[tour[i - 1]];
                let b = points[tour[i]];
                let c = points[tour[k]];
                let next = tour.get(k + 1).map(|&t| points[t]);
                let before = distance(a, b) + next.map_or(0.0, |d| distance(c, d));
                let after = distance(a, c) + next.map_or(0.0, |d| distance(b, d));
                if after + 1e-12 < before {
                    tour[i..=k].reverse();
                    improved = true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
        if !improved {
            return true;
        }
    }
}

/// Reconnect three random cuts of the tour (segments A C B D)
fn double_bridge(tour: &[usize], rng: &mut StdRng) -> Vec<usize> {
    let n = tour.len();
    let mut cuts = [
        rng.random_range(1..n),
        rng.random_range(1..n),
        rng.random_range(1..n),
    ];
    cuts.sort_unstable();
    let [p1, p2, p3] = cuts;
    let mut out = Vec::with_capacity(n);
    out.extend_from_slice(&tour[..p1]);
    out.extend_from_slice(&tour[p2..p3]);
    out.extend_from_slice(&tour[p1..p2]);
    out.extend_from_slice(&tour[p3..]);
    out
}

/// Built-in solver: greedy tour refined by 2-opt, with random
/// double-bridge restarts in metaheuristic mode
#[derive(Debug, Clone)]
pub struct TwoOptSolver {
    pub seed: u64,
}

impl Default for TwoOptSolver {
    fn default() -> Self {
        Self { seed: 0x5eed }
    }
}

impl TwoOptSolver {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl TspSolver for TwoOptSolver {
    fn name(&self) -> &str {
        "two-opt"
    }

    fn solve(
        &self,
        points: &[Coord<f64>],
        start: Option<Coord<f64>>,
        mode: SolverMode,
        budget: Duration,
    ) -> Option<Vec<usize>> {
        let deadline = Instant::now() + budget;
        let mut best = greedy_order(points, start);
        let settled = two_opt(points, &mut best, deadline);
        if mode == SolverMode::Basic {
            return settled.then_some(best);
        }

        let mut best_length = tour_length(points, &best, start);
        if best.len() < 8 {
            return Some(best);
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut rounds = 0usize;
        while Instant::now() < deadline {
            let mut candidate = double_bridge(&best, &mut rng);
            two_opt(points, &mut candidate, deadline);
            let length = tour_length(points, &candidate, start);
            if length + 1e-12 < best_length {
                best = candidate;
                best_length = length;
            }
            rounds += 1;
        }
        debug!("two-opt: {} kicks, tour length {:.4}", rounds, best_length);
        Some(best)
    }
}

/// Orders drill locations with a chosen strategy
pub struct PointOrderer {
    strategy: OrderingStrategy,
    budget: Duration,
    solver: Box<dyn TspSolver>,
}

impl PointOrderer {
    pub fn new(strategy: OrderingStrategy, budget: Duration) -> Self {
        Self {
            strategy,
            budget,
            solver: Box::new(TwoOptSolver::default()),
        }
    }

    /// Replace the built-in solver
    pub fn with_solver(mut self, solver: Box<dyn TspSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn strategy(&self) -> OrderingStrategy {
        self.strategy
    }

    /// Permutation of `points` in visiting order
    pub fn order(&self, points: &[Coord<f64>], start: Option<Coord<f64>>) -> Vec<usize> {
        let mode = match self.strategy {
            OrderingStrategy::Greedy => return greedy_order(points, start),
            OrderingStrategy::Rtree => return rtree_order(points, start),
            OrderingStrategy::Solver => SolverMode::Basic,
            OrderingStrategy::Metaheuristic => SolverMode::Metaheuristic,
        };
        if !self.solver.is_available() {
            warn!(
                "solver {} is not available, using R-tree ordering",
                self.solver.name()
            );
            return rtree_order(points, start);
        }
        match self.solver.solve(points, start, mode, self.budget) {
            Some(order) if order.len() == points.len() => order,
            _ => {
                warn!(
                    "solver {} gave no tour within {:?}, using R-tree ordering",
                    self.solver.name(),
                    self.budget
                );
                rtree_order(points, start)
            }
        }
    }
}
