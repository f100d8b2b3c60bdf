/// Fixed-radius chunk cache.
///
/// All slots are allocated once up front and recycled through a free list,
/// so there is no heap churn while the window wanders. Lookup is O(1) via a
/// power-of-two table keyed by masked coordinates; because the table is wide
/// enough to cover the window's diameter, no two live points collide.
use crate::voxel::Point;

const EMPTY: u32 = u32::MAX;

pub struct Circle<T> {
    center: Point,
    mask: i32,
    shift: i32,
    total: usize,
    used: usize,
    /// Admissible offsets from the center, sorted by squared norm ascending.
    /// The sort is stable so ties resolve deterministically; this order is
    /// the iteration order for all per-frame work.
    offsets: Box<[Point]>,
    /// `deltas[|dx|]` is the maximum admissible `|dz|`, making the
    /// "still in range" test a single compare per axis.
    deltas: Box<[i32]>,
    lookup: Box<[u32]>,
    slot_points: Box<[Point]>,
    storage: Box<[T]>,
    free: Vec<u32>,
}

impl<T: Default> Circle<T> {
    pub fn new(radius: f64) -> Self {
        let bound = radius * radius;
        let floor = radius as i32;

        let mut offsets = Vec::new();
        for i in -floor..=floor {
            for j in -floor..=floor {
                let offset = Point::new(i, j);
                if (offset.length_squared() as f64) <= bound {
                    offsets.push(offset);
                }
            }
        }
        offsets.sort_by_key(|offset| offset.length_squared());

        let total = offsets.len();
        let mut deltas = vec![0i32; (floor + 1) as usize];
        for offset in &offsets {
            let ax = offset.x.abs() as usize;
            let az = offset.y.abs();
            deltas[ax] = deltas[ax].max(az);
        }

        let mut shift = 0;
        while (1 << shift) < 2 * floor + 1 {
            shift += 1;
        }
        let mask = (1 << shift) - 1;

        Circle {
            center: Point::ZERO,
            mask,
            shift,
            total,
            used: 0,
            offsets: offsets.into_boxed_slice(),
            deltas: deltas.into_boxed_slice(),
            lookup: vec![EMPTY; 1usize << (2 * shift)].into_boxed_slice(),
            slot_points: vec![Point::ZERO; total].into_boxed_slice(),
            storage: (0..total).map(|_| T::default()).collect(),
            free: (0..total as u32).rev().collect(),
        }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn capacity(&self) -> usize {
        self.total
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Visit every admissible point of the current window, nearest first.
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        let center = self.center;
        self.offsets.iter().map(move |&offset| offset + center)
    }

    #[inline]
    fn lookup_index(&self, point: Point) -> usize {
        (((point.y & self.mask) << self.shift) | (point.x & self.mask)) as usize
    }

    #[inline]
    fn slot_of(&self, point: Point) -> Option<usize> {
        let slot = self.lookup[self.lookup_index(point)];
        if slot != EMPTY && self.slot_points[slot as usize] == point {
            Some(slot as usize)
        } else {
            None
        }
    }

    #[inline]
    pub fn contains(&self, point: Point) -> bool {
        self.slot_of(point).is_some()
    }

    #[inline]
    pub fn get(&self, point: Point) -> Option<&T> {
        self.slot_of(point).map(|slot| &self.storage[slot])
    }

    #[inline]
    pub fn get_mut(&mut self, point: Point) -> Option<&mut T> {
        match self.slot_of(point) {
            Some(slot) => Some(&mut self.storage[slot]),
            None => None,
        }
    }

    /// Borrow N occupied slots at once. Returns None if any point is missing.
    /// The points must be distinct.
    pub fn get_disjoint_mut<const N: usize>(&mut self, points: [Point; N]) -> Option<[&mut T; N]> {
        let mut slots = [0usize; N];
        for (slot, &point) in slots.iter_mut().zip(points.iter()) {
            *slot = self.slot_of(point)?;
        }
        self.storage.get_disjoint_mut(slots).ok()
    }

    /// Claim the slot for a new point. Panics if the point is already present
    /// or the pool is exhausted; admission is budgeted by the caller, so
    /// either is a scheduling bug.
    pub fn insert(&mut self, point: Point) -> &mut T {
        let index = self.lookup_index(point);
        assert!(self.lookup[index] == EMPTY, "slot already occupied: {point}");
        let slot = self.free.pop().expect("chunk pool exhausted");
        self.lookup[index] = slot;
        self.slot_points[slot as usize] = point;
        self.used += 1;
        &mut self.storage[slot as usize]
    }

    /// Release the slot for a point back to the free list.
    pub fn remove(&mut self, point: Point) {
        let index = self.lookup_index(point);
        let slot = self.lookup[index];
        debug_assert!(slot != EMPTY && self.slot_points[slot as usize] == point);
        self.lookup[index] = EMPTY;
        self.free.push(slot);
        self.used -= 1;
    }

    /// Whether a point stays admissible after the window moves to `center`.
    #[inline]
    pub fn in_range_of(&self, point: Point, center: Point) -> bool {
        let diff = point - center;
        let ax = diff.x.abs() as usize;
        ax < self.deltas.len() && diff.y.abs() <= self.deltas[ax]
    }

    /// Collect the live points that fall out of range when the window moves
    /// to `center`. The caller tears each one down and then calls `remove`;
    /// the window itself moves with `set_center`.
    pub fn evictions_into(&self, center: Point, out: &mut Vec<Point>) {
        out.clear();
        for i in 0..self.total {
            let point = self.offsets[i] + self.center;
            if self.in_range_of(point, center) {
                continue;
            }
            if self.slot_of(point).is_some() {
                out.push(point);
            }
        }
    }

    pub fn set_center(&mut self, center: Point) {
        self.center = center;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_points_sorted_by_distance() {
        let circle: Circle<u32> = Circle::new(3.5);
        let mut last = -1;
        for point in circle.points() {
            let norm = point.length_squared();
            assert!(norm >= last, "iteration must be non-decreasing in norm");
            last = norm;
        }
        assert_eq!(circle.points().next(), Some(Point::ZERO));
    }

    #[test]
    fn test_insert_get_remove() {
        let mut circle: Circle<u32> = Circle::new(2.5);
        let p = Point::new(1, -1);
        *circle.insert(p) = 42;
        assert_eq!(circle.get(p), Some(&42));
        assert_eq!(circle.len(), 1);

        // A far point aliasing the same lookup cell must not match.
        let aliased = p + Point::new(8, 8);
        assert!(circle.get(aliased).is_none());

        circle.remove(p);
        assert!(circle.get(p).is_none());
        assert_eq!(circle.len(), 0);
    }

    #[test]
    #[should_panic(expected = "already occupied")]
    fn test_double_insert_panics() {
        let mut circle: Circle<u32> = Circle::new(2.5);
        circle.insert(Point::ZERO);
        circle.insert(Point::ZERO);
    }

    #[test]
    fn test_evictions_after_recenter() {
        let mut circle: Circle<u32> = Circle::new(3.5);
        let points: Vec<Point> = circle.points().collect();
        for &point in &points {
            *circle.insert(point) = 1;
        }

        let center = Point::new(5, 0);
        let mut evicted = Vec::new();
        circle.evictions_into(center, &mut evicted);
        for &point in &evicted {
            assert!(!circle.in_range_of(point, center));
            circle.remove(point);
        }
        circle.set_center(center);

        // Everything still cached is admissible from the new center.
        for point in circle.points() {
            if let Some(_) = circle.get(point) {
                assert!(circle.in_range_of(point, center));
            }
        }
        assert!(!evicted.is_empty());
        assert_eq!(circle.len() + evicted.len(), points.len());
    }

    #[test]
    fn test_get_disjoint_mut_zone() {
        let mut circle: Circle<u32> = Circle::new(2.5);
        for (i, p) in [Point::new(0, 0), Point::new(1, 0), Point::new(0, 1)]
            .into_iter()
            .enumerate()
        {
            *circle.insert(p) = i as u32;
        }

        let zone = circle
            .get_disjoint_mut([Point::new(0, 0), Point::new(1, 0), Point::new(0, 1)])
            .expect("all three points are present");
        assert_eq!([*zone[0], *zone[1], *zone[2]], [0, 1, 2]);

        assert!(circle
            .get_disjoint_mut([Point::new(0, 0), Point::new(2, 2)])
            .is_none());
    }
}
