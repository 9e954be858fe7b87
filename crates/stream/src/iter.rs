use std::fmt;
use std::iter::FusedIterator;

use tilefield_common::{Axis, Dimensions, GridCoord};

/// One end of a dimension's inclusive range.
///
/// A dynamic bound is a function of the partially built coordinate: the axes
/// declared before this one hold their current values, the rest are 0.
pub enum Bound {
    Fixed(i32),
    Dynamic(Box<dyn Fn(&GridCoord) -> i32>),
}

impl Bound {
    pub fn from_fn(f: impl Fn(&GridCoord) -> i32 + 'static) -> Self {
        Bound::Dynamic(Box::new(f))
    }

    #[inline]
    fn eval(&self, partial: &GridCoord) -> i32 {
        match self {
            Bound::Fixed(v) => *v,
            Bound::Dynamic(f) => f(partial),
        }
    }
}

impl From<i32> for Bound {
    fn from(value: i32) -> Self {
        Bound::Fixed(value)
    }
}

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Fixed(v) => write!(f, "{v}"),
            Bound::Dynamic(_) => f.write_str("<fn>"),
        }
    }
}

#[derive(Debug)]
struct DimSpec {
    axis: Axis,
    min: Bound,
    max: Bound,
}

/// A bounded N-dimensional block of grid cells.
///
/// Iteration is the Cartesian product of the declared dimensions, the first
/// declared dimension outermost. Undeclared axes stay 0. Combinations whose
/// inner range is empty are skipped.
#[derive(Debug, Default)]
pub struct GridRange {
    dims: Vec<DimSpec>,
}

impl GridRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `axis` with inclusive bounds. Declaring an axis again replaces
    /// its bounds but keeps its nesting position.
    pub fn dim(mut self, axis: Axis, min: impl Into<Bound>, max: impl Into<Bound>) -> Self {
        let (min, max) = (min.into(), max.into());
        match self.dims.iter_mut().find(|d| d.axis == axis) {
            Some(existing) => {
                existing.min = min;
                existing.max = max;
            }
            None => self.dims.push(DimSpec { axis, min, max }),
        }
        self
    }

    /// The `(2 * range + 1)`-wide box around `center` on every enabled axis.
    pub fn around(center: GridCoord, range: u32, dims: Dimensions) -> Self {
        let r = range.min(i32::MAX as u32) as i32;
        dims.enabled().fold(GridRange::new(), |grid, axis| {
            let c = center.get(axis);
            grid.dim(axis, c.saturating_sub(r), c.saturating_add(r))
        })
    }

    /// Declared axes, outermost first.
    pub fn axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.dims.iter().map(|d| d.axis)
    }

    pub fn iter(&self) -> GridIter<'_> {
        GridIter {
            dims: &self.dims,
            current: GridCoord::ORIGIN,
            state: IterState::Fresh,
        }
    }

    /// Call `visitor` for every cell in order.
    pub fn for_each(&self, mut visitor: impl FnMut(GridCoord)) {
        for coord in self {
            visitor(coord);
        }
    }

    /// Call `visitor` for every cell in order, stopping at the first error.
    pub fn try_for_each<E>(
        &self,
        mut visitor: impl FnMut(GridCoord) -> Result<(), E>,
    ) -> Result<(), E> {
        for coord in self {
            visitor(coord)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a GridRange {
    type Item = GridCoord;
    type IntoIter = GridIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Fresh,
    Running,
    Done,
}

/// Lazy iterator over a [`GridRange`].
#[derive(Debug)]
pub struct GridIter<'a> {
    dims: &'a [DimSpec],
    current: GridCoord,
    state: IterState,
}

impl GridIter<'_> {
    /// Zero the components from `level` inward so bounds only see outer axes.
    fn clear_from(&mut self, level: usize) {
        for d in &self.dims[level..] {
            self.current.set(d.axis, 0);
        }
    }

    /// Fill levels `level..` with their minimums, backtracking past empty ranges.
    fn seek(&mut self, mut level: usize) -> bool {
        while level < self.dims.len() {
            self.clear_from(level);
            let dim = &self.dims[level];
            let lo = dim.min.eval(&self.current);
            let hi = dim.max.eval(&self.current);
            if lo <= hi {
                self.current.set(dim.axis, lo);
                level += 1;
            } else {
                match self.advance(level) {
                    Some(next) => level = next,
                    None => return false,
                }
            }
        }
        true
    }

    /// Step the innermost level below `level` that still has room; returns the
    /// first level that must be refilled.
    fn advance(&mut self, level: usize) -> Option<usize> {
        for l in (0..level).rev() {
            let dim = &self.dims[l];
            let value = self.current.get(dim.axis);
            self.clear_from(l);
            let hi = dim.max.eval(&self.current);
            if value < hi {
                self.current.set(dim.axis, value + 1);
                return Some(l + 1);
            }
        }
        None
    }
}

impl Iterator for GridIter<'_> {
    type Item = GridCoord;

    fn next(&mut self) -> Option<GridCoord> {
        let found = match self.state {
            IterState::Done => return None,
            IterState::Fresh => {
                self.state = IterState::Running;
                self.seek(0)
            }
            IterState::Running => match self.advance(self.dims.len()) {
                Some(level) => self.seek(level),
                None => false,
            },
        };
        if found {
            Some(self.current)
        } else {
            self.state = IterState::Done;
            None
        }
    }
}

impl FusedIterator for GridIter<'_> {}
