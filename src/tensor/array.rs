//! Run-length-encoded arrays.
//!
//! An array stores the last position of each run as a key in a
//! [`RankDict`] and the run values in a parallel buffer, so `get` is a
//! rank query followed by one load. Adjacent runs always hold distinct
//! values and the final run ends at the logical length.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::tensor::buffer::Buffer;
use crate::tensor::dict::{make_dict, DictKey, RankDict, RankDictScanner, MAX_DICT_KEY};

/// A position within an array, at most 32768.
pub type ArrayPos = u32;

/// The largest supported logical length.
pub const MAX_ARRAY_LEN: ArrayPos = MAX_DICT_KEY as ArrayPos + 1;

/// A contiguous run of equal values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    pub pos: ArrayPos,
    pub len: ArrayPos,
}

impl Run {
    pub fn end(&self) -> ArrayPos {
        self.pos + self.len
    }
}

/// Run-length-encoded array over at most 32768 positions.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RleArray<T> {
    dict: RankDict,
    vals: Buffer<T>,
}

impl<T: Copy + Eq> RleArray<T> {
    /// A single run covering `len` positions.
    pub fn fill(len: ArrayPos, value: T) -> Self {
        assert!(len > 0 && len <= MAX_ARRAY_LEN, "bad array length");
        Self {
            dict: make_dict(&[(len - 1) as DictKey]),
            vals: Buffer::from_vec(vec![value]),
        }
    }

    /// Rebuild from parallel run-end and value buffers. The ends are the
    /// last position of each run and must be strictly ascending.
    pub fn from_parts(ends: &[DictKey], vals: Vec<T>) -> Self {
        assert_eq!(ends.len(), vals.len(), "run buffers must be parallel");
        Self {
            dict: make_dict(ends),
            vals: Buffer::from_vec(vals),
        }
    }

    /// Logical number of positions.
    pub fn len(&self) -> ArrayPos {
        if self.vals.is_empty() {
            0
        } else {
            self.dict.max() as ArrayPos + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    /// Number of stored runs.
    pub fn run_count(&self) -> usize {
        self.vals.len()
    }

    /// Value at the given position.
    pub fn get(&self, pos: ArrayPos) -> T {
        assert!(pos < self.len(), "array position out of range");
        self.vals[self.dict.rank(pos as DictKey) as usize]
    }

    /// Visit every run in order.
    pub fn scan(&self, mut fn_: impl FnMut(Run, T)) {
        for (run, val) in self.runs() {
            fn_(run, val);
        }
    }

    /// Iterator over `(run, value)` pairs in position order.
    pub fn runs(&self) -> Runs<'_, T> {
        Runs {
            scanner: RankDictScanner::new(&self.dict),
            vals: &self.vals,
            start: 0,
        }
    }

    /// Whether any run value satisfies the predicate.
    pub fn any(&self, pred: impl Fn(T) -> bool) -> bool {
        self.vals.iter().any(|&val| pred(val))
    }

    /// Element-wise transform. Runs mapping to equal values coalesce.
    pub fn map<U: Copy + Eq>(&self, mut f: impl FnMut(T) -> U) -> RleArray<U> {
        let mut out = RleArrayBuilder::new();
        self.scan(|run, val| out.add_run(run.len, f(val)));
        out.build()
    }

    /// Position-wise transform.
    pub fn map_dense<U: Copy + Eq>(&self, mut f: impl FnMut(ArrayPos, T) -> U) -> RleArray<U> {
        let mut out = RleArrayBuilder::new();
        self.scan(|run, val| {
            for i in 0..run.len {
                out.add(f(run.pos + i, val));
            }
        });
        out.build()
    }

    /// The same values in reverse position order.
    pub fn reversed(&self) -> Self {
        let mut runs = Vec::with_capacity(self.run_count());
        self.scan(|run, val| runs.push((run.len, val)));

        let mut out = RleArrayBuilder::new();
        for &(len, val) in runs.iter().rev() {
            out.add_run(len, val);
        }
        out.build()
    }

    /// Visit the aligned segments where the two arrays hold different
    /// values.
    pub fn diff(&self, other: &RleArray<T>, mut fn_: impl FnMut(Run, T, T)) {
        assert_eq!(self.len(), other.len(), "diff length mismatch");
        let mut lhs = self.runs();
        let mut rhs = other.runs();
        let mut cur_l = lhs.next();
        let mut cur_r = rhs.next();
        let mut pos = 0;
        while let (Some((run_l, vl)), Some((run_r, vr))) = (cur_l, cur_r) {
            let end = run_l.end().min(run_r.end());
            if vl != vr {
                fn_(Run { pos, len: end - pos }, vl, vr);
            }
            pos = end;
            if end == run_l.end() {
                cur_l = lhs.next();
            }
            if end == run_r.end() {
                cur_r = rhs.next();
            }
        }
    }

    /// Heap footprint in bytes.
    pub fn storage_size(&self) -> usize {
        self.dict.storage_size() + self.vals.storage_size()
    }
}

/// Element-wise combination of two equal-length arrays. Aligned runs are
/// combined whole, so the output run count is bounded by the sum of the
/// input run counts.
pub fn merge<A, B, O>(
    a: &RleArray<A>,
    b: &RleArray<B>,
    mut f: impl FnMut(A, B) -> O,
) -> RleArray<O>
where
    A: Copy + Eq,
    B: Copy + Eq,
    O: Copy + Eq,
{
    assert_eq!(a.len(), b.len(), "merge length mismatch");
    let mut lhs = a.runs();
    let mut rhs = b.runs();
    let mut cur_a = lhs.next();
    let mut cur_b = rhs.next();
    let mut pos = 0;
    let mut out = RleArrayBuilder::new();
    while let (Some((run_a, va)), Some((run_b, vb))) = (cur_a, cur_b) {
        let end = run_a.end().min(run_b.end());
        out.add_run(end - pos, f(va, vb));
        pos = end;
        if end == run_a.end() {
            cur_a = lhs.next();
        }
        if end == run_b.end() {
            cur_b = rhs.next();
        }
    }
    out.build()
}

/// Iterator over the runs of an [`RleArray`].
pub struct Runs<'a, T> {
    scanner: RankDictScanner<'a>,
    vals: &'a Buffer<T>,
    start: ArrayPos,
}

impl<'a, T: Copy> Iterator for Runs<'a, T> {
    type Item = (Run, T);

    fn next(&mut self) -> Option<(Run, T)> {
        if self.scanner.done() {
            return None;
        }
        let entry = self.scanner.curr();
        let end = entry.key as ArrayPos + 1;
        let run = Run {
            pos: self.start,
            len: end - self.start,
        };
        let val = self.vals[entry.rank as usize];
        self.start = end;
        self.scanner.next();
        Some((run, val))
    }
}

/// Builds an array from in-order runs, coalescing equal neighbours.
#[derive(Clone, Debug)]
pub struct RleArrayBuilder<T> {
    total: ArrayPos,
    ends: Vec<DictKey>,
    vals: Vec<T>,
}

impl<T: Copy + Eq> RleArrayBuilder<T> {
    pub fn new() -> Self {
        Self {
            total: 0,
            ends: Vec::new(),
            vals: Vec::new(),
        }
    }

    /// Positions appended so far.
    pub fn len(&self) -> ArrayPos {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Append one position.
    pub fn add(&mut self, value: T) {
        self.add_run(1, value);
    }

    /// Append a run of `len` equal values.
    pub fn add_run(&mut self, len: ArrayPos, value: T) {
        if len == 0 {
            return;
        }
        let end = self.total + len;
        assert!(end <= MAX_ARRAY_LEN, "array length overflow");
        if self.vals.last() == Some(&value) {
            *self.ends.last_mut().unwrap() = (end - 1) as DictKey;
        } else {
            self.ends.push((end - 1) as DictKey);
            self.vals.push(value);
        }
        self.total = end;
    }

    pub fn build(self) -> RleArray<T> {
        RleArray {
            dict: make_dict(&self.ends),
            vals: Buffer::from_vec(self.vals),
        }
    }
}

impl<T: Copy + Eq> Default for RleArrayBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct Pending<T> {
    lo: ArrayPos,
    hi: ArrayPos,
    val: T,
    time: usize,
}

impl<T: Eq> PartialEq for Pending<T> {
    fn eq(&self, other: &Self) -> bool {
        self.lo == other.lo && self.time == other.time
    }
}

impl<T: Eq> Eq for Pending<T> {}

impl<T: Eq> PartialOrd for Pending<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Eq> Ord for Pending<T> {
    // Max-heap order: smallest lo wins, then the latest assignment.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .lo
            .cmp(&self.lo)
            .then(self.time.cmp(&other.time))
    }
}

/// Builds an array from overlapping range assignments with
/// last-writer-wins resolution.
///
/// The whole array is seeded with a fill value, later `add` calls
/// override earlier ones wherever they overlap, and the build sweep
/// emits the minimal run sequence.
pub struct RangesBuilder<T> {
    size: ArrayPos,
    data: Vec<Pending<T>>,
}

impl<T: Copy + Eq> RangesBuilder<T> {
    pub fn new(size: ArrayPos, fill: T) -> Self {
        assert!(size > 0 && size <= MAX_ARRAY_LEN, "bad array length");
        let mut builder = Self {
            size,
            data: Vec::new(),
        };
        builder.add_range(0, size, fill);
        builder
    }

    /// Assign `[lo, hi)` to the given value.
    pub fn add_range(&mut self, lo: ArrayPos, hi: ArrayPos, val: T) {
        assert!(lo < hi, "empty range");
        assert!(hi <= self.size, "range out of bounds");
        let time = self.data.len();
        self.data.push(Pending { lo, hi, val, time });
    }

    /// Assign a single position.
    pub fn add(&mut self, pos: ArrayPos, val: T) {
        assert!(pos < self.size, "position out of bounds");
        self.add_range(pos, pos + 1, val);
    }

    pub fn build(self) -> RleArray<T> {
        let mut heap = BinaryHeap::from(self.data);
        let mut out = RleArrayBuilder::new();

        // Sweep left to right. `cur` is the writer visible at the sweep
        // point; newer overlaps displace it, older overlaps get clipped
        // to its end and requeued.
        let mut cur = heap.pop().expect("ranges builder holds the fill range");
        while let Some(mut top) = heap.pop() {
            if top.lo == cur.hi {
                out.add_run(cur.hi - out.len(), cur.val);
                cur = top;
            } else {
                if top.time > cur.time {
                    out.add_run(top.lo - out.len(), cur.val);
                    std::mem::swap(&mut top, &mut cur);
                }
                top.lo = cur.hi;
                if top.lo < top.hi {
                    heap.push(top);
                }
            }
        }
        if out.len() < cur.hi {
            out.add_run(cur.hi - out.len(), cur.val);
        }
        out.build()
    }
}
