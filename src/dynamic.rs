//! Dynamic bit vector: a B+-tree of packed counters over word-sized leaves.
//!
//! The vector supports point reads, point writes and arbitrary-position
//! insertion in `O(log n)` word operations while keeping the space
//! overhead succinct: interior nodes are a handful of machine words of
//! packed prefix-sum counters, and every leaf is a single `u64` of bits.
//!
//! # Layout
//!
//! All interior nodes live in three parallel [`PackedVec`] arrays:
//!
//! - `sizes[node * d + k]` — bits in children `0..=k` of `node` (a
//!   prefix sum, so a child's own size is a difference of neighbours).
//! - `ranks[node * d + k]` — set bits in children `0..=k`.
//! - `pointers[node * (d + 1) + k]` — child indices; leaf index 0 is
//!   reserved as the null leaf, so a zero pointer marks an unused slot.
//!
//! Descent binary-searches nothing: [`PackedView::find`] compares a whole
//! word of counters against the target index at once. An insert walks the
//! same path, bumping the prefix sums as it goes; when it meets a full
//! child it first evens out a window of `b` adjacent siblings, growing
//! the window by one fresh sibling when the whole window is near
//! capacity. That window scheme is what makes insertion near the leaves
//! amortized constant.
//!
//! [`PackedView::find`]: crate::packed::PackedView::find

use std::fmt;

use crate::bitview::{mask, BitVec, BitView};
use crate::error::{Error, Result};
use crate::packed::PackedVec;

/// Bits held by one leaf word.
const LEAF_BITS: usize = 64;

/// Default node width in bits for [`DynamicBitVector::new`].
pub const DEFAULT_NODE_WIDTH: usize = 256;

/// A node of the tree viewed together with the subtree metadata that is
/// not stored in the node itself but carried down during descent.
#[derive(Clone, Copy)]
struct SubtreeRef {
    /// Node index, or leaf index when `height == 0`.
    index: usize,
    /// Distance from this node down to the leaves.
    height: usize,
    /// Bits in the subtree.
    size: usize,
    /// Set bits in the subtree.
    rank: usize,
}

/// Derived per-tree geometry, fixed at construction.
struct Layout {
    counter_width: usize,
    pointer_width: usize,
    degree: usize,
    buffer: usize,
    leaf_count: usize,
    node_count: usize,
}

/// Bits needed to address `x` distinct values, at least 1.
fn ceil_log2(x: usize) -> usize {
    if x <= 2 {
        1
    } else {
        (usize::BITS - (x - 1).leading_zeros()) as usize
    }
}

/// Interior-node count for `leaves` leaves when every node has at least
/// `min_degree` children: a geometric series up to the root.
fn node_series(leaves: usize, min_degree: usize) -> usize {
    let mut count = 0;
    let mut level = leaves;
    loop {
        level = level.div_ceil(min_degree);
        count += level;
        if level <= 1 {
            break;
        }
    }
    count
}

fn layout(capacity: usize, node_width: usize, counter_width: usize) -> Result<Layout> {
    let degree = node_width / counter_width;

    // Window width: the largest b with floor((d + 1) / b) >= b.
    let mut buffer = ((degree as f64).sqrt().ceil() as usize).max(1);
    while (degree + 1) / buffer < buffer {
        buffer -= 1;
    }
    if buffer < 2 {
        return Err(Error::InvalidGeometry(
            "node width too narrow for the counters of this capacity",
        ));
    }
    if buffer >= LEAF_BITS {
        return Err(Error::InvalidGeometry(
            "node width too large for 64-bit leaves",
        ));
    }

    // A leaf window that has been through a split leaves every leaf at
    // least this full; the initial pools are sized for that steady state.
    let min_leaf_fill = buffer * (LEAF_BITS - buffer) / (buffer + 1);
    if min_leaf_fill == 0 {
        return Err(Error::InvalidGeometry(
            "redistribution window leaves no guaranteed leaf fill",
        ));
    }
    let leaf_count = capacity.div_ceil(min_leaf_fill);
    let node_count = node_series(leaf_count, buffer);

    // Pointers must be able to address the true worst case, which is
    // weaker: any redistribution deals at least floor(64 / (b + 1)) bits
    // into every leaf it touches (the window always contains one full
    // leaf), so leaves can transiently sit well below `min_leaf_fill`.
    let spread_floor = (LEAF_BITS / (buffer + 1)).max(1);
    let leaf_bound = capacity.div_ceil(spread_floor) + 1;
    let node_bound = node_series(leaf_bound, buffer);
    let pointer_width = ceil_log2(node_bound.max(leaf_bound + 1));

    Ok(Layout {
        counter_width,
        pointer_width,
        degree,
        buffer,
        leaf_count,
        node_count,
    })
}

/// An indexed, mutable bit sequence with logarithmic-time insertion.
///
/// Fixed-capacity: the maximum number of bits is declared at
/// construction, which determines the counter and pointer widths of the
/// packed tree nodes.
///
/// # Example
///
/// ```rust
/// use dbits::DynamicBitVector;
///
/// let mut v = DynamicBitVector::new(1000).unwrap();
/// v.push_back(true).unwrap();
/// v.push_back(false).unwrap();
/// v.insert(1, true).unwrap();
///
/// assert_eq!(v.len(), 3);
/// assert!(v.get(0).unwrap());
/// assert!(v.get(1).unwrap());
/// assert!(!v.get(2).unwrap());
/// ```
pub struct DynamicBitVector {
    /// Maximum number of bits the vector may hold.
    capacity: usize,
    /// Number of bits per node used when sizing counters and pointers.
    node_width: usize,
    /// Current number of bits.
    size: usize,
    /// Current number of set bits.
    rank: usize,
    /// Distance from the root to the leaves; the root is always node 0.
    height: usize,
    /// Bits per size/rank counter, including the spare flag bit.
    counter_width: usize,
    /// Bits per child pointer.
    pointer_width: usize,
    /// Counters per node (`d`); nodes hold up to `d + 1` children.
    degree: usize,
    /// Redistribution window width (`b`), for both leaves and nodes.
    buffer: usize,
    /// Nodes currently allocated in the pools.
    node_slots: usize,
    /// Next unused node index.
    free_node: usize,
    /// Next unused leaf index; starts at 1, leaf 0 is the null leaf.
    free_leaf: usize,
    sizes: PackedVec,
    ranks: PackedVec,
    pointers: PackedVec,
    leaves: Vec<u64>,
}

impl DynamicBitVector {
    /// Create an empty vector able to hold up to `capacity` bits, with
    /// the default node width.
    pub fn new(capacity: usize) -> Result<Self> {
        Self::with_node_width(capacity, DEFAULT_NODE_WIDTH)
    }

    /// Create an empty vector with an explicit node width (a positive
    /// multiple of 64). Wider nodes mean flatter trees and more work per
    /// node; 256 is a good default.
    pub fn with_node_width(capacity: usize, node_width: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidGeometry("capacity must be at least 1"));
        }
        if node_width == 0 || node_width % 64 != 0 {
            return Err(Error::InvalidGeometry(
                "node width must be a positive multiple of 64",
            ));
        }

        // Counters must hold any prefix sum up to `capacity` and still
        // keep the top flag bit clear. Small capacities with wide nodes
        // can make the pointers outgrow the counters or the node; the
        // loop widens the counters until everything fits, or fails.
        let value_bits = (usize::BITS - capacity.leading_zeros()) as usize;
        let mut counter_width = value_bits + 1;
        let lay = loop {
            if counter_width > LEAF_BITS {
                return Err(Error::InvalidGeometry(
                    "capacity too large for 64-bit counters",
                ));
            }
            let lay = layout(capacity, node_width, counter_width)?;
            if lay.pointer_width <= counter_width
                && lay.pointer_width * (lay.degree + 1) <= node_width
            {
                break lay;
            }
            counter_width += 1;
        };

        Ok(Self {
            capacity,
            node_width,
            size: 0,
            rank: 0,
            height: 1,
            counter_width: lay.counter_width,
            pointer_width: lay.pointer_width,
            degree: lay.degree,
            buffer: lay.buffer,
            node_slots: lay.node_count,
            free_node: 1,
            free_leaf: 1,
            sizes: PackedVec::new(lay.counter_width, lay.node_count * lay.degree),
            ranks: PackedVec::new(lay.counter_width, lay.node_count * lay.degree),
            pointers: PackedVec::new(lay.pointer_width, lay.node_count * (lay.degree + 1)),
            leaves: vec![0; lay.leaf_count + 1],
        })
    }

    /// Current number of bits.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether the vector holds no bits.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Maximum number of bits.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the vector is at capacity.
    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Number of set bits in the whole vector.
    pub fn count_ones(&self) -> usize {
        self.rank
    }

    /// Distance from the root node to the leaves.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Leaves allocated so far (the null leaf not counted).
    pub fn used_leaves(&self) -> usize {
        self.free_leaf - 1
    }

    /// Interior nodes allocated so far, the root included.
    pub fn used_nodes(&self) -> usize {
        self.free_node
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.sizes.heap_bytes()
            + self.ranks.heap_bytes()
            + self.pointers.heap_bytes()
            + self.leaves.capacity() * 8
    }

    /// Return the bit at position `i`.
    pub fn get(&self, i: usize) -> Result<bool> {
        if i >= self.size {
            return Err(Error::IndexOutOfBounds(i));
        }
        let mut node = self.root_ref();
        let mut idx = i;
        while node.height > 0 {
            let (k, rel) = self.find_bit(node, idx);
            node = self.child_ref(node, k);
            idx = rel;
        }
        Ok((self.leaves[node.index] >> idx) & 1 == 1)
    }

    /// Overwrite the bit at position `i`.
    pub fn set(&mut self, i: usize, bit: bool) -> Result<()> {
        if i >= self.size {
            return Err(Error::IndexOutOfBounds(i));
        }
        let mut node = self.root_ref();
        let mut idx = i;
        let mut path = Vec::with_capacity(self.height);
        while node.height > 0 {
            let (k, rel) = self.find_bit(node, idx);
            path.push((node.index, k));
            node = self.child_ref(node, k);
            idx = rel;
        }
        let old = (self.leaves[node.index] >> idx) & 1 == 1;
        if old == bit {
            return Ok(());
        }
        self.leaves[node.index] ^= 1 << idx;
        let d = self.degree;
        for (n, k) in path {
            let row = n * d;
            if bit {
                self.ranks.increment(row + k, row + d, 1);
            } else {
                self.ranks.decrement(row + k, row + d, 1);
            }
        }
        if bit {
            self.rank += 1;
        } else {
            self.rank -= 1;
        }
        Ok(())
    }

    /// Insert `bit` just before position `i` (so `i == len()` appends).
    pub fn insert(&mut self, i: usize, bit: bool) -> Result<()> {
        if i > self.size {
            return Err(Error::IndexOutOfBounds(i));
        }
        if self.size == self.capacity {
            return Err(Error::CapacityExhausted);
        }
        if self.num_children(self.root_ref()) == self.degree + 1 {
            self.grow_root()?;
        }
        self.insert_into(self.root_ref(), i, bit)?;
        self.size += 1;
        if bit {
            self.rank += 1;
        }
        Ok(())
    }

    /// Append a bit.
    pub fn push_back(&mut self, bit: bool) -> Result<()> {
        self.insert(self.size, bit)
    }

    /// Prepend a bit.
    pub fn push_front(&mut self, bit: bool) -> Result<()> {
        self.insert(0, bit)
    }

    /// Iterate over the bits, front to back.
    ///
    /// Every step re-descends from the root, so a full walk costs
    /// `O(n log n)`; meant for dumps and test comparisons, not bulk
    /// extraction.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            vector: self,
            index: 0,
        }
    }

    /// Walk the whole tree and check its structural invariants: prefix
    /// sums monotone and consistent with the children, ranks bounded by
    /// sizes, minimum occupancy away from the root, pointers used and
    /// unused where they should be, and no stray bits beyond a leaf's
    /// size. A failure indicates a bug in this crate.
    pub fn validate(&self) -> Result<()> {
        let (bits, ones) = self.validate_subtree(self.root_ref(), true)?;
        if bits != self.size || ones != self.rank {
            return Err(Error::InvariantViolation(format!(
                "tree totals {bits}/{ones} disagree with len {}/{}",
                self.size, self.rank
            )));
        }
        Ok(())
    }

    /*
     * Descent plumbing.
     */

    fn root_ref(&self) -> SubtreeRef {
        SubtreeRef {
            index: 0,
            height: self.height,
            size: self.size,
            rank: self.rank,
        }
    }

    fn size_field(&self, node: usize, k: usize) -> usize {
        self.sizes.get(node * self.degree + k) as usize
    }

    fn rank_field(&self, node: usize, k: usize) -> usize {
        self.ranks.get(node * self.degree + k) as usize
    }

    fn ptr_field(&self, node: usize, k: usize) -> usize {
        self.pointers.get(node * (self.degree + 1) + k) as usize
    }

    /// Size of the subtree under child slot `k`, from the prefix sums.
    fn child_size(&self, node: SubtreeRef, k: usize) -> usize {
        if k == 0 {
            self.size_field(node.index, 0)
        } else if k == self.degree {
            node.size - self.size_field(node.index, self.degree - 1)
        } else {
            self.size_field(node.index, k) - self.size_field(node.index, k - 1)
        }
    }

    fn child_rank(&self, node: SubtreeRef, k: usize) -> usize {
        if k == 0 {
            self.rank_field(node.index, 0)
        } else if k == self.degree {
            node.rank - self.rank_field(node.index, self.degree - 1)
        } else {
            self.rank_field(node.index, k) - self.rank_field(node.index, k - 1)
        }
    }

    /// The subtree reference for child slot `k`; at height 1 the result
    /// refers to a leaf.
    fn child_ref(&self, node: SubtreeRef, k: usize) -> SubtreeRef {
        debug_assert!(node.height > 0 && k <= self.degree);
        SubtreeRef {
            index: self.ptr_field(node.index, k),
            height: node.height - 1,
            size: self.child_size(node, k),
            rank: self.child_rank(node, k),
        }
    }

    /// The child slot where a bit may be *inserted* at `index`, and the
    /// index relative to that subtree. Boundary indices resolve to the
    /// end of the left subtree.
    fn find_insert_point(&self, node: SubtreeRef, index: usize) -> (usize, usize) {
        let row = node.index * self.degree;
        let k = self.sizes.find(row, row + self.degree, index as u64) - row;
        let rel = if k == 0 {
            index
        } else {
            index - self.size_field(node.index, k - 1)
        };
        (k, rel)
    }

    /// The child slot that *contains* the bit at `index`. Same as the
    /// insert point except that boundary indices bump to the start of
    /// the right subtree.
    fn find_bit(&self, node: SubtreeRef, index: usize) -> (usize, usize) {
        let (k, rel) = self.find_insert_point(node, index);
        if rel == self.child_size(node, k) {
            (k + 1, 0)
        } else {
            (k, rel)
        }
    }

    /// Children in use, derived from the prefix sums: the slot where
    /// `size` would be inserted is the last used one.
    fn num_children(&self, node: SubtreeRef) -> usize {
        if node.size == 0 {
            return 0;
        }
        let row = node.index * self.degree;
        self.sizes.find(row, row + self.degree, node.size as u64) - row + 1
    }

    /*
     * Allocation. Nodes and leaves are handed out monotonically and
     * never freed; the pools start at the sizes the capacity calls for
     * and may grow up to what the pointer width can address.
     */

    fn alloc_node(&mut self) -> Result<usize> {
        if self.free_node == self.node_slots {
            let max_nodes = 1usize << self.pointer_width;
            if self.node_slots >= max_nodes {
                return Err(Error::CapacityExhausted);
            }
            let grown = (self.node_slots * 2).min(max_nodes);
            self.sizes.resize(grown * self.degree);
            self.ranks.resize(grown * self.degree);
            self.pointers.resize(grown * (self.degree + 1));
            self.node_slots = grown;
        }
        let n = self.free_node;
        self.free_node += 1;
        Ok(n)
    }

    fn alloc_leaf(&mut self) -> Result<usize> {
        if self.free_leaf == self.leaves.len() {
            let max_leaves = 1usize << self.pointer_width;
            if self.leaves.len() >= max_leaves {
                return Err(Error::CapacityExhausted);
            }
            let grown = (self.leaves.len() * 2).min(max_leaves);
            self.leaves.resize(grown, 0);
        }
        let l = self.free_leaf;
        self.free_leaf += 1;
        Ok(l)
    }

    /*
     * Insertion.
     */

    /// Make room above a full root: move the root's contents into a
    /// fresh node and leave the root as a single-child node over it.
    /// This is the only step that increases the height, and it keeps the
    /// root at node index 0.
    fn grow_root(&mut self) -> Result<()> {
        let d = self.degree;
        let fresh = self.alloc_node()?;
        self.sizes.copy_within(0, d, fresh * d);
        self.ranks.copy_within(0, d, fresh * d);
        self.pointers.copy_within(0, d + 1, fresh * (d + 1));
        // A single child owns everything, so every prefix sum is the
        // whole subtree.
        self.sizes.fill(0, d, self.size as u64);
        self.ranks.fill(0, d, self.rank as u64);
        self.pointers.fill(0, d + 1, 0);
        self.pointers.set(0, fresh as u64);
        self.height += 1;
        Ok(())
    }

    fn insert_into(&mut self, node: SubtreeRef, index: usize, bit: bool) -> Result<()> {
        let d = self.degree;
        let (mut k, mut rel) = self.find_insert_point(node, index);

        if node.height == 1 {
            let mut leaf = self.ptr_field(node.index, k);
            if leaf == 0 {
                // Very first insert: the empty root has no leaf yet.
                leaf = self.alloc_leaf()?;
                self.pointers.set(node.index * (d + 1) + k, leaf as u64);
            } else if self.child_size(node, k) == LEAF_BITS {
                self.rebalance(node, k)?;
                let found = self.find_insert_point(node, index);
                k = found.0;
                rel = found.1;
                leaf = self.ptr_field(node.index, k);
            }
            let row = node.index * d;
            self.sizes.increment(row + k, row + d, 1);
            if bit {
                self.ranks.increment(row + k, row + d, 1);
            }
            let word = self.leaves[leaf];
            let low = word & mask(rel);
            let high = (word & !mask(rel)) << 1;
            self.leaves[leaf] = high | low | (u64::from(bit) << rel);
            Ok(())
        } else {
            if self.num_children(self.child_ref(node, k)) == d + 1 {
                self.rebalance(node, k)?;
                let found = self.find_insert_point(node, index);
                k = found.0;
                rel = found.1;
            }
            let child = self.child_ref(node, k);
            let row = node.index * d;
            self.sizes.increment(row + k, row + d, 1);
            if bit {
                self.ranks.increment(row + k, row + d, 1);
            }
            self.insert_into(child, rel, bit)
        }
    }

    /// Even out the window of siblings around the full child at slot
    /// `c`, first inserting one fresh sibling when the window as a whole
    /// is close to capacity.
    fn rebalance(&mut self, node: SubtreeRef, c: usize) -> Result<()> {
        let b = self.buffer;
        let (begin, mut end, occupied) = self.select_window(node, c);
        let threshold = if node.height == 1 {
            b * (LEAF_BITS - b)
        } else {
            b * (b + 1)
        };
        // When the window already reaches the last slot it must contain
        // an unused one (this node is not full), so there is nothing to
        // grow: the redistribution below fills that slot instead.
        if occupied >= threshold && end <= self.degree {
            self.insert_slot(node, end)?;
            end += 1;
        }
        if node.height == 1 {
            self.spread_bits(node, begin, end)
        } else {
            self.spread_children(node, begin, end)
        }
    }

    /// Pick the `b`-wide run of consecutive child slots containing `c`
    /// with the most free capacity (earliest on ties). Returns the
    /// window and the occupancy summed over it — bits for leaf windows,
    /// children for node windows.
    fn select_window(&self, node: SubtreeRef, c: usize) -> (usize, usize, usize) {
        let d = self.degree;
        let b = self.buffer;
        let max_count = if node.height == 1 { LEAF_BITS } else { d + 1 };
        let lo = c.saturating_sub(b - 1);
        let hi = c.min(d + 1 - b);
        let mut best_begin = lo;
        let mut best_free = 0;
        for wb in lo..=hi {
            let free: usize = (wb..wb + b)
                .map(|i| self.slot_free(node, i, max_count))
                .sum();
            if free > best_free {
                best_begin = wb;
                best_free = free;
            }
        }
        (best_begin, best_begin + b, max_count * b - best_free)
    }

    fn slot_free(&self, node: SubtreeRef, i: usize, max_count: usize) -> usize {
        if self.ptr_field(node.index, i) == 0 {
            max_count
        } else if node.height == 1 {
            LEAF_BITS - self.child_size(node, i)
        } else {
            self.degree + 1 - self.num_children(self.child_ref(node, i))
        }
    }

    /// Insert an empty child at slot `k`, shifting the slots above it
    /// one place to the right. The caller guarantees the node is not
    /// full, so the last slot is free to receive the shift.
    fn insert_slot(&mut self, node: SubtreeRef, k: usize) -> Result<()> {
        let d = self.degree;
        debug_assert!(k >= 1 && k <= d);
        let srow = node.index * d;
        let prow = node.index * (d + 1);
        if k < d {
            // An empty child repeats the boundary prefix sum, which is
            // exactly what shifting the counter fields up produces.
            self.sizes.copy_within(srow + k - 1, srow + d - 1, srow + k);
            self.ranks.copy_within(srow + k - 1, srow + d - 1, srow + k);
            self.pointers.copy_within(prow + k, prow + d, prow + k + 1);
        }
        let fresh = if node.height == 1 {
            self.alloc_leaf()?
        } else {
            self.alloc_node()?
        };
        self.pointers.set(prow + k, fresh as u64);
        Ok(())
    }

    /// Zero the window `[begin, end)` out of the parent's prefix sums:
    /// fields inside the window drop to the left boundary sum, fields to
    /// the right lose the window's totals. The per-slot contributions
    /// are added back as the redistribution deals the contents out.
    fn clear_window_counters(
        &mut self,
        node: SubtreeRef,
        begin: usize,
        end: usize,
        total_size: u64,
        total_rank: u64,
    ) {
        let d = self.degree;
        let srow = node.index * d;
        let base_s = if begin > 0 {
            self.size_field(node.index, begin - 1) as u64
        } else {
            0
        };
        let base_r = if begin > 0 {
            self.rank_field(node.index, begin - 1) as u64
        } else {
            0
        };
        let keys_end = end.min(d);
        self.sizes.fill(srow + begin, srow + keys_end, base_s);
        self.ranks.fill(srow + begin, srow + keys_end, base_r);
        self.sizes.decrement(srow + keys_end, srow + d, total_size);
        self.ranks.decrement(srow + keys_end, srow + d, total_rank);
    }

    /// Deal the bits of the leaf window `[begin, end)` back out as
    /// evenly as possible, allocating leaves for unused slots.
    fn spread_bits(&mut self, node: SubtreeRef, begin: usize, end: usize) -> Result<()> {
        let d = self.degree;
        let width = end - begin;

        // Concatenate the window's live bits, in order.
        let mut scratch = BitVec::new(width * LEAF_BITS);
        let mut total = 0;
        let mut total_rank = 0u64;
        for i in begin..end {
            let p = self.ptr_field(node.index, i);
            if p == 0 {
                continue;
            }
            let sz = self.child_size(node, i);
            let word = self.leaves[p] & mask(sz);
            scratch.set(total, total + sz, word);
            total += sz;
            total_rank += u64::from(word.count_ones());
        }

        self.clear_window_counters(node, begin, end, total as u64, total_rank);

        let per = total / width;
        let mut rem = total % width;
        let mut cursor = 0;
        let srow = node.index * d;
        for i in begin..end {
            let count = per + usize::from(rem > 0);
            rem = rem.saturating_sub(1);
            let mut p = self.ptr_field(node.index, i);
            if p == 0 {
                p = self.alloc_leaf()?;
                self.pointers.set(node.index * (d + 1) + i, p as u64);
            }
            let word = scratch.get(cursor, cursor + count);
            self.leaves[p] = word;
            cursor += count;
            self.sizes.increment(srow + i, srow + d, count as u64);
            self.ranks
                .increment(srow + i, srow + d, u64::from(word.count_ones()));
        }
        debug_assert!(cursor == total);
        Ok(())
    }

    /// Deal the grandchildren of the node window `[begin, end)` back out
    /// as evenly as possible, rewriting each window node's counters and
    /// pointers from scratch.
    fn spread_children(&mut self, node: SubtreeRef, begin: usize, end: usize) -> Result<()> {
        let d = self.degree;
        let width = end - begin;

        // Collect (size, rank, pointer) for every grandchild, in order.
        let mut entries: Vec<(u64, u64, u64)> = Vec::with_capacity(width * (d + 1));
        let mut window_size = 0u64;
        let mut window_rank = 0u64;
        for i in begin..end {
            if self.ptr_field(node.index, i) == 0 {
                continue;
            }
            let child = self.child_ref(node, i);
            for j in 0..self.num_children(child) {
                let g = self.child_ref(child, j);
                entries.push((
                    g.size as u64,
                    g.rank as u64,
                    self.ptr_field(child.index, j) as u64,
                ));
            }
            window_size += child.size as u64;
            window_rank += child.rank as u64;
        }
        let total = entries.len();

        self.clear_window_counters(node, begin, end, window_size, window_rank);

        let per = total / width;
        let mut rem = total % width;
        let mut cursor = 0;
        let nrow = node.index * d;
        for i in begin..end {
            let count = per + usize::from(rem > 0);
            rem = rem.saturating_sub(1);
            let mut p = self.ptr_field(node.index, i);
            if p == 0 {
                p = self.alloc_node()?;
                self.pointers.set(node.index * (d + 1) + i, p as u64);
            }
            let srow = p * d;
            let prow = p * (d + 1);
            let mut run_size = 0u64;
            let mut run_rank = 0u64;
            for j in 0..count {
                let (s, r, ptr) = entries[cursor + j];
                run_size += s;
                run_rank += r;
                if j < d {
                    self.sizes.set(srow + j, run_size);
                    self.ranks.set(srow + j, run_rank);
                }
                self.pointers.set(prow + j, ptr);
            }
            // Trailing counters repeat the totals; trailing slots are
            // unused and must read as null.
            self.sizes.fill(srow + count.min(d), srow + d, run_size);
            self.ranks.fill(srow + count.min(d), srow + d, run_rank);
            self.pointers.fill(prow + count, prow + d + 1, 0);
            cursor += count;
            self.sizes.increment(nrow + i, nrow + d, run_size);
            self.ranks.increment(nrow + i, nrow + d, run_rank);
        }
        debug_assert!(cursor == total);
        Ok(())
    }

    /*
     * Consistency checking.
     */

    fn validate_subtree(&self, node: SubtreeRef, is_root: bool) -> Result<(usize, usize)> {
        let fail = |msg: String| Err(Error::InvariantViolation(msg));

        if node.height == 0 {
            if node.index == 0 || node.index >= self.free_leaf {
                return fail(format!("leaf index {} outside the pool", node.index));
            }
            if node.size > LEAF_BITS {
                return fail(format!("leaf {} claims {} bits", node.index, node.size));
            }
            let word = self.leaves[node.index];
            if word & !mask(node.size) != 0 {
                return fail(format!("leaf {} has bits beyond its size", node.index));
            }
            if word.count_ones() as usize != node.rank {
                return fail(format!("leaf {} rank mismatch", node.index));
            }
            return Ok((node.size, node.rank));
        }

        if node.index >= self.free_node {
            return fail(format!("node index {} outside the pool", node.index));
        }
        let d = self.degree;
        let n = self.num_children(node);
        if !is_root && n != d + 1 && n < self.buffer {
            return fail(format!("node {} has only {n} children", node.index));
        }
        let mut prev_size = 0;
        let mut prev_rank = 0;
        for k in 0..d {
            let s = self.size_field(node.index, k);
            let r = self.rank_field(node.index, k);
            if r > s || s > node.size || s < prev_size || r < prev_rank {
                return fail(format!("node {} counter {k} out of order", node.index));
            }
            prev_size = s;
            prev_rank = r;
        }
        let mut sum_size = 0;
        let mut sum_rank = 0;
        for k in 0..=d {
            if k < n {
                if self.ptr_field(node.index, k) == 0 {
                    return fail(format!("node {} slot {k} used but null", node.index));
                }
                let (s, r) = self.validate_subtree(self.child_ref(node, k), false)?;
                sum_size += s;
                sum_rank += r;
            } else if self.ptr_field(node.index, k) != 0 {
                return fail(format!("node {} slot {k} unused but set", node.index));
            }
        }
        if sum_size != node.size || sum_rank != node.rank {
            return fail(format!("node {} children do not sum up", node.index));
        }
        Ok((node.size, node.rank))
    }
}

/// Iterator over the bits of a [`DynamicBitVector`].
pub struct Iter<'a> {
    vector: &'a DynamicBitVector,
    index: usize,
}

impl Iterator for Iter<'_> {
    type Item = bool;

    fn next(&mut self) -> Option<bool> {
        if self.index >= self.vector.len() {
            None
        } else {
            let bit = self.vector.get(self.index).ok()?;
            self.index += 1;
            Some(bit)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.vector.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a DynamicBitVector {
    type Item = bool;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for DynamicBitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicBitVector")
            .field("len", &self.size)
            .field("ones", &self.rank)
            .field("capacity", &self.capacity)
            .field("height", &self.height)
            .field("node_width", &self.node_width)
            .field("counter_width", &self.counter_width)
            .field("pointer_width", &self.pointer_width)
            .field("degree", &self.degree)
            .field("buffer", &self.buffer)
            .field("used_nodes", &self.used_nodes())
            .field("used_leaves", &self.used_leaves())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_for_default_width() {
        let v = DynamicBitVector::new(100_000).unwrap();
        assert_eq!(v.counter_width, 18);
        assert_eq!(v.degree, 14);
        assert_eq!(v.buffer, 3);
        assert!(v.pointer_width <= v.counter_width);
        assert!(v.pointer_width * (v.degree + 1) <= 256);
        assert_eq!(v.used_leaves(), 0);
        assert_eq!(v.used_nodes(), 1);
        assert_eq!(v.height(), 1);
    }

    #[test]
    fn test_geometry_rejects_bad_configs() {
        assert!(matches!(
            DynamicBitVector::new(0),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(matches!(
            DynamicBitVector::with_node_width(100, 100),
            Err(Error::InvalidGeometry(_))
        ));
        assert!(matches!(
            DynamicBitVector::with_node_width(1 << 40, 64),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_empty_vector() {
        let v = DynamicBitVector::new(100).unwrap();
        assert!(v.is_empty());
        assert!(!v.is_full());
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), 100);
        assert!(matches!(v.get(0), Err(Error::IndexOutOfBounds(0))));
        v.validate().unwrap();
    }

    #[test]
    fn test_push_back_and_get() {
        let mut v = DynamicBitVector::new(1000).unwrap();
        for i in 0..500 {
            v.push_back(i % 3 == 0).unwrap();
        }
        assert_eq!(v.len(), 500);
        for i in 0..500 {
            assert_eq!(v.get(i).unwrap(), i % 3 == 0, "bit {i}");
        }
        assert_eq!(v.count_ones(), 167);
        v.validate().unwrap();
    }

    #[test]
    fn test_push_front_reverses() {
        let mut v = DynamicBitVector::new(300).unwrap();
        for i in 0..200 {
            v.push_front(i % 2 == 0).unwrap();
        }
        for i in 0..200 {
            assert_eq!(v.get(i).unwrap(), (199 - i) % 2 == 0, "bit {i}");
        }
        v.validate().unwrap();
    }

    #[test]
    fn test_set_updates_ranks() {
        let mut v = DynamicBitVector::new(2000).unwrap();
        for _ in 0..1500 {
            v.push_back(false).unwrap();
        }
        assert_eq!(v.count_ones(), 0);
        v.set(0, true).unwrap();
        v.set(749, true).unwrap();
        v.set(1499, true).unwrap();
        assert_eq!(v.count_ones(), 3);
        assert!(v.get(749).unwrap());
        v.validate().unwrap();

        // Setting a bit to its current value must change nothing.
        v.set(749, true).unwrap();
        assert_eq!(v.count_ones(), 3);
        v.validate().unwrap();

        v.set(749, false).unwrap();
        assert_eq!(v.count_ones(), 2);
        assert!(!v.get(749).unwrap());
        v.validate().unwrap();
        assert!(matches!(
            v.set(1500, true),
            Err(Error::IndexOutOfBounds(1500))
        ));
    }

    #[test]
    fn test_insert_out_of_range_leaves_vector_alone() {
        let mut v = DynamicBitVector::new(100).unwrap();
        v.push_back(true).unwrap();
        assert!(matches!(v.insert(5, true), Err(Error::IndexOutOfBounds(5))));
        assert_eq!(v.len(), 1);
        v.validate().unwrap();
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut v = DynamicBitVector::new(64).unwrap();
        for _ in 0..64 {
            v.push_back(true).unwrap();
        }
        assert!(v.is_full());
        assert!(matches!(v.push_back(true), Err(Error::CapacityExhausted)));
        assert!(matches!(v.insert(0, false), Err(Error::CapacityExhausted)));
        assert_eq!(v.len(), 64);
        v.validate().unwrap();
    }

    #[test]
    fn test_middle_inserts_match_model() {
        let mut v = DynamicBitVector::new(5000).unwrap();
        let mut model: Vec<bool> = Vec::new();
        // A fixed multiplicative recurrence keeps the test deterministic.
        let mut state = 0x9E3779B9u64;
        for step in 0..3000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let at = (state >> 33) as usize % (model.len() + 1);
            let bit = state & 1 == 1;
            v.insert(at, bit).unwrap();
            model.insert(at, bit);
            if step % 500 == 499 {
                v.validate().unwrap();
                for (i, &b) in model.iter().enumerate() {
                    assert_eq!(v.get(i).unwrap(), b, "bit {i} after {step} inserts");
                }
            }
        }
        assert_eq!(v.len(), model.len());
        assert_eq!(v.count_ones(), model.iter().filter(|&&b| b).count());
        assert!(v.iter().eq(model.iter().copied()));
    }

    #[test]
    fn test_root_growth_keeps_height_consistent() {
        let mut v = DynamicBitVector::with_node_width(4096, 64).unwrap();
        // Narrow nodes (degree 4) force the tree tall quickly.
        for i in 0..2000 {
            v.push_back(i % 7 == 0).unwrap();
        }
        assert!(v.height() >= 3);
        v.validate().unwrap();
        for i in 0..2000 {
            assert_eq!(v.get(i).unwrap(), i % 7 == 0, "bit {i}");
        }
    }

    #[test]
    fn test_leaf_split_allocates_and_rebalances() {
        let mut v = DynamicBitVector::with_node_width(4096, 64).unwrap();
        assert_eq!(v.buffer, 2);
        let mut model: Vec<bool> = Vec::new();
        // Hammer the middle so one leaf keeps reaching 64 bits and the
        // window around it is repeatedly evened out and extended.
        let mut step = 0;
        while v.used_leaves() < 6 {
            let at = model.len() / 2;
            let bit = step % 3 == 0;
            v.insert(at, bit).unwrap();
            model.insert(at, bit);
            v.validate().unwrap();
            step += 1;
        }
        assert_eq!(v.len(), model.len());
        for (i, &b) in model.iter().enumerate() {
            assert_eq!(v.get(i).unwrap(), b, "bit {i}");
        }
    }

    #[test]
    fn test_split_threshold_boundary() {
        let mut v = DynamicBitVector::with_node_width(4096, 64).unwrap();
        assert_eq!(v.degree, 4);
        assert_eq!(v.buffer, 2);
        let min_fill = v.buffer * (LEAF_BITS - v.buffer) / (v.buffer + 1);
        assert_eq!(min_fill, 41);

        // Fill the first leaf, then one front insert spreads it over two
        // 32-bit leaves.
        for i in 0..64 {
            v.push_back(i % 3 == 0).unwrap();
        }
        v.insert(0, true).unwrap();
        assert_eq!(v.used_leaves(), 2);

        // Pump the front leaf back to 64 bits and the second to 60: the
        // only window around slot 0 then carries exactly
        // b * (64 - b) = 124 bits, the split threshold itself.
        for i in 0..31 {
            v.insert(0, i % 2 == 1).unwrap();
        }
        for i in 0..28 {
            v.push_back(i % 5 == 0).unwrap();
        }
        let root = v.root_ref();
        assert_eq!(v.child_size(root, 0), 64);
        assert_eq!(v.child_size(root, 1), 60);
        assert_eq!(
            v.child_size(root, 0) + v.child_size(root, 1),
            v.buffer * (LEAF_BITS - v.buffer)
        );
        assert_eq!(v.used_leaves(), 2);
        v.validate().unwrap();

        // One more bit into the full leaf: the window must be extended
        // by exactly one fresh leaf and dealt out evenly, every leaf at
        // or above the guaranteed minimum fill.
        v.insert(0, true).unwrap();
        assert_eq!(v.used_leaves(), 3);
        assert_eq!(v.height(), 1);
        let root = v.root_ref();
        assert_eq!(v.child_size(root, 0), 43);
        assert_eq!(v.child_size(root, 1), 41);
        assert_eq!(v.child_size(root, 2), 41);
        for k in 0..3 {
            assert!(v.child_size(root, k) >= min_fill, "leaf {k} under-filled");
        }
        v.validate().unwrap();
    }

    #[test]
    fn test_single_bit_capacity() {
        let mut v = DynamicBitVector::new(1).unwrap();
        v.push_back(true).unwrap();
        assert!(v.is_full());
        assert!(v.get(0).unwrap());
        assert!(matches!(v.push_front(false), Err(Error::CapacityExhausted)));
        v.validate().unwrap();
    }

    #[test]
    fn test_debug_reports_geometry() {
        let v = DynamicBitVector::new(1024).unwrap();
        let s = format!("{v:?}");
        assert!(s.contains("degree"));
        assert!(s.contains("counter_width"));
    }
}
