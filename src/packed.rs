//! Fixed-width packed fields inside a bit view.
//!
//! A [`PackedView`] presents `len` unsigned fields of `width` bits each,
//! stored back to back in a [`BitView`]; field `k` occupies bits
//! `[k * width, (k + 1) * width)`. Beyond per-field access, the point of
//! the layer is the vectorized operations that touch one machine word of
//! fields at a time: broadcast fill, range increment/decrement, and the
//! subtract-and-test search used by the tree descent.
//!
//! # Flag bits
//!
//! The top bit of every field is reserved as a *flag* for the word-wide
//! comparison trick: [`find`](PackedView::find) ORs a flag mask into the
//! packed word before subtracting the broadcast needle, so each field's
//! flag absorbs its own borrow and survives exactly when the field is
//! `>= needle` — no borrow ever crosses a field boundary. Stored values
//! therefore must stay below `2^(width - 1)`; `increment` asserts this
//! headroom in debug builds, and `decrement` reuses the same guard to
//! give every field true modular wrap-around.

use crate::bitview::{mask, BitVec, BitView, Words, W};

/// A sequence of equal-width bit fields over a [`Words`] storage.
#[derive(Clone)]
pub struct PackedView<S> {
    bits: S,
    width: usize,
    len: usize,
    /// One set bit at the start of each complete field in a word.
    field_mask: u64,
}

fn field_mask_for(width: usize) -> u64 {
    let mut m = 1u64;
    for _ in 1..W / width {
        m = (m << width) | 1;
    }
    m
}

impl<S: Words> PackedView<S> {
    /// Present `len` fields of `width` bits over an existing storage.
    ///
    /// # Panics
    ///
    /// Panics if `width` is not in `1..=64` or the storage is too small.
    pub fn from_storage(bits: S, width: usize, len: usize) -> Self {
        assert!((1..=W).contains(&width), "field width must be 1..=64");
        assert!(
            width * len <= bits.as_word_slice().len() * W,
            "storage too small for {len} fields of {width} bits"
        );
        Self {
            bits,
            width,
            len,
            field_mask: field_mask_for(width),
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the view presents zero fields.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Width of each field in bits.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Value of field `k`.
    pub fn get(&self, k: usize) -> u64 {
        debug_assert!(k < self.len);
        self.bits.get(k * self.width, (k + 1) * self.width)
    }

    /// Set field `k` to the low `width` bits of `value`.
    pub fn set(&mut self, k: usize, value: u64) {
        debug_assert!(k < self.len);
        self.bits.set(k * self.width, (k + 1) * self.width, value);
    }

    /// The packed concatenation of fields `[begin, end)` as one word;
    /// requires `(end - begin) * width <= 64`.
    pub fn get_range(&self, begin: usize, end: usize) -> u64 {
        debug_assert!(begin <= end && end <= self.len);
        debug_assert!((end - begin) * self.width <= W);
        self.bits.get(begin * self.width, end * self.width)
    }

    /// Write the packed concatenation `value` over the fields
    /// `[begin, end)`: the exact dual of [`get_range`](Self::get_range),
    /// with the same `(end - begin) * width <= 64` limit.
    pub fn set_range(&mut self, begin: usize, end: usize, value: u64) {
        debug_assert!(begin <= end && end <= self.len);
        debug_assert!((end - begin) * self.width <= W);
        self.bits.set(begin * self.width, end * self.width, value);
    }

    /// Write `value` into every field of `[begin, end)`.
    ///
    /// One multiplication broadcasts the truncated value into every field
    /// slot of a word (`field_mask * value`), and the word is stored over
    /// up to `64 / width` fields per step.
    pub fn fill(&mut self, begin: usize, end: usize, value: u64) {
        debug_assert!(begin <= end && end <= self.len);
        let w = self.width;
        let broadcast = self.field_mask.wrapping_mul(value & mask(w));
        let per_word = W / w;
        let mut k = begin;
        while k < end {
            let m = per_word.min(end - k);
            self.bits.set(k * w, (k + m) * w, broadcast);
            k += m;
        }
    }

    /// Add `n` to every field in `[begin, end)`.
    ///
    /// `n` and every resulting value must stay below `2^(width - 1)` so
    /// that no addition carries into a flag bit; violations are caught in
    /// debug builds.
    pub fn increment(&mut self, begin: usize, end: usize, n: u64) {
        debug_assert!(begin <= end && end <= self.len);
        debug_assert!(n <= mask(self.width - 1));
        let w = self.width;
        let broadcast = self.field_mask.wrapping_mul(n);
        let flags = self.field_mask << (w - 1);
        let per_word = W / w;
        let mut k = begin;
        while k < end {
            let m = per_word.min(end - k);
            let sum = self.bits.get(k * w, (k + m) * w).wrapping_add(broadcast);
            debug_assert!(
                sum & flags & mask(m * w) == 0,
                "packed field overflowed its flag bit"
            );
            self.bits.set(k * w, (k + m) * w, sum);
            k += m;
        }
    }

    /// Subtract `n` from every field in `[begin, end)`, each field
    /// wrapping modulo `2^width` independently.
    pub fn decrement(&mut self, begin: usize, end: usize, n: u64) {
        debug_assert!(begin <= end && end <= self.len);
        debug_assert!(n <= mask(self.width - 1));
        let w = self.width;
        let broadcast = self.field_mask.wrapping_mul(n);
        let flags = self.field_mask << (w - 1);
        let per_word = W / w;
        let mut k = begin;
        while k < end {
            let m = per_word.min(end - k);
            let chunk_flags = flags & mask(m * w);
            let cur = self.bits.get(k * w, (k + m) * w);
            // Setting each flag lets it absorb its own field's borrow;
            // the XOR afterwards restores the true top bit of the
            // modular difference.
            let diff = ((cur | chunk_flags).wrapping_sub(broadcast)) ^ chunk_flags;
            self.bits.set(k * w, (k + m) * w, diff);
            k += m;
        }
    }

    /// Index of the first field in `[begin, end)` whose value is
    /// `>= needle`, or `end` if there is none.
    ///
    /// Scans a word of fields per step: after the flag-guarded subtract,
    /// the surviving flag bits mark the fields `>= needle`, and the
    /// lowest one is read off with a trailing-zeros count.
    pub fn find(&self, begin: usize, end: usize, needle: u64) -> usize {
        debug_assert!(begin <= end && end <= self.len);
        debug_assert!(needle <= mask(self.width - 1));
        let w = self.width;
        let broadcast = self.field_mask.wrapping_mul(needle);
        let flags = self.field_mask << (w - 1);
        let per_word = W / w;
        let mut k = begin;
        while k < end {
            let m = per_word.min(end - k);
            let chunk_flags = flags & mask(m * w);
            let chunk = self.bits.get(k * w, (k + m) * w);
            let hits = (chunk | chunk_flags).wrapping_sub(broadcast) & chunk_flags;
            if hits != 0 {
                return k + hits.trailing_zeros() as usize / w;
            }
            k += m;
        }
        end
    }

    /// Copy the fields `[src_begin, src_end)` over the fields starting at
    /// `dest_begin`, handling overlap like [`BitView::copy_within`].
    pub fn copy_within(&mut self, src_begin: usize, src_end: usize, dest_begin: usize) {
        debug_assert!(src_begin <= src_end && src_end <= self.len);
        debug_assert!(dest_begin + (src_end - src_begin) <= self.len);
        let w = self.width;
        self.bits.copy_within(
            src_begin * w,
            src_end * w,
            dest_begin * w,
            (dest_begin + (src_end - src_begin)) * w,
        );
    }

    /// Iterate over the field values.
    pub fn iter(&self) -> Iter<'_, S> {
        Iter {
            view: self,
            index: 0,
        }
    }
}

impl PackedView<BitVec> {
    /// Allocate a zeroed view of `len` fields of `width` bits.
    pub fn new(width: usize, len: usize) -> Self {
        Self::from_storage(BitVec::new(width * len), width, len)
    }

    /// Grow or shrink to `len` fields; new fields read as zero.
    pub fn resize(&mut self, len: usize) {
        self.bits.resize(self.width * len);
        self.len = len;
    }

    /// Approximate heap memory usage in bytes.
    pub fn heap_bytes(&self) -> usize {
        self.bits.heap_bytes()
    }
}

/// A growable packed-field sequence; the form the tree's node arrays take.
pub type PackedVec = PackedView<BitVec>;

/// Iterator over the values of a [`PackedView`].
pub struct Iter<'a, S> {
    view: &'a PackedView<S>,
    index: usize,
}

impl<S: Words> Iterator for Iter<'_, S> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.index >= self.view.len() {
            None
        } else {
            let v = self.view.get(self.index);
            self.index += 1;
            Some(v)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.view.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl<S: Words> ExactSizeIterator for Iter<'_, S> {}

impl<'a, S: Words> IntoIterator for &'a PackedView<S> {
    type Item = u64;
    type IntoIter = Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
