//! # Dynamic Succinct Bit Vectors
//!
//! *Random access, point update, and midpoint insertion over a bit
//! sequence — in succinct space.*
//!
//! ## Intuition First
//!
//! Imagine a bookshelf where the books are packed so tightly that there
//! is no slack anywhere. Reading any book is easy. But inserting a new
//! book in the middle means shoving everything after it one slot to the
//! right — the tighter the packing, the more expensive the shove.
//!
//! The classic escape is to leave slack everywhere (a linked structure
//! with a pointer per element), but for single *bits* a 64-bit pointer
//! per element is a 64x blow-up. This crate packs bits into machine
//! words, words into a shallow B+-tree, and keeps just enough slack in
//! each neighbourhood of leaves that an insertion only ever shoves a few
//! words around.
//!
//! ## The Problem
//!
//! A flat bit array gives $O(1)$ access but $O(n)$ insertion; a balanced
//! tree of individual bits gives $O(\log n)$ everything but uses
//! $\Theta(n \log n)$ bits of space. The goal is:
//!
//! - **Space**: $n + o(n)$ bits for an $n$-bit sequence.
//! - **Time**: $O(\log n)$ access, update, and insertion.
//!
//! ## Historical Context
//!
//! ```text
//! 1989  Fredman-Saks  Cell-probe lower bounds for dynamic rank
//! 1999  Raman et al.  Dynamic arrays with o(n) extra space
//! 2003  Raman-Raman-Rao  Succinct dynamic bit vectors with rank/select
//! 2006  Blandford-Blelloch  Compact dictionaries with variable-length keys
//! 2015  Navarro-Nekrich  Optimal dynamic sequence representations
//! ```
//!
//! The lower-bound side (Fredman & Saks) shows $\Omega(\log n / \log
//! \log n)$ per operation is unavoidable for dynamic rank, so a
//! logarithmic-time dynamic structure is essentially the best one can
//! engineer with simple word-level techniques.
//!
//! ## Implementation Notes
//!
//! Three layers, bottom up:
//!
//! - [`BitArray`] / [`BitVec`] (module [`bitview`]): bit-addressable
//!   storage over 64-bit words — sub-word reads and writes, range
//!   copies with overlap handling, tail-shifting inserts.
//! - [`PackedView`] (module [`packed`]): a sequence of fixed-width
//!   fields inside a bit view, with word-parallel fill, increment, and
//!   the subtract-and-test search that drives the tree descent.
//! - [`DynamicBitVector`] (module [`dynamic`]): a B+-tree whose interior
//!   nodes pack per-child size and rank prefix sums plus child pointers
//!   into a few words, and whose leaves are single words of bits.
//!   Insertion near a full leaf redistributes a small window of
//!   adjacent leaves, which is what makes it amortized cheap.
//!
//! Deletion and the rank/select query operators are out of scope.
//!
//! ## Complexity Analysis
//!
//! - **Time**: $O(\log n)$ per `get`/`set`/`insert`, with word-parallel
//!   constant factors: a node of degree $d$ is searched in $O(d \cdot
//!   w / 64)$ word operations.
//! - **Space**: $n + o(n)$ bits plus the pre-sized node pools.
//!
//! ## What Could Go Wrong
//!
//! 1. **Counter overflow**: node counters are sized from the declared
//!    capacity with one spare bit; exceeding the capacity is refused
//!    rather than wrapped.
//! 2. **Amortization cliffs**: a single insertion may trigger a window
//!    redistribution touching `b + 1` siblings. Constant *amortized*,
//!    not constant worst-case.
//!
//! ## References
//!
//! - Fredman, M., & Saks, M. (1989). "The cell probe complexity of
//!   dynamic data structures."
//! - Raman, R., Raman, V., & Rao, S. S. (2001). "Succinct dynamic data
//!   structures."
//! - Navarro, G., & Nekrich, Y. (2015). "Optimal dynamic sequence
//!   representations."

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitview;
pub mod dynamic;
pub mod error;
pub mod packed;

pub use bitview::{BitArray, BitVec, BitView, Words};
pub use dynamic::DynamicBitVector;
pub use error::{Error, Result};
pub use packed::{PackedVec, PackedView};
