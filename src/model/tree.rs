use ndarray::Array2;

use crate::errors::{Error, Result};

/// Chow-Liu tree parameter table over a vocabulary of V visual words.
///
/// The table has 4 rows and V columns. For word q, row 0 holds the index of
/// its parent word (q itself for the root), row 1 the marginal P(z_q = true),
/// row 2 the conditional P(z_q = true | z_parent = true) and row 3 the
/// conditional P(z_q = true | z_parent = false). Rows 1-3 must lie strictly
/// inside (0, 1) and row 0 must encode a valid rooted tree.
#[derive(Clone, Debug)]
pub struct ChowLiuTree {
    table: Array2<f64>,
}

impl ChowLiuTree {
    pub fn new(table: Array2<f64>) -> Result<Self> {
        if table.ncols() == 0 {
            return Err(Error::EmptyTree);
        }
        if table.nrows() != 4 {
            return Err(Error::InvalidTreeShape {
                rows: table.nrows(),
            });
        }
        for row in 1..4 {
            for q in 0..table.ncols() {
                let p = table[[row, q]];
                if !(p > 0.0 && p < 1.0) {
                    return Err(Error::TreeProbabilityOutOfRange { row, word: q });
                }
            }
        }
        let tree = ChowLiuTree { table };
        tree.validate_parent_map()?;

        Ok(tree)
    }

    fn validate_parent_map(&self) -> Result<()> {
        let vocab = self.vocab_size();
        let mut roots = 0;
        for q in 0..vocab {
            let raw = self.table[[0, q]];
            if raw < 0.0 || raw >= vocab as f64 || raw.fract() != 0.0 {
                return Err(Error::InvalidParentMap { word: q });
            }
            if raw as usize == q {
                roots += 1;
            }
        }
        if roots != 1 {
            return Err(Error::InvalidRootCount { roots });
        }
        // every word must reach the root without revisiting a node
        for q in 0..vocab {
            let mut node = q;
            let mut hops = 0;
            while self.parent(node) != node {
                node = self.parent(node);
                hops += 1;
                if hops > vocab {
                    return Err(Error::InvalidParentMap { word: q });
                }
            }
        }

        Ok(())
    }

    pub fn vocab_size(&self) -> usize {
        self.table.ncols()
    }

    /// Parent word of `q`; the root maps to itself.
    #[inline]
    pub fn parent(&self, q: usize) -> usize {
        self.table[[0, q]] as usize
    }

    /// P(z_q = z).
    #[inline]
    pub fn marginal(&self, q: usize, z: bool) -> f64 {
        if z {
            self.table[[1, q]]
        } else {
            1.0 - self.table[[1, q]]
        }
    }

    /// P(z_q = z | z_parent = zp).
    #[inline]
    pub fn conditional(&self, q: usize, z: bool, zp: bool) -> f64 {
        let p = if zp {
            self.table[[2, q]]
        } else {
            self.table[[3, q]]
        };
        if z {
            p
        } else {
            1.0 - p
        }
    }
}
