use crate::errors::{Error, Result};
use crate::model::tree::ChowLiuTree;

/// Detector error model: the probability of observing a visual word given
/// that the underlying feature does or does not exist at the place.
#[derive(Clone, Copy, Debug, CopyGetters, Serialize, Deserialize)]
pub struct DetectorModel {
    /// P(z = true | e = true)
    #[getset(get_copy = "pub")]
    p_obs_given_exists: f64,
    /// P(z = true | e = false), the false positive rate
    #[getset(get_copy = "pub")]
    p_obs_given_absent: f64,
}

impl DetectorModel {
    pub fn new(p_obs_given_exists: f64, p_obs_given_absent: f64) -> Result<Self> {
        for &p in &[p_obs_given_exists, p_obs_given_absent] {
            if !(p > 0.0 && p < 1.0) {
                return Err(Error::InvalidDetectorModel);
            }
        }
        Ok(DetectorModel {
            p_obs_given_exists,
            p_obs_given_absent,
        })
    }

    /// P(z_q = z | e_q = e).
    #[inline]
    pub fn prob(&self, z: bool, e: bool) -> f64 {
        let p = if e {
            self.p_obs_given_exists
        } else {
            self.p_obs_given_absent
        };
        if z {
            p
        } else {
            1.0 - p
        }
    }
}

/// How word observations at a place are explained: fully factorized or along
/// the edges of the Chow-Liu tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservationModel {
    NaiveBayes,
    ChowLiu,
}

/// Couples the tree, the detector model and the chosen observation model into
/// the per-word probability kernels shared by all recognizers.
#[derive(Clone, Debug, Getters, CopyGetters)]
pub struct SensorModel {
    #[getset(get = "pub")]
    tree: ChowLiuTree,
    #[getset(get_copy = "pub")]
    detector: DetectorModel,
    #[getset(get_copy = "pub")]
    model: ObservationModel,
}

impl SensorModel {
    pub fn new(tree: ChowLiuTree, detector: DetectorModel, model: ObservationModel) -> Self {
        SensorModel {
            tree,
            detector,
            model,
        }
    }

    /// Posterior P(e_q = e | z_q observed as `at_place` when the place was
    /// collected), by Bayes from the detector model.
    ///
    /// The prior P(e_q) is identified with the tree marginal P(z_q): places
    /// are never updated after insertion, so the marginal stays the best
    /// available estimate of existence.
    pub fn existence_posterior(&self, q: usize, at_place: bool, e: bool) -> f64 {
        let alpha = self.detector.prob(at_place, true) * self.tree.marginal(q, true);
        let beta = self.detector.prob(at_place, false) * self.tree.marginal(q, false);
        if e {
            alpha / (alpha + beta)
        } else {
            1.0 - alpha / (alpha + beta)
        }
    }

    /// P(z_q = z | L_zq) under the naive Bayes assumption, marginalizing e_q
    /// over its posterior at the place.
    fn naive_place_term(&self, q: usize, z: bool, at_place: bool) -> f64 {
        self.existence_posterior(q, at_place, false) * self.detector.prob(z, false)
            + self.existence_posterior(q, at_place, true) * self.detector.prob(z, true)
    }

    /// Core of the Chow-Liu terms: blends the tree edge with the detector for
    /// both values of e_q, weighting e_q = false/true by `w_absent`/`w_exists`.
    fn tree_blend(&self, q: usize, z: bool, zp: bool, w_absent: f64, w_exists: f64) -> f64 {
        let mut p = 0.0;
        for &(e, w) in &[(false, w_absent), (true, w_exists)] {
            let alpha = self.tree.marginal(q, z)
                * self.detector.prob(!z, e)
                * self.tree.conditional(q, !z, zp);
            let beta = self.tree.marginal(q, !z)
                * self.detector.prob(z, e)
                * self.tree.conditional(q, z, zp);
            p += w * beta / (alpha + beta);
        }
        p
    }

    /// P(z_q = z | z_parent = zp, L_zq) respecting both the tree edge and the
    /// detector, with e_q marginalized over its posterior at the place.
    fn tree_place_term(&self, q: usize, z: bool, zp: bool, at_place: bool) -> f64 {
        self.tree_blend(
            q,
            z,
            zp,
            self.existence_posterior(q, at_place, false),
            self.existence_posterior(q, at_place, true),
        )
    }

    /// Per-word observation likelihood at a place under the chosen model.
    #[inline]
    pub fn place_term(&self, q: usize, z: bool, zp: bool, at_place: bool) -> f64 {
        match self.model {
            ObservationModel::NaiveBayes => self.naive_place_term(q, z, at_place),
            ObservationModel::ChowLiu => self.tree_place_term(q, z, zp, at_place),
        }
    }

    /// Per-word term of the closed-form observation marginal, integrating e_q
    /// over its prior instead of a place posterior.
    pub fn marginal_term(&self, q: usize, z: bool, zp: bool) -> f64 {
        match self.model {
            ObservationModel::NaiveBayes => {
                self.tree.marginal(q, false) * self.detector.prob(z, false)
                    + self.tree.marginal(q, true) * self.detector.prob(z, true)
            }
            ObservationModel::ChowLiu => self.tree_blend(
                q,
                z,
                zp,
                self.tree.marginal(q, false),
                self.tree.marginal(q, true),
            ),
        }
    }
}
