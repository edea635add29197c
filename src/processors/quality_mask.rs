//! Decoding of bit-packed quality flags into accept/reject masks.
//!
//! Bits are counted from the least significant bit. Bits 0-1 carry the
//! overall quality class (0 best, 1 good, 2-3 rejected or cloudy).

use serde::Serialize;

use crate::models::{MaskRule, ProductDescriptor};

const QUALITY_CLASS_MASK: i32 = 0b11;
const SNOW_ICE_BIT: i32 = 1 << 3;
const CLOUD_BIT: i32 = 1 << 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDecision {
    Accept,
    Reject,
    /// Outside the product's bit encoding; always rejected
    Malformed,
}

impl MaskDecision {
    pub fn is_usable(&self) -> bool {
        matches!(self, MaskDecision::Accept)
    }
}

/// Per-pixel mask plus the tallies diagnostics report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MaskOutcome {
    pub mask: Vec<bool>,
    pub accepted: usize,
    pub rejected: usize,
    pub malformed: usize,
}

/// Running count of flag decisions, one per pixel of every evaluated composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FlagTally {
    pub accepted: usize,
    pub rejected: usize,
    pub malformed: usize,
}

impl FlagTally {
    pub fn record(&mut self, outcome: &MaskOutcome) {
        self.accepted += outcome.accepted;
        self.rejected += outcome.rejected;
        self.malformed += outcome.malformed;
    }

    pub fn merge(&mut self, other: &FlagTally) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
        self.malformed += other.malformed;
    }

    pub fn total(&self) -> usize {
        self.accepted + self.rejected + self.malformed
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMaskEvaluator {
    rule: MaskRule,
    fill: Option<i32>,
    bits: u32,
}

impl QualityMaskEvaluator {
    pub fn new(rule: MaskRule) -> Self {
        Self {
            rule,
            fill: None,
            bits: 8,
        }
    }

    pub fn for_product(product: &ProductDescriptor) -> Self {
        Self {
            rule: product.mask_rule,
            fill: product.quality_fill,
            bits: product.quality_bits,
        }
    }

    pub fn with_fill(mut self, fill: i32) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn rule(&self) -> MaskRule {
        self.rule
    }

    /// Decision for a single flag; a missing or fill flag never passes.
    pub fn decide(&self, flag: Option<i32>) -> MaskDecision {
        let Some(flag) = flag else {
            return MaskDecision::Reject;
        };
        if self.fill == Some(flag) {
            return MaskDecision::Reject;
        }
        if flag < 0 || (flag as i64) >= (1_i64 << self.bits) {
            return MaskDecision::Malformed;
        }

        let quality_class = flag & QUALITY_CLASS_MASK;
        let usable = match self.rule {
            MaskRule::VegetationIndex => quality_class <= 1,
            MaskRule::Temperature => quality_class == 0,
            MaskRule::LeafArea => {
                quality_class <= 1 && flag & SNOW_ICE_BIT == 0 && flag & CLOUD_BIT == 0
            }
        };

        if usable {
            MaskDecision::Accept
        } else {
            MaskDecision::Reject
        }
    }

    pub fn evaluate(&self, flags: &[Option<i32>]) -> MaskOutcome {
        let mut outcome = MaskOutcome {
            mask: Vec::with_capacity(flags.len()),
            ..Default::default()
        };

        for flag in flags {
            let decision = self.decide(*flag);
            match decision {
                MaskDecision::Accept => outcome.accepted += 1,
                MaskDecision::Reject => outcome.rejected += 1,
                MaskDecision::Malformed => outcome.malformed += 1,
            }
            outcome.mask.push(decision.is_usable());
        }

        outcome
    }
}
