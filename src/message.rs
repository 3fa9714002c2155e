// Copyright 2026 Hypermesh Foundation. All rights reserved.
// SimSoM Diffusion Suite - Message Factory
//
// Quality and appeal are drawn by inverse-transform sampling. Drafting and
// id issuing are separate steps so that ids can be handed out in agent order.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::types::{Message, MessageId};

/// Below this magnitude the exponential quality law is treated as uniform.
const LAMBDA_FLOOR: f64 = 1e-9;

/// Sampling parameters for new messages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageParams {
    pub phi: f64,
    pub appeal_exponent: f64,
    pub quality_lambda: f64,
}

/// A sampled message that has not been given an id yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageDraft {
    pub is_by_bot: bool,
    pub quality: f64,
    pub appeal: f64,
}

impl MessageDraft {
    /// Sample quality and appeal. Needs no shared state, so agents draft
    /// in parallel and ids are issued afterwards in a fixed order.
    pub fn sample<R: Rng>(is_bot: bool, params: &MessageParams, rng: &mut R) -> Self {
        let human_appeal = appeal_sample(rng.gen::<f64>(), params.appeal_exponent);
        let u: f64 = rng.gen();
        let appeal = if is_bot && u < params.phi { 1.0 } else { human_appeal };

        let quality = if is_bot {
            0.0
        } else {
            quality_sample(rng.gen::<f64>(), params.quality_lambda)
        };

        Self {
            is_by_bot: is_bot,
            quality,
            appeal,
        }
    }
}

/// Issues messages with monotonically increasing ids.
#[derive(Debug)]
pub struct MessageFactory {
    next_id: AtomicU64,
}

impl Default for MessageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFactory {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(next_id: MessageId) -> Self {
        Self {
            next_id: AtomicU64::new(next_id),
        }
    }

    /// Give a draft the next id.
    pub fn issue(&self, draft: MessageDraft) -> Message {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Message {
            id,
            is_by_bot: draft.is_by_bot,
            quality: draft.quality,
            appeal: draft.appeal,
        }
    }

    /// Sample and issue in one go. Safe to call from many workers at once,
    /// though ids then follow whichever worker gets there first.
    pub fn create<R: Rng>(
        &self,
        is_bot: bool,
        params: &MessageParams,
        rng: &mut R,
    ) -> Message {
        self.issue(MessageDraft::sample(is_bot, params, rng))
    }

    /// Number of ids issued so far.
    pub fn created(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed).saturating_sub(1)
    }

    /// Id the next call to `issue` will hand out.
    pub fn peek_next_id(&self) -> MessageId {
        self.next_id.load(Ordering::Relaxed)
    }
}

/// Inverse CDF of the bounded exponential law `f(x) = C e^(-lambda x)` on [0, 1].
pub fn quality_sample(u: f64, lambda: f64) -> f64 {
    if lambda.abs() < LAMBDA_FLOOR {
        return u.clamp(0.0, 1.0);
    }
    let q = -(1.0 - u + u * (-lambda).exp()).ln() / lambda;
    q.clamp(0.0, 1.0)
}

/// Inverse CDF of the right-skewed appeal law `F(x) = 1 - (1 - x)^exponent`.
pub fn appeal_sample(u: f64, exponent: f64) -> f64 {
    (1.0 - (1.0 - u).powf(1.0 / exponent)).clamp(0.0, 1.0)
}
